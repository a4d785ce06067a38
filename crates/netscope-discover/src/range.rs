//! Range expression parsing.
//!
//! Three grammars are accepted: CIDR (`10.0.0.0/24`), an inclusive dash
//! range (`10.0.0.5-10.0.0.20`), and a single address (`10.0.0.7`).
//! Ranges are IPv4 only.

use std::net::Ipv4Addr;

use ipnet::{Ipv4AddrRange, Ipv4Net};

use crate::error::{DiscoverError, Result};

/// Largest number of addresses a single expression may expand to.
pub const MAX_RANGE_ADDRESSES: u64 = 1 << 16;

/// Expand a range expression into the ordered addresses to probe.
///
/// CIDR blocks exclude their network and broadcast addresses. `/31` yields
/// both addresses of the point-to-point pair and `/32` yields the single
/// address.
pub fn parse_range(expr: &str) -> Result<Vec<Ipv4Addr>> {
    let input = expr.trim();
    let invalid = || DiscoverError::InvalidRangeFormat {
        input: expr.to_string(),
    };

    if input.contains('/') {
        let net: Ipv4Net = input.parse().map_err(|_| invalid())?;
        let count = cidr_host_count(net.prefix_len());
        check_size(expr, count)?;
        // hosts() skips network/broadcast except for /31 and /32.
        return Ok(net.hosts().collect());
    }

    if let Some((start, end)) = input.split_once('-') {
        let start: Ipv4Addr = start.trim().parse().map_err(|_| invalid())?;
        let end: Ipv4Addr = end.trim().parse().map_err(|_| invalid())?;
        if u32::from(end) < u32::from(start) {
            return Err(invalid());
        }
        let count = u64::from(u32::from(end) - u32::from(start)) + 1;
        check_size(expr, count)?;
        return Ok(Ipv4AddrRange::new(start, end).collect());
    }

    let addr: Ipv4Addr = input.parse().map_err(|_| invalid())?;
    Ok(vec![addr])
}

fn cidr_host_count(prefix_len: u8) -> u64 {
    match prefix_len {
        32 => 1,
        31 => 2,
        n => (1u64 << (32 - u32::from(n))) - 2,
    }
}

fn check_size(expr: &str, count: u64) -> Result<()> {
    if count > MAX_RANGE_ADDRESSES {
        return Err(DiscoverError::RangeTooLarge {
            input: expr.to_string(),
            count,
            limit: MAX_RANGE_ADDRESSES,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cidr_24_excludes_network_and_broadcast() {
        let addrs = parse_range("192.168.1.0/24").unwrap();
        assert_eq!(addrs.len(), 254);
        assert_eq!(addrs.first(), Some(&Ipv4Addr::new(192, 168, 1, 1)));
        assert_eq!(addrs.last(), Some(&Ipv4Addr::new(192, 168, 1, 254)));
    }

    #[test]
    fn test_cidr_with_host_bits_set() {
        let addrs = parse_range("10.0.0.77/30").unwrap();
        assert_eq!(
            addrs,
            vec![Ipv4Addr::new(10, 0, 0, 77), Ipv4Addr::new(10, 0, 0, 78)]
        );
    }

    #[test]
    fn test_cidr_31_and_32() {
        assert_eq!(
            parse_range("10.0.0.0/31").unwrap(),
            vec![Ipv4Addr::new(10, 0, 0, 0), Ipv4Addr::new(10, 0, 0, 1)]
        );
        assert_eq!(
            parse_range("10.0.0.9/32").unwrap(),
            vec![Ipv4Addr::new(10, 0, 0, 9)]
        );
    }

    #[test]
    fn test_dash_range_inclusive() {
        let addrs = parse_range("10.0.0.254-10.0.1.1").unwrap();
        assert_eq!(
            addrs,
            vec![
                Ipv4Addr::new(10, 0, 0, 254),
                Ipv4Addr::new(10, 0, 0, 255),
                Ipv4Addr::new(10, 0, 1, 0),
                Ipv4Addr::new(10, 0, 1, 1),
            ]
        );
    }

    #[test]
    fn test_dash_range_reversed_fails() {
        let err = parse_range("10.0.0.9-10.0.0.1").unwrap_err();
        assert!(matches!(err, DiscoverError::InvalidRangeFormat { .. }));
    }

    #[test]
    fn test_single_address() {
        assert_eq!(
            parse_range(" 172.16.4.2 ").unwrap(),
            vec![Ipv4Addr::new(172, 16, 4, 2)]
        );
    }

    #[test]
    fn test_invalid_expressions() {
        for expr in [
            "",
            "10.0.0.*",
            "router.local",
            "10.0.0.0/33",
            "10.0.0.1-",
            "256.0.0.1",
            "fe80::1",
        ] {
            assert!(
                matches!(
                    parse_range(expr),
                    Err(DiscoverError::InvalidRangeFormat { .. })
                ),
                "{expr:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_oversized_range_rejected() {
        let err = parse_range("10.0.0.0/8").unwrap_err();
        assert!(matches!(err, DiscoverError::RangeTooLarge { count, .. } if count == (1 << 24) - 2));
        assert!(parse_range("10.0.0.0/16").is_ok());
    }

    #[test]
    fn test_parse_is_deterministic() {
        let a = parse_range("10.1.0.0/27").unwrap();
        let b = parse_range("10.1.0.0/27").unwrap();
        assert_eq!(a, b);
        assert!(a.windows(2).all(|w| w[0] < w[1]));
    }
}
