//! Probe transport.
//!
//! All network I/O the engine performs goes through [`ProbeTransport`], so
//! tests can substitute a scripted implementation. [`SystemTransport`] is
//! the real one: ICMP echo for liveness, TCP connect for ports, and reverse
//! DNS for hostnames.

use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use surge_ping::{Client, Config, PingIdentifier, PingSequence, SurgeError};
use thiserror::Error;
use tokio::net::TcpStream;

/// Ports tried by the TCP fallback ping. A refusal proves the host is up.
const FALLBACK_PING_PORTS: [u16; 3] = [80, 443, 22];

/// Reverse lookups run on the blocking pool and are abandoned after this.
const REVERSE_LOOKUP_TIMEOUT: Duration = Duration::from_millis(2000);

/// Why a single probe did not succeed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("timed out")]
    Timeout,

    #[error("refused")]
    Refused,

    #[error("unreachable: {0}")]
    Unreachable(String),

    #[error("fatal: {0}")]
    Fatal(String),
}

impl ProbeError {
    /// Transient failures are worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, ProbeError::Timeout | ProbeError::Unreachable(_))
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, ProbeError::Fatal(_))
    }
}

/// Network capabilities the discovery engine relies on.
#[async_trait]
pub trait ProbeTransport: Send + Sync {
    /// Check whether `ip` is alive, returning the round-trip time.
    async fn probe_host(&self, ip: Ipv4Addr, timeout: Duration) -> Result<Duration, ProbeError>;

    /// Attempt a TCP connection to `ip:port`. `Ok` means the port is open.
    async fn probe_port(&self, ip: Ipv4Addr, port: u16, timeout: Duration)
        -> Result<(), ProbeError>;

    /// Best-effort reverse lookup.
    async fn reverse_lookup(&self, ip: Ipv4Addr) -> Option<String>;
}

/// Transport backed by the operating system's network stack.
pub struct SystemTransport {
    icmp: Option<Client>,
}

impl SystemTransport {
    /// Open an ICMP client, falling back to TCP connect pings when raw
    /// sockets are not permitted.
    pub fn new() -> Self {
        let icmp = match Client::new(&Config::default()) {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "ICMP socket unavailable, using TCP connect ping for liveness"
                );
                None
            }
        };
        Self { icmp }
    }

    async fn icmp_ping(
        client: &Client,
        ip: Ipv4Addr,
        timeout: Duration,
    ) -> Result<Duration, ProbeError> {
        let payload = [0u8; 56];
        let mut pinger = client
            .pinger(IpAddr::V4(ip), PingIdentifier(ping_identifier()))
            .await;
        pinger.timeout(timeout);

        match pinger.ping(PingSequence(0), &payload).await {
            Ok((_packet, rtt)) => Ok(rtt),
            Err(SurgeError::Timeout { .. }) => Err(ProbeError::Timeout),
            Err(e) => Err(ProbeError::Unreachable(e.to_string())),
        }
    }

    async fn tcp_ping(ip: Ipv4Addr, timeout: Duration) -> Result<Duration, ProbeError> {
        let start = Instant::now();
        let attempt = async {
            let mut last = ProbeError::Timeout;
            for port in FALLBACK_PING_PORTS {
                match connect(ip, port).await {
                    Ok(()) | Err(ProbeError::Refused) => return Ok(start.elapsed()),
                    Err(e) => last = e,
                }
            }
            Err(last)
        };

        tokio::time::timeout(timeout, attempt)
            .await
            .unwrap_or(Err(ProbeError::Timeout))
    }
}

impl Default for SystemTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProbeTransport for SystemTransport {
    async fn probe_host(&self, ip: Ipv4Addr, timeout: Duration) -> Result<Duration, ProbeError> {
        match &self.icmp {
            Some(client) => Self::icmp_ping(client, ip, timeout).await,
            None => Self::tcp_ping(ip, timeout).await,
        }
    }

    async fn probe_port(
        &self,
        ip: Ipv4Addr,
        port: u16,
        timeout: Duration,
    ) -> Result<(), ProbeError> {
        tokio::time::timeout(timeout, connect(ip, port))
            .await
            .unwrap_or(Err(ProbeError::Timeout))
    }

    async fn reverse_lookup(&self, ip: Ipv4Addr) -> Option<String> {
        let lookup = tokio::task::spawn_blocking(move || {
            dns_lookup::lookup_addr(&IpAddr::V4(ip)).ok()
        });

        match tokio::time::timeout(REVERSE_LOOKUP_TIMEOUT, lookup).await {
            Ok(Ok(Some(name))) if name != ip.to_string() => Some(name),
            _ => None,
        }
    }
}

async fn connect(ip: Ipv4Addr, port: u16) -> Result<(), ProbeError> {
    let addr = SocketAddr::new(IpAddr::V4(ip), port);
    match TcpStream::connect(addr).await {
        Ok(_stream) => Ok(()),
        Err(e) => Err(classify_io_error(&e)),
    }
}

/// Map a connect error to a probe outcome.
///
/// A local firewall rejecting one destination surfaces as `PermissionDenied`;
/// that says nothing about the target, so it is treated like any other
/// unreachable destination rather than a broken transport.
pub(crate) fn classify_io_error(e: &std::io::Error) -> ProbeError {
    match e.kind() {
        ErrorKind::ConnectionRefused => ProbeError::Refused,
        ErrorKind::TimedOut => ProbeError::Timeout,
        _ => ProbeError::Unreachable(e.to_string()),
    }
}

fn ping_identifier() -> u16 {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    ((nanos % 0xFFFF) as u16).wrapping_add(1)
}

/// Scripted transport shared by the engine's unit tests.
#[cfg(test)]
pub(crate) mod testing {
    use std::collections::{BTreeSet, HashMap};
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Debug, Clone)]
    pub struct ScriptedHost {
        pub latency: Duration,
        pub open_ports: BTreeSet<u16>,
        pub hostname: Option<String>,
    }

    /// Answers for scripted hosts, times out for everything else. Every
    /// probe takes `delay` and is counted while in flight.
    #[derive(Debug, Default)]
    pub struct ScriptedTransport {
        pub hosts: HashMap<Ipv4Addr, ScriptedHost>,
        pub delay: Duration,
        pub fatal_host: Option<Ipv4Addr>,
        /// Overrides the outcome of specific `(ip, port)` probes.
        pub port_errors: HashMap<(Ipv4Addr, u16), ProbeError>,
        pub lookup_delay: Duration,
        pub host_probes: AtomicUsize,
        pub port_probes: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl ScriptedTransport {
        pub fn new(delay: Duration) -> Self {
            Self {
                delay,
                ..Default::default()
            }
        }

        pub fn with_host(mut self, ip: Ipv4Addr, latency_ms: u64, ports: &[u16]) -> Self {
            self.hosts.insert(
                ip,
                ScriptedHost {
                    latency: Duration::from_millis(latency_ms),
                    open_ports: ports.iter().copied().collect(),
                    hostname: None,
                },
            );
            self
        }

        pub fn max_in_flight(&self) -> usize {
            self.max_in_flight.load(Ordering::SeqCst)
        }

        async fn hold(&self) {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl ProbeTransport for ScriptedTransport {
        async fn probe_host(
            &self,
            ip: Ipv4Addr,
            _timeout: Duration,
        ) -> Result<Duration, ProbeError> {
            self.host_probes.fetch_add(1, Ordering::SeqCst);
            self.hold().await;
            if self.fatal_host == Some(ip) {
                return Err(ProbeError::Fatal("operation not permitted".into()));
            }
            match self.hosts.get(&ip) {
                Some(host) => Ok(host.latency),
                None => Err(ProbeError::Timeout),
            }
        }

        async fn probe_port(
            &self,
            ip: Ipv4Addr,
            port: u16,
            _timeout: Duration,
        ) -> Result<(), ProbeError> {
            self.port_probes.fetch_add(1, Ordering::SeqCst);
            self.hold().await;
            if let Some(err) = self.port_errors.get(&(ip, port)) {
                return Err(err.clone());
            }
            match self.hosts.get(&ip) {
                Some(host) if host.open_ports.contains(&port) => Ok(()),
                Some(_) => Err(ProbeError::Refused),
                None => Err(ProbeError::Timeout),
            }
        }

        async fn reverse_lookup(&self, ip: Ipv4Addr) -> Option<String> {
            tokio::time::sleep(self.lookup_delay).await;
            self.hosts.get(&ip).and_then(|h| h.hostname.clone())
        }
    }
}
