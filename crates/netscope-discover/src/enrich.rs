//! Host enrichment from NIC metadata and device-type inference.

use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;

use netscope_core::types::{DeviceType, Host, NicRecord};

const REMOTE_SHELL_PORTS: [u16; 2] = [22, 23];
const WEB_PORTS: [u16; 4] = [80, 443, 8080, 8443];
const REMOTE_DESKTOP_PORT: u16 = 3389;
const FTP_PORT: u16 = 21;

/// Copy interface metadata onto hosts whose address matches an enabled
/// record. Returns how many hosts were enriched; the rest are untouched.
pub fn enrich_hosts(hosts: &mut [Host], records: &[NicRecord]) -> usize {
    let by_ip: HashMap<Ipv4Addr, &NicRecord> = records
        .iter()
        .filter(|r| r.enabled)
        .map(|r| (r.ip, r))
        .collect();

    let mut enriched = 0;
    for host in hosts.iter_mut() {
        let Some(record) = by_ip.get(&host.ip) else {
            continue;
        };
        host.mac = record.mac.clone();
        host.manufacturer = record.manufacturer.clone();
        host.subnet_mask = record.subnet_mask;
        host.gateway = record.gateway;
        host.dhcp_enabled = Some(record.dhcp_enabled);
        enriched += 1;
    }
    enriched
}

/// Set every host's device type from its ports and the gateways of enabled
/// records.
pub fn classify_hosts(hosts: &mut [Host], records: &[NicRecord]) {
    let gateways: HashSet<Ipv4Addr> = records
        .iter()
        .filter(|r| r.enabled)
        .filter_map(|r| r.gateway)
        .chain(hosts.iter().filter_map(|h| h.gateway))
        .collect();

    for host in hosts.iter_mut() {
        host.device_type = classify_device(host, &gateways);
    }
}

/// First matching rule wins.
pub fn classify_device(host: &Host, gateways: &HashSet<Ipv4Addr>) -> DeviceType {
    let has_any = |ports: &[u16]| ports.iter().any(|p| host.open_ports.contains(p));

    if gateways.contains(&host.ip) {
        DeviceType::Router
    } else if has_any(&REMOTE_SHELL_PORTS) {
        DeviceType::NetworkDevice
    } else if has_any(&WEB_PORTS) {
        DeviceType::WebServer
    } else if host.open_ports.contains(&REMOTE_DESKTOP_PORT) {
        DeviceType::WindowsServer
    } else if host.open_ports.contains(&FTP_PORT) {
        DeviceType::FtpServer
    } else {
        DeviceType::Workstation
    }
}
