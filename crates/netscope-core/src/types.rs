//! Core domain types for a network topology scan.
//!
//! A scan produces a [`TopologyResult`]: the hosts that answered, the edges
//! inferred between them, the anomalies flagged on them, and statistics
//! about the run.

use std::collections::BTreeSet;
use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Identifiers ───────────────────────────────────────────────────

/// Unique identifier for a scan run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ScanId(pub Uuid);

impl ScanId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ScanId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ScanId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifier of a host, unique within one scan result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostId(pub Uuid);

impl HostId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for HostId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for HostId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

// ── Hosts ─────────────────────────────────────────────────────────

/// A network host that answered the liveness probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Host {
    pub id: HostId,
    pub ip: Ipv4Addr,
    pub hostname: String,
    pub mac: Option<String>,
    pub manufacturer: Option<String>,
    pub subnet_mask: Option<Ipv4Addr>,
    pub gateway: Option<Ipv4Addr>,
    pub dhcp_enabled: Option<bool>,
    pub open_ports: BTreeSet<u16>,
    pub online: bool,
    /// Round-trip time of the successful liveness probe, in milliseconds.
    pub latency_ms: f64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub device_type: DeviceType,
}

impl Host {
    /// A freshly discovered, online host with no enrichment and no ports.
    pub fn discovered(ip: Ipv4Addr, hostname: String, latency_ms: f64) -> Self {
        let now = Utc::now();
        Self {
            id: HostId::new(),
            ip,
            hostname,
            mac: None,
            manufacturer: None,
            subnet_mask: None,
            gateway: None,
            dhcp_enabled: None,
            open_ports: BTreeSet::new(),
            online: true,
            latency_ms,
            first_seen: now,
            last_seen: now,
            device_type: DeviceType::default(),
        }
    }

    /// Hostname used when reverse lookup yields nothing.
    pub fn placeholder_hostname(ip: Ipv4Addr) -> String {
        let [a, b, c, d] = ip.octets();
        format!("host-{a}-{b}-{c}-{d}")
    }
}

/// Device role inferred from open ports and interface metadata.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Router,
    NetworkDevice,
    WebServer,
    WindowsServer,
    FtpServer,
    #[default]
    Workstation,
}

/// Interface metadata reported by the platform for a local NIC.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NicRecord {
    pub ip: Ipv4Addr,
    pub mac: Option<String>,
    pub manufacturer: Option<String>,
    pub subnet_mask: Option<Ipv4Addr>,
    pub gateway: Option<Ipv4Addr>,
    #[serde(default)]
    pub dhcp_enabled: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

// ── Edges ─────────────────────────────────────────────────────────

/// An inferred connection between two hosts of the same result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Edge {
    pub from: HostId,
    pub to: HostId,
    pub connection_type: ConnectionType,
    pub label: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    Subnet,
    Gateway,
    Direct,
    Vpn,
    Wireless,
}

// ── Anomalies ─────────────────────────────────────────────────────

/// A heuristically flagged deviation on a host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anomaly {
    pub id: Uuid,
    pub host_id: HostId,
    pub category: AnomalyCategory,
    pub severity: Severity,
    pub description: String,
    pub recommended_action: String,
    #[serde(default)]
    pub resolved: bool,
    pub detected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyCategory {
    UnusualPortPattern,
    SuspiciousService,
}

/// Anomaly severity, ordered from `Info` (lowest) to `Critical`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

// ── Scan result ───────────────────────────────────────────────────

/// Aggregate figures computed when a scan finalizes.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScanStatistics {
    pub duration_ms: u64,
    /// Addresses the range expanded to, responding or not.
    pub addresses_probed: u32,
    /// Hosts present in the final host list.
    pub total_hosts_scanned: u32,
    pub active_hosts: u32,
    pub ports_probed: u32,
    pub ports_found: u32,
    pub anomalies_found: u32,
    pub scan_efficiency: f64,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ScanStatistics {
    /// Ratio of active hosts to hosts scanned, 0.0 when nothing was scanned.
    pub fn efficiency(active: u32, total: u32) -> f64 {
        if total == 0 {
            0.0
        } else {
            f64::from(active) / f64::from(total)
        }
    }
}

/// The graph produced by one scan invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyResult {
    pub scan_id: ScanId,
    pub range: String,
    pub timestamp: DateTime<Utc>,
    pub hosts: Vec<Host>,
    pub edges: Vec<Edge>,
    pub statistics: ScanStatistics,
    pub anomalies: Vec<Anomaly>,
}

impl TopologyResult {
    pub fn new(scan_id: ScanId, range: &str) -> Self {
        Self {
            scan_id,
            range: range.to_string(),
            timestamp: Utc::now(),
            hosts: Vec::new(),
            edges: Vec::new(),
            statistics: ScanStatistics::default(),
            anomalies: Vec::new(),
        }
    }

    pub fn host(&self, id: &HostId) -> Option<&Host> {
        self.hosts.iter().find(|h| &h.id == id)
    }
}
