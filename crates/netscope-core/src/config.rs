//! Scan configuration.
//!
//! Loaded from the `[scan]` section of `netscope.toml` or
//! `NETSCOPE_SCAN__` environment variables. Every field has a default, so an
//! empty section yields [`ScanOptions::default`].

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::NetscopeError;

/// Ports probed when no explicit list is configured.
pub const DEFAULT_PORTS: [u16; 12] = [21, 22, 23, 25, 53, 80, 110, 143, 443, 993, 995, 3389];

/// Per-host connect bound applied to a full 1-65535 sweep when none is set.
pub const FULL_SWEEP_PORT_BOUND: usize = 1024;

/// Options controlling a single scan invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanOptions {
    /// Liveness probe timeout per address, in milliseconds.
    #[serde(default = "default_ping_timeout_ms")]
    pub ping_timeout_ms: u64,

    /// Admission gate for concurrent liveness probes.
    #[serde(default = "default_max_concurrent_pings")]
    pub max_concurrent_pings: usize,

    /// TCP ports probed on every live host.
    #[serde(default = "default_ports")]
    pub ports: Vec<u16>,

    /// Connect timeout per port, in milliseconds.
    #[serde(default = "default_port_timeout_ms")]
    pub port_timeout_ms: u64,

    /// Admission gate for hosts being port scanned at once.
    #[serde(default = "default_max_concurrent_hosts")]
    pub max_concurrent_hosts: usize,

    /// Optional bound on concurrent connects within one host.
    /// Unset means every port of a host is probed at once.
    #[serde(default)]
    pub max_concurrent_ports_per_host: Option<usize>,

    /// Sweep 1-65535 instead of `ports`.
    #[serde(default)]
    pub scan_all_ports: bool,

    #[serde(default = "default_true")]
    pub enable_port_scan: bool,

    #[serde(default = "default_true")]
    pub enable_enrichment: bool,

    #[serde(default = "default_true")]
    pub enable_anomaly_detection: bool,

    #[serde(default)]
    pub anomaly_rules: AnomalyRules,
}

/// Thresholds used by the anomaly rules.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnomalyRules {
    /// Hosts with strictly more open ports than this are flagged.
    #[serde(default = "default_port_count_threshold")]
    pub port_count_threshold: usize,

    /// Ports whose exposure is flagged as a suspicious service.
    #[serde(default = "default_suspicious_ports")]
    pub suspicious_ports: Vec<u16>,
}

fn default_ping_timeout_ms() -> u64 {
    1000
}

fn default_max_concurrent_pings() -> usize {
    50
}

fn default_ports() -> Vec<u16> {
    DEFAULT_PORTS.to_vec()
}

fn default_port_timeout_ms() -> u64 {
    2000
}

fn default_max_concurrent_hosts() -> usize {
    10
}

fn default_true() -> bool {
    true
}

fn default_port_count_threshold() -> usize {
    20
}

fn default_suspicious_ports() -> Vec<u16> {
    vec![135, 139, 445, 1433, 3389]
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            ping_timeout_ms: default_ping_timeout_ms(),
            max_concurrent_pings: default_max_concurrent_pings(),
            ports: default_ports(),
            port_timeout_ms: default_port_timeout_ms(),
            max_concurrent_hosts: default_max_concurrent_hosts(),
            max_concurrent_ports_per_host: None,
            scan_all_ports: false,
            enable_port_scan: true,
            enable_enrichment: true,
            enable_anomaly_detection: true,
            anomaly_rules: AnomalyRules::default(),
        }
    }
}

impl Default for AnomalyRules {
    fn default() -> Self {
        Self {
            port_count_threshold: default_port_count_threshold(),
            suspicious_ports: default_suspicious_ports(),
        }
    }
}

impl ScanOptions {
    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }

    pub fn port_timeout(&self) -> Duration {
        Duration::from_millis(self.port_timeout_ms)
    }

    /// The ports a scan will actually probe, deduplicated and ascending.
    pub fn effective_ports(&self) -> Vec<u16> {
        if self.scan_all_ports {
            return (1..=u16::MAX).collect();
        }
        let mut ports = self.ports.clone();
        ports.sort_unstable();
        ports.dedup();
        ports.retain(|&p| p != 0);
        ports
    }

    /// Per-host connect bound, if any. A full sweep is always bounded.
    pub fn effective_port_bound(&self) -> Option<usize> {
        match (self.max_concurrent_ports_per_host, self.scan_all_ports) {
            (Some(n), _) => Some(n),
            (None, true) => Some(FULL_SWEEP_PORT_BOUND),
            (None, false) => None,
        }
    }

    /// Reject settings that would stall or make a scan meaningless.
    pub fn validate(&self) -> Result<(), NetscopeError> {
        if self.max_concurrent_pings == 0 {
            return Err(NetscopeError::Config(
                "max_concurrent_pings must be at least 1".into(),
            ));
        }
        if self.max_concurrent_hosts == 0 {
            return Err(NetscopeError::Config(
                "max_concurrent_hosts must be at least 1".into(),
            ));
        }
        if self.max_concurrent_ports_per_host == Some(0) {
            return Err(NetscopeError::Config(
                "max_concurrent_ports_per_host must be at least 1 when set".into(),
            ));
        }
        if self.ping_timeout_ms == 0 || self.port_timeout_ms == 0 {
            return Err(NetscopeError::Config("timeouts must be non-zero".into()));
        }
        if self.enable_port_scan && !self.scan_all_ports && self.effective_ports().is_empty() {
            return Err(NetscopeError::Config(
                "port scan enabled with an empty port list".into(),
            ));
        }
        Ok(())
    }
}
