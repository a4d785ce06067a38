//! Scan orchestration.
//!
//! Runs the phases of a scan in a fixed order:
//! ping sweep → port scan → enrichment → topology → anomalies → finalize.
//! Optional phases are skipped per [`ScanOptions`]; the order never changes
//! and never goes backwards.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use netscope_core::config::ScanOptions;
use netscope_core::events::{ChangeKind, EventSink, ScanEvent};
use netscope_core::types::{ScanId, ScanStatistics, TopologyResult};
use tokio_util::sync::CancellationToken;

use crate::anomaly::detect_anomalies;
use crate::enrich::{classify_hosts, enrich_hosts};
use crate::error::{DiscoverError, Result};
use crate::nic::NicProvider;
use crate::notify::publish;
use crate::ping::{ping_sweep, PingSettings};
use crate::ports::{port_scan, PortSettings};
use crate::range::parse_range;
use crate::retry::RetryPolicy;
use crate::topology::build_subnet_edges;
use crate::transport::ProbeTransport;

/// Scan phases in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ScanPhase {
    Init,
    PingSweep,
    PortScan,
    Enrich,
    BuildTopology,
    DetectAnomalies,
    Finalize,
}

/// Tracks the current phase of one scan and enforces forward-only moves.
struct PhaseTracker<'a> {
    scan_id: ScanId,
    current: ScanPhase,
    cancel: &'a CancellationToken,
}

impl<'a> PhaseTracker<'a> {
    fn new(scan_id: ScanId, cancel: &'a CancellationToken) -> Self {
        Self {
            scan_id,
            current: ScanPhase::Init,
            cancel,
        }
    }

    /// Move to `next`. No phase starts once cancellation has been observed.
    fn enter(&mut self, next: ScanPhase) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(DiscoverError::Cancelled);
        }
        debug_assert!(next > self.current, "phase {next:?} after {:?}", self.current);
        tracing::info!(scan_id = %self.scan_id, from = ?self.current, to = ?next, "Entering scan phase");
        self.current = next;
        Ok(())
    }
}

/// Drives a scan from a range expression to a finished [`TopologyResult`].
pub struct ScanOrchestrator<T, N, S> {
    transport: Arc<T>,
    nic: N,
    sink: Arc<S>,
    ping_retry: RetryPolicy,
    port_retry: RetryPolicy,
}

impl<T, N, S> ScanOrchestrator<T, N, S>
where
    T: ProbeTransport + 'static,
    N: NicProvider,
    S: EventSink + 'static,
{
    pub fn new(transport: T, nic: N, sink: S) -> Self {
        Self {
            transport: Arc::new(transport),
            nic,
            sink: Arc::new(sink),
            ping_retry: RetryPolicy::ping(),
            port_retry: RetryPolicy::port(),
        }
    }

    /// Override the default retry policies.
    pub fn with_retry_policies(mut self, ping: RetryPolicy, port: RetryPolicy) -> Self {
        self.ping_retry = ping;
        self.port_retry = port;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Scan `range` and return the complete result.
    ///
    /// Malformed ranges and invalid options fail before any probe is sent.
    /// If `cancel` fires, in-flight probes are allowed to finish but no
    /// further phase starts and [`DiscoverError::Cancelled`] is returned.
    pub async fn scan(
        &self,
        range: &str,
        options: &ScanOptions,
        cancel: &CancellationToken,
    ) -> Result<TopologyResult> {
        options.validate()?;
        let addresses = parse_range(range)?;
        let scan_id = ScanId::new();

        match self.run(scan_id, range, &addresses, options, cancel).await {
            Ok(result) => Ok(result),
            Err(DiscoverError::Cancelled) => {
                tracing::warn!(scan_id = %scan_id, range = %range, "Scan cancelled");
                Err(DiscoverError::Cancelled)
            }
            Err(e) => {
                tracing::error!(scan_id = %scan_id, range = %range, error = %e, "Scan aborted");
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        scan_id: ScanId,
        range: &str,
        addresses: &[std::net::Ipv4Addr],
        options: &ScanOptions,
        cancel: &CancellationToken,
    ) -> Result<TopologyResult> {
        let clock = Instant::now();
        let started_at = Utc::now();
        let mut result = TopologyResult::new(scan_id, range);
        let mut phase = PhaseTracker::new(scan_id, cancel);

        publish(
            self.sink.as_ref(),
            ScanEvent::ScanInitiated {
                scan_id,
                range: range.to_string(),
                options: options.clone(),
            },
        );

        phase.enter(ScanPhase::PingSweep)?;
        let ping = PingSettings {
            timeout: options.ping_timeout(),
            max_concurrent: options.max_concurrent_pings,
            retry: self.ping_retry,
        };
        result.hosts = ping_sweep(Arc::clone(&self.transport), addresses, &ping, cancel).await?;
        self.snapshot(&result, ChangeKind::HostsDiscovered);

        let mut ports_probed = 0;
        if options.enable_port_scan {
            phase.enter(ScanPhase::PortScan)?;
            let ports = PortSettings {
                ports: options.effective_ports(),
                timeout: options.port_timeout(),
                max_concurrent_hosts: options.max_concurrent_hosts,
                max_concurrent_ports_per_host: options.effective_port_bound(),
                retry: self.port_retry,
            };
            ports_probed = result.hosts.len() * ports.ports.len();
            let hosts = std::mem::take(&mut result.hosts);
            result.hosts = port_scan(
                Arc::clone(&self.transport),
                Arc::clone(&self.sink),
                hosts,
                &ports,
                cancel,
            )
            .await?;
            self.snapshot(&result, ChangeKind::PortsScanned);
        }

        let mut records = Vec::new();
        if options.enable_enrichment {
            phase.enter(ScanPhase::Enrich)?;
            let interfaces = tokio::select! {
                _ = cancel.cancelled() => return Err(DiscoverError::Cancelled),
                interfaces = self.nic.interfaces() => interfaces,
            };
            records = match interfaces {
                Ok(records) => records,
                Err(e) => {
                    tracing::warn!(
                        scan_id = %scan_id,
                        error = %e,
                        "NIC metadata unavailable, continuing without enrichment"
                    );
                    Vec::new()
                }
            };
            let enriched = enrich_hosts(&mut result.hosts, &records);
            tracing::info!(scan_id = %scan_id, enriched, "Hosts enriched");
        }
        classify_hosts(&mut result.hosts, &records);
        if options.enable_enrichment {
            self.snapshot(&result, ChangeKind::HostsEnriched);
        }

        phase.enter(ScanPhase::BuildTopology)?;
        result.edges = build_subnet_edges(&result.hosts);
        self.snapshot(&result, ChangeKind::EdgesBuilt);

        if options.enable_anomaly_detection {
            phase.enter(ScanPhase::DetectAnomalies)?;
            result.anomalies = detect_anomalies(&result.hosts, &options.anomaly_rules);
            for anomaly in &result.anomalies {
                publish(
                    self.sink.as_ref(),
                    ScanEvent::AnomalyDetected {
                        anomaly: anomaly.clone(),
                    },
                );
            }
            self.snapshot(&result, ChangeKind::AnomaliesDetected);
        }

        phase.enter(ScanPhase::Finalize)?;
        result.statistics = statistics(&result, addresses.len(), ports_probed, clock, started_at);
        let summary = summarize(&result);

        tracing::info!(
            scan_id = %scan_id,
            range = %range,
            hosts = result.statistics.total_hosts_scanned,
            ports_found = result.statistics.ports_found,
            anomalies = result.statistics.anomalies_found,
            duration_ms = result.statistics.duration_ms,
            "Scan complete"
        );

        publish(
            self.sink.as_ref(),
            ScanEvent::ScanCompleted {
                scan_id,
                statistics: result.statistics.clone(),
                summary,
            },
        );

        Ok(result)
    }

    fn snapshot(&self, result: &TopologyResult, change: ChangeKind) {
        publish(
            self.sink.as_ref(),
            ScanEvent::TopologyUpdated {
                result: Box::new(result.clone()),
                change,
            },
        );
    }
}

fn statistics(
    result: &TopologyResult,
    addresses_probed: usize,
    ports_probed: usize,
    clock: Instant,
    started_at: chrono::DateTime<Utc>,
) -> ScanStatistics {
    let total = result.hosts.len() as u32;
    let active = result.hosts.iter().filter(|h| h.online).count() as u32;

    ScanStatistics {
        duration_ms: clock.elapsed().as_millis() as u64,
        addresses_probed: addresses_probed as u32,
        total_hosts_scanned: total,
        active_hosts: active,
        ports_probed: ports_probed as u32,
        ports_found: result.hosts.iter().map(|h| h.open_ports.len() as u32).sum(),
        anomalies_found: result.anomalies.len() as u32,
        scan_efficiency: ScanStatistics::efficiency(active, total),
        started_at: Some(started_at),
        finished_at: Some(Utc::now()),
    }
}

fn summarize(result: &TopologyResult) -> String {
    let stats = &result.statistics;
    format!(
        "Scanned {}: {} of {} addresses active, {} open ports, {} edges, {} anomalies in {}ms",
        result.range,
        stats.active_hosts,
        stats.addresses_probed,
        stats.ports_found,
        result.edges.len(),
        stats.anomalies_found,
        stats.duration_ms
    )
}
