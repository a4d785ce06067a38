//! Scan lifecycle events.
//!
//! The engine notifies an [`EventSink`] as a scan progresses. Events are a
//! closed set of typed variants; sinks decide where they go (a log, a
//! channel to a UI, nowhere).

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::config::ScanOptions;
use crate::error::NetscopeError;
use crate::types::{Anomaly, HostId, ScanId, ScanStatistics, TopologyResult};

/// A notification emitted by the discovery engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum ScanEvent {
    /// A scan was accepted and is about to probe its range.
    ScanInitiated {
        scan_id: ScanId,
        range: String,
        options: ScanOptions,
    },
    /// An open port was found on a live host.
    PortDiscovered { host_id: HostId, port: u16 },
    /// A rule flagged a host.
    AnomalyDetected { anomaly: Anomaly },
    /// The in-progress result changed; carries a snapshot.
    TopologyUpdated {
        result: Box<TopologyResult>,
        change: ChangeKind,
    },
    /// The scan finished and its result was handed back to the caller.
    ScanCompleted {
        scan_id: ScanId,
        statistics: ScanStatistics,
        summary: String,
    },
}

impl ScanEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ScanEvent::ScanInitiated { .. } => "scan_initiated",
            ScanEvent::PortDiscovered { .. } => "port_discovered",
            ScanEvent::AnomalyDetected { .. } => "anomaly_detected",
            ScanEvent::TopologyUpdated { .. } => "topology_updated",
            ScanEvent::ScanCompleted { .. } => "scan_completed",
        }
    }
}

/// What part of the result a [`ScanEvent::TopologyUpdated`] reflects.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    HostsDiscovered,
    PortsScanned,
    HostsEnriched,
    EdgesBuilt,
    AnomaliesDetected,
}

/// Receiver of scan events.
///
/// Publishing is fire-and-forget: a failed publish is logged by the caller
/// and never affects the scan.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: ScanEvent) -> Result<(), NetscopeError>;
}

/// Writes every event as a structured log record.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn publish(&self, event: ScanEvent) -> Result<(), NetscopeError> {
        match &event {
            ScanEvent::ScanInitiated { scan_id, range, .. } => {
                tracing::info!(scan_id = %scan_id, range = %range, "Scan initiated");
            }
            ScanEvent::PortDiscovered { host_id, port } => {
                tracing::info!(host_id = %host_id, port, "Port discovered");
            }
            ScanEvent::AnomalyDetected { anomaly } => {
                tracing::warn!(
                    host_id = %anomaly.host_id,
                    category = ?anomaly.category,
                    severity = ?anomaly.severity,
                    "{}",
                    anomaly.description
                );
            }
            ScanEvent::TopologyUpdated { result, change } => {
                tracing::debug!(
                    scan_id = %result.scan_id,
                    change = ?change,
                    hosts = result.hosts.len(),
                    edges = result.edges.len(),
                    "Topology updated"
                );
            }
            ScanEvent::ScanCompleted {
                scan_id, summary, ..
            } => {
                tracing::info!(scan_id = %scan_id, "{summary}");
            }
        }
        Ok(())
    }
}

/// Forwards events over a tokio channel to a single consumer.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ScanEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<ScanEvent>) -> Self {
        Self { tx }
    }

    /// Create a sink together with the receiving end.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ScanEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn publish(&self, event: ScanEvent) -> Result<(), NetscopeError> {
        let name = event.name();
        self.tx
            .send(event)
            .map_err(|_| NetscopeError::EventSink(format!("receiver dropped ({name})")))
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn publish(&self, _event: ScanEvent) -> Result<(), NetscopeError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_payload_tags() {
        let payload = ScanEvent::PortDiscovered {
            host_id: HostId::new(),
            port: 22,
        };

        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains("\"event_type\":\"PortDiscovered\""));
        assert!(json.contains("\"port\":22"));
    }

    #[test]
    fn event_serialization_roundtrip() {
        let scan_id = ScanId::new();
        let event = ScanEvent::ScanInitiated {
            scan_id,
            range: "10.0.0.0/30".to_string(),
            options: ScanOptions::default(),
        };

        let json = serde_json::to_string(&event).unwrap();
        match serde_json::from_str::<ScanEvent>(&json).unwrap() {
            ScanEvent::ScanInitiated {
                scan_id: id, range, ..
            } => {
                assert_eq!(id, scan_id);
                assert_eq!(range, "10.0.0.0/30");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn channel_sink_delivers_in_order() {
        let (sink, mut rx) = ChannelSink::channel();
        let host_id = HostId::new();
        sink.publish(ScanEvent::PortDiscovered { host_id, port: 22 })
            .unwrap();
        sink.publish(ScanEvent::PortDiscovered { host_id, port: 80 })
            .unwrap();

        let ports: Vec<u16> = [rx.recv().await, rx.recv().await]
            .into_iter()
            .flatten()
            .filter_map(|e| match e {
                ScanEvent::PortDiscovered { port, .. } => Some(port),
                _ => None,
            })
            .collect();
        assert_eq!(ports, vec![22, 80]);
    }

    #[test]
    fn channel_sink_errors_when_receiver_dropped() {
        let (sink, rx) = ChannelSink::channel();
        drop(rx);
        let err = sink
            .publish(ScanEvent::PortDiscovered {
                host_id: HostId::new(),
                port: 443,
            })
            .unwrap_err();
        assert!(matches!(err, NetscopeError::EventSink(_)));
    }
}
