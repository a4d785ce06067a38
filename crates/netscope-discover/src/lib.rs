//! netscope-discover: network discovery and topology engine.
//!
//! Expands a range expression into addresses, finds live hosts, probes
//! their TCP ports, merges local NIC metadata, infers subnet edges and
//! flags anomalous hosts. [`ScanOrchestrator`] runs the whole pipeline.

pub mod anomaly;
pub mod enrich;
pub mod error;
pub mod nic;
mod notify;
pub mod orchestrator;
pub mod ping;
pub mod ports;
pub mod range;
pub mod retry;
pub mod topology;
pub mod transport;

pub use error::{DiscoverError, Result};
pub use nic::{NicProvider, StaticNicProvider, SystemNicProvider};
pub use orchestrator::{ScanOrchestrator, ScanPhase};
pub use range::parse_range;
pub use retry::RetryPolicy;
pub use transport::{ProbeError, ProbeTransport, SystemTransport};
