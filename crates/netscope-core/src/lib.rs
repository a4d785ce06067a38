//! netscope-core: Shared types, configuration, and error handling for netscope.
//!
//! This crate provides the foundational types used by the discovery engine
//! and its downstream consumers:
//! - Host, edge, and anomaly types making up a topology result
//! - Scan events and the event-sink seam
//! - Scan configuration with documented defaults
//! - Common error types

pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use config::ScanOptions;
pub use error::NetscopeError;
pub use events::{EventSink, ScanEvent};
