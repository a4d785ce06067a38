//! Error types for the netscope-discover crate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DiscoverError {
    #[error("Invalid range format: {input:?} (expected a.b.c.d/n, a.b.c.d-e.f.g.h or a.b.c.d)")]
    InvalidRangeFormat { input: String },

    #[error("Range {input:?} expands to {count} addresses (limit {limit})")]
    RangeTooLarge {
        input: String,
        count: u64,
        limit: u64,
    },

    #[error("Invalid scan options: {0}")]
    InvalidOptions(#[from] netscope_core::NetscopeError),

    #[error("Probe of {target} failed: {reason}")]
    Probe { target: String, reason: String },

    #[error("Scan cancelled")]
    Cancelled,

    #[error("Scan worker failed: {0}")]
    TaskFailed(#[from] tokio::task::JoinError),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DiscoverError>;
