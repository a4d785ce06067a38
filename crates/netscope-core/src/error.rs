use thiserror::Error;

/// Top-level error type shared by netscope crates.
#[derive(Error, Debug)]
pub enum NetscopeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Event sink error: {0}")]
    EventSink(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}
