//! Host error types

use padflow_engine::PadflowError;
use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum HostError {
    #[error(transparent)]
    Engine(#[from] PadflowError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to read snapshot {path}: {source}")]
    Snapshot {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed snapshot {path}: {source}")]
    MalformedSnapshot {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Usage(String),
}

pub type Result<T> = std::result::Result<T, HostError>;
