//! Error types for brain-daemon

use brain_pipeline::PipelineError;
use thiserror::Error;

/// Daemon-level errors
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Catalog could not be read or registered
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// Replay script could not be read
    #[error("Replay script error: {0}")]
    Script(String),

    /// Brain operation error
    #[error(transparent)]
    Brain(#[from] PipelineError),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for DaemonError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

pub type DaemonResult<T> = std::result::Result<T, DaemonError>;
