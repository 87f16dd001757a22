//! Error types for the containerd charm

use thiserror::Error;

/// Result type for charm operations
pub type Result<T> = std::result::Result<T, CharmError>;

/// Charm error types
#[derive(Error, Debug)]
pub enum CharmError {
    /// Malformed or unsupported input. Retrying with the same input cannot succeed.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Render error: {0}")]
    Render(String),

    #[error("Service error: {0}")]
    Service(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CharmError {
    /// Whether this error was caused by the supplied configuration
    pub fn is_validation(&self) -> bool {
        matches!(self, CharmError::Validation(_))
    }
}
