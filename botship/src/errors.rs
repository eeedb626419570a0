//! Error types for botship

use thiserror::Error;

/// Main error type for deployment operations
#[derive(Error, Debug)]
pub enum DeployError {
    /// The remote host could not be reached (ssh exit code 255, spawn failure)
    #[error("Connection error: {0}")]
    Connection(String),

    /// A remote command exited non-zero or produced unexpected output
    #[error("Command error: {0}")]
    Command(String),

    /// Malformed key or ciphertext
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// A named secret, backup or version does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Missing or invalid configuration
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Timed out after {secs}s: {what}")]
    Timeout { what: String, secs: u64 },

    #[error("Lock error: {0}")]
    Lock(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for DeployError {
    fn from(err: anyhow::Error) -> Self {
        DeployError::Internal(err.to_string())
    }
}

pub type DeployResult<T> = Result<T, DeployError>;
