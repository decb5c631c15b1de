//! Error types for the invite ledger.

use thiserror::Error;

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while tracking invites.
#[derive(Debug, Error)]
pub enum Error {
    /// Ledger store error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A call into the chat platform failed
    #[error("Platform error: {0}")]
    Platform(String),

    /// Role, channel or member could not be resolved
    #[error("Not found: {0}")]
    NotFound(String),
}
