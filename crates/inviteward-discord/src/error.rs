//! Error types for the Discord adapter.

use thiserror::Error;

/// Result type for Discord operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors talking to Discord.
#[derive(Debug, Error)]
pub enum Error {
    /// Transport-level HTTP failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Discord answered with a non-success status
    #[error("Discord API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Gateway protocol failure
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// Websocket transport failure
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The bot token cannot be sent as a header
    #[error("invalid bot token")]
    InvalidToken,

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A role or guild named in a request does not exist
    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<Error> for inviteward_ledger::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::NotFound(what) => inviteward_ledger::Error::NotFound(what),
            other => inviteward_ledger::Error::Platform(other.to_string()),
        }
    }
}
