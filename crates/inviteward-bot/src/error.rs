//! Error types for the bot.

use thiserror::Error;

/// Result type for bot operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that stop the bot.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or malformed configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Ledger or store failure
    #[error(transparent)]
    Ledger(#[from] inviteward_ledger::Error),

    /// Discord failure
    #[error(transparent)]
    Discord(#[from] inviteward_discord::Error),
}
