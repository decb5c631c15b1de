//! Inviteward - Discord invite tracking bot
//!
//! Credits members who bring others into a server, keeps the ledger on
//! disk, and rewards inviters who reach the threshold with a role.

pub mod bot;
pub mod commands;
pub mod config;
pub mod error;
pub mod health;

pub use bot::Bot;
pub use config::BotConfig;
pub use error::{Error, Result};
