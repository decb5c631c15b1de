//! Inviteward Discord - the Discord side of the invite tracker
//!
//! - [`DiscordClient`]: REST calls behind the [`Platform`](inviteward_ledger::Platform) trait
//! - [`Gateway`]: websocket session producing [`GatewayEvent`]s

pub mod error;
pub mod gateway;
pub mod model;
pub mod rest;

pub use error::{Error, Result};
pub use gateway::{intents, Gateway, GatewayConfig, GatewayEvent, IncomingMessage, Latency};
pub use rest::DiscordClient;
