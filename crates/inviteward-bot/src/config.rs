//! Bot configuration.
//!
//! Everything comes from the environment; a `.env` file in the working
//! directory is loaded first when present.

use crate::error::{Error, Result};
use inviteward_ledger::access::DEFAULT_ACCESS_ROLE;
use inviteward_ledger::threshold::DEFAULT_REWARD_ROLE;
use inviteward_ledger::{AccessGate, TrackerConfig, MIN_INVITES};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

/// Bot configuration.
#[derive(Clone)]
pub struct BotConfig {
    /// Discord bot token
    pub token: String,

    /// Command prefix
    pub prefix: String,

    /// Ledger file
    pub data_file: PathBuf,

    /// Role granted at the invite threshold
    pub reward_role: String,

    /// Invites needed for the reward role
    pub min_invites: u64,

    /// Role allowed to read invite reports
    pub access_role: String,

    /// Username allowed to read reports without the access role
    pub access_override: Option<String>,

    /// Liveness endpoint listen address
    pub health_addr: SocketAddr,

    /// Log file; `None` logs to stdout only
    pub log_file: Option<PathBuf>,
}

impl std::fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotConfig")
            .field("token", &"<redacted>")
            .field("prefix", &self.prefix)
            .field("data_file", &self.data_file)
            .field("reward_role", &self.reward_role)
            .field("min_invites", &self.min_invites)
            .field("access_role", &self.access_role)
            .field("access_override", &self.access_override)
            .field("health_addr", &self.health_addr)
            .field("log_file", &self.log_file)
            .finish()
    }
}

impl BotConfig {
    /// Create config from environment variables with sensible defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let token = lookup("DISCORD_TOKEN")
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::Config("DISCORD_TOKEN is not set".into()))?;

        let prefix = lookup("INVITEWARD_PREFIX").unwrap_or_else(|| "!".to_string());
        if prefix.is_empty() || prefix.chars().any(char::is_whitespace) {
            return Err(Error::Config(format!("Invalid INVITEWARD_PREFIX: {:?}", prefix)));
        }

        let data_file = PathBuf::from(
            lookup("INVITEWARD_DATA_FILE").unwrap_or_else(|| "invite_data.json".to_string()),
        );

        let reward_role =
            lookup("INVITEWARD_REWARD_ROLE").unwrap_or_else(|| DEFAULT_REWARD_ROLE.to_string());
        let min_invites = parse_or(&lookup, "INVITEWARD_MIN_INVITES", MIN_INVITES)?;
        let access_role =
            lookup("INVITEWARD_ACCESS_ROLE").unwrap_or_else(|| DEFAULT_ACCESS_ROLE.to_string());
        let access_override = lookup("INVITEWARD_ACCESS_OVERRIDE").filter(|u| !u.is_empty());

        let health_addr = parse_or(
            &lookup,
            "INVITEWARD_HEALTH_ADDR",
            SocketAddr::from(([0, 0, 0, 0], 8080)),
        )?;

        let log_file = match lookup("INVITEWARD_LOG_FILE") {
            Some(path) if path.is_empty() => None,
            Some(path) => Some(PathBuf::from(path)),
            None => Some(PathBuf::from("bot.log")),
        };

        Ok(Self {
            token,
            prefix,
            data_file,
            reward_role,
            min_invites,
            access_role,
            access_override,
            health_addr,
            log_file,
        })
    }

    pub fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            reward_role: self.reward_role.clone(),
            min_invites: self.min_invites,
        }
    }

    pub fn access_gate(&self) -> AccessGate {
        AccessGate::new(self.access_role.clone(), self.access_override.clone())
    }
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("Invalid {}: {:?}", key, raw))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<BotConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        BotConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let config = config(&[("DISCORD_TOKEN", "abc")]).unwrap();
        assert_eq!(config.prefix, "!");
        assert_eq!(config.data_file, PathBuf::from("invite_data.json"));
        assert_eq!(config.reward_role, "VIP");
        assert_eq!(config.min_invites, 10);
        assert_eq!(config.access_role, "DF");
        assert_eq!(config.access_override, None);
        assert_eq!(config.health_addr.port(), 8080);
        assert_eq!(config.log_file, Some(PathBuf::from("bot.log")));
    }

    #[test]
    fn token_is_required() {
        assert!(matches!(config(&[]), Err(Error::Config(_))));
        assert!(matches!(config(&[("DISCORD_TOKEN", "  ")]), Err(Error::Config(_))));
    }

    #[test]
    fn overrides() {
        let config = config(&[
            ("DISCORD_TOKEN", "abc"),
            ("INVITEWARD_PREFIX", "?"),
            ("INVITEWARD_MIN_INVITES", "5"),
            ("INVITEWARD_ACCESS_OVERRIDE", "owner"),
            ("INVITEWARD_HEALTH_ADDR", "127.0.0.1:9000"),
            ("INVITEWARD_LOG_FILE", ""),
        ])
        .unwrap();
        assert_eq!(config.prefix, "?");
        assert_eq!(config.tracker_config().min_invites, 5);
        assert_eq!(config.access_override.as_deref(), Some("owner"));
        assert_eq!(config.health_addr, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(config.log_file, None);
    }

    #[test]
    fn invalid_values_are_errors() {
        assert!(config(&[("DISCORD_TOKEN", "abc"), ("INVITEWARD_MIN_INVITES", "ten")]).is_err());
        assert!(config(&[("DISCORD_TOKEN", "abc"), ("INVITEWARD_HEALTH_ADDR", "nowhere")]).is_err());
        assert!(config(&[("DISCORD_TOKEN", "abc"), ("INVITEWARD_PREFIX", "")]).is_err());
    }

    #[test]
    fn debug_hides_token() {
        let config = config(&[("DISCORD_TOKEN", "secret-token")]).unwrap();
        assert!(!format!("{:?}", config).contains("secret-token"));
    }
}
