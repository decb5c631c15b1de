//! Chat platform capabilities consumed by the tracker.
//!
//! This trait is the seam between attribution logic and the network: the
//! Discord adapter implements it for production, [`crate::mock::MockPlatform`]
//! for tests.

use crate::error::Result;
use crate::ids::{ChannelId, GuildId, UserId};
use crate::snapshot::Invite;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A resolved guild member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: UserId,

    /// Account username
    pub name: String,

    /// Guild nickname, falling back to the global display name
    pub display_name: Option<String>,

    /// Names of the roles the member holds
    pub roles: Vec<String>,

    /// Whether the account is a bot
    #[serde(default)]
    pub bot: bool,
}

impl Member {
    pub fn new(id: UserId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            display_name: None,
            roles: Vec::new(),
            bot: false,
        }
    }

    /// Add a role name.
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    /// Whether the member holds a role with this name.
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Name shown in reports.
    pub fn display(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }

    /// Platform mention markup.
    pub fn mention(&self) -> String {
        format!("<@{}>", self.id)
    }
}

/// Operations the tracker needs from the chat platform.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Current invites of a guild.
    async fn list_invites(&self, guild: GuildId) -> Result<Vec<Invite>>;

    /// Look up a member; `Ok(None)` if they are not in the guild.
    async fn resolve_member(&self, guild: GuildId, user: UserId) -> Result<Option<Member>>;

    /// Give a member the role with this name.
    async fn grant_role(&self, guild: GuildId, user: UserId, role: &str) -> Result<()>;

    /// Take the role with this name away from a member.
    async fn revoke_role(&self, guild: GuildId, user: UserId, role: &str) -> Result<()>;

    /// Post to a channel.
    async fn send_message(&self, channel: ChannelId, text: &str) -> Result<()>;

    /// The guild's default (system) channel, if it has one.
    async fn default_channel(&self, guild: GuildId) -> Result<Option<ChannelId>>;
}

#[async_trait]
impl<P: Platform + ?Sized> Platform for std::sync::Arc<P> {
    async fn list_invites(&self, guild: GuildId) -> Result<Vec<Invite>> {
        (**self).list_invites(guild).await
    }

    async fn resolve_member(&self, guild: GuildId, user: UserId) -> Result<Option<Member>> {
        (**self).resolve_member(guild, user).await
    }

    async fn grant_role(&self, guild: GuildId, user: UserId, role: &str) -> Result<()> {
        (**self).grant_role(guild, user, role).await
    }

    async fn revoke_role(&self, guild: GuildId, user: UserId, role: &str) -> Result<()> {
        (**self).revoke_role(guild, user, role).await
    }

    async fn send_message(&self, channel: ChannelId, text: &str) -> Result<()> {
        (**self).send_message(channel, text).await
    }

    async fn default_channel(&self, guild: GuildId) -> Result<Option<ChannelId>> {
        (**self).default_channel(guild).await
    }
}
