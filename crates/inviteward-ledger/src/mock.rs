//! In-memory platform for testing.

use crate::error::{Error, Result};
use crate::ids::{ChannelId, GuildId, UserId};
use crate::platform::{Member, Platform};
use crate::snapshot::{Invite, Inviter};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// A recorded role mutation or message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Grant { guild: GuildId, user: UserId, role: String },
    Revoke { guild: GuildId, user: UserId, role: String },
    Message { channel: ChannelId, text: String },
}

#[derive(Debug, Default)]
struct GuildState {
    invites: Vec<Invite>,
    members: HashMap<UserId, Member>,
    roles: Vec<String>,
    system_channel: Option<ChannelId>,
    fail_invites: bool,
}

/// Mock platform holding guilds, invites and members in memory.
///
/// Role grants and revokes update the stored member so later lookups see
/// them, and every mutation is recorded in [`MockPlatform::calls`].
#[derive(Debug, Default)]
pub struct MockPlatform {
    guilds: Mutex<HashMap<GuildId, GuildState>>,
    calls: Mutex<Vec<Call>>,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    fn guilds(&self) -> MutexGuard<'_, HashMap<GuildId, GuildState>> {
        self.guilds.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).push(call);
    }

    /// Register a guild with a system channel and the roles it defines.
    pub fn add_guild(&self, guild: GuildId, system_channel: Option<ChannelId>, roles: &[&str]) {
        let mut guilds = self.guilds();
        let state = guilds.entry(guild).or_default();
        state.system_channel = system_channel;
        state.roles = roles.iter().map(|r| r.to_string()).collect();
    }

    /// Add or replace a member.
    pub fn add_member(&self, guild: GuildId, member: Member) {
        self.guilds()
            .entry(guild)
            .or_default()
            .members
            .insert(member.id, member);
    }

    /// Remove a member.
    pub fn remove_member(&self, guild: GuildId, user: UserId) {
        if let Some(state) = self.guilds().get_mut(&guild) {
            state.members.remove(&user);
        }
    }

    /// Create an invite with zero uses.
    pub fn add_invite(&self, guild: GuildId, code: &str, inviter: Option<UserId>) {
        let mut guilds = self.guilds();
        let state = guilds.entry(guild).or_default();
        let inviter = inviter.map(|id| Inviter {
            id,
            name: state
                .members
                .get(&id)
                .map(|m| m.name.clone())
                .unwrap_or_else(|| format!("user{}", id)),
        });
        state.invites.push(Invite::new(code, inviter, 0));
    }

    /// Bump an invite's use counter, as the platform does when it is redeemed.
    pub fn use_invite(&self, guild: GuildId, code: &str) {
        if let Some(state) = self.guilds().get_mut(&guild) {
            if let Some(invite) = state.invites.iter_mut().find(|i| i.code == code) {
                invite.uses += 1;
            }
        }
    }

    /// Delete an invite.
    pub fn delete_invite(&self, guild: GuildId, code: &str) {
        if let Some(state) = self.guilds().get_mut(&guild) {
            state.invites.retain(|i| i.code != code);
        }
    }

    /// Make invite queries for a guild fail.
    pub fn set_fail_invites(&self, guild: GuildId, fail: bool) {
        self.guilds().entry(guild).or_default().fail_invites = fail;
    }

    /// Current state of a member.
    pub fn member(&self, guild: GuildId, user: UserId) -> Option<Member> {
        self.guilds()
            .get(&guild)
            .and_then(|s| s.members.get(&user).cloned())
    }

    /// All recorded calls, oldest first.
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Recorded grants.
    pub fn grants(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Grant { .. }))
            .collect()
    }

    /// Recorded revokes.
    pub fn revokes(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Revoke { .. }))
            .collect()
    }

    /// Recorded message texts.
    pub fn messages(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Message { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl Platform for MockPlatform {
    async fn list_invites(&self, guild: GuildId) -> Result<Vec<Invite>> {
        let guilds = self.guilds();
        let state = guilds
            .get(&guild)
            .ok_or_else(|| Error::NotFound(format!("guild {}", guild)))?;
        if state.fail_invites {
            return Err(Error::Platform("Missing Permissions".into()));
        }
        Ok(state.invites.clone())
    }

    async fn resolve_member(&self, guild: GuildId, user: UserId) -> Result<Option<Member>> {
        Ok(self.member(guild, user))
    }

    async fn grant_role(&self, guild: GuildId, user: UserId, role: &str) -> Result<()> {
        {
            let mut guilds = self.guilds();
            let state = guilds
                .get_mut(&guild)
                .ok_or_else(|| Error::NotFound(format!("guild {}", guild)))?;
            if !state.roles.iter().any(|r| r == role) {
                return Err(Error::NotFound(format!("role {}", role)));
            }
            let member = state
                .members
                .get_mut(&user)
                .ok_or_else(|| Error::NotFound(format!("member {}", user)))?;
            if !member.has_role(role) {
                member.roles.push(role.to_string());
            }
        }
        self.record(Call::Grant {
            guild,
            user,
            role: role.to_string(),
        });
        Ok(())
    }

    async fn revoke_role(&self, guild: GuildId, user: UserId, role: &str) -> Result<()> {
        {
            let mut guilds = self.guilds();
            let state = guilds
                .get_mut(&guild)
                .ok_or_else(|| Error::NotFound(format!("guild {}", guild)))?;
            let member = state
                .members
                .get_mut(&user)
                .ok_or_else(|| Error::NotFound(format!("member {}", user)))?;
            member.roles.retain(|r| r != role);
        }
        self.record(Call::Revoke {
            guild,
            user,
            role: role.to_string(),
        });
        Ok(())
    }

    async fn send_message(&self, channel: ChannelId, text: &str) -> Result<()> {
        self.record(Call::Message {
            channel,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn default_channel(&self, guild: GuildId) -> Result<Option<ChannelId>> {
        Ok(self.guilds().get(&guild).and_then(|s| s.system_channel))
    }
}
