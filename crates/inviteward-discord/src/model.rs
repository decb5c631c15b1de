//! Discord API payloads.
//!
//! Only the fields the tracker reads are modelled; serde ignores the rest.

use inviteward_ledger::{ChannelId, GuildId, Invite, Inviter, Member, RoleId, UserId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A Discord user.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub global_name: Option<String>,
    #[serde(default)]
    pub bot: bool,
}

impl User {
    /// Member view without guild roles.
    pub fn to_member(&self) -> Member {
        Member {
            id: self.id,
            name: self.username.clone(),
            display_name: self.global_name.clone(),
            roles: Vec::new(),
            bot: self.bot,
        }
    }
}

/// Guild member object.
#[derive(Debug, Clone, Deserialize)]
pub struct GuildMember {
    pub user: User,
    #[serde(default)]
    pub nick: Option<String>,
    #[serde(default)]
    pub roles: Vec<RoleId>,
}

impl GuildMember {
    /// Convert to a tracker member, naming roles through `roles`.
    ///
    /// Role ids missing from the map are skipped.
    pub fn to_member(&self, roles: &HashMap<RoleId, String>) -> Member {
        let mut member = self.user.to_member();
        if let Some(nick) = &self.nick {
            member.display_name = Some(nick.clone());
        }
        member.roles = self
            .roles
            .iter()
            .filter_map(|id| roles.get(id).cloned())
            .collect();
        member
    }
}

/// Guild role.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
}

/// The guild fields we care about.
#[derive(Debug, Clone, Deserialize)]
pub struct Guild {
    pub id: GuildId,
    #[serde(default)]
    pub system_channel_id: Option<ChannelId>,
}

/// Invite with metadata, as returned by `GET /guilds/{id}/invites`.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiInvite {
    pub code: String,
    #[serde(default)]
    pub inviter: Option<User>,
    #[serde(default)]
    pub uses: u64,
}

impl From<ApiInvite> for Invite {
    fn from(invite: ApiInvite) -> Self {
        Invite {
            code: invite.code,
            inviter: invite.inviter.map(|u| Inviter {
                id: u.id,
                name: u.username,
            }),
            uses: invite.uses,
        }
    }
}

/// Body for `POST /channels/{id}/messages`.
#[derive(Debug, Serialize)]
pub struct CreateMessage<'a> {
    pub content: &'a str,
    pub allowed_mentions: AllowedMentions,
}

/// Restricts which mentions in a message actually ping.
#[derive(Debug, Serialize)]
pub struct AllowedMentions {
    pub parse: Vec<&'static str>,
}

impl AllowedMentions {
    /// Ping users only; never @everyone or roles.
    pub fn users() -> Self {
        Self { parse: vec!["users"] }
    }
}

/// Error body Discord sends with 4xx responses.
#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub code: u64,
    #[serde(default)]
    pub message: String,
}

/// Body of a 429 response.
#[derive(Debug, Deserialize)]
pub struct RateLimited {
    pub retry_after: f64,
}
