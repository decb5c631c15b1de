//! Discord REST client.
//!
//! Implements [`Platform`] on top of the v10 HTTP API. Role names are
//! translated to ids through a per-guild role cache that is refetched
//! whenever a lookup misses.

use crate::error::{Error, Result};
use crate::model::{
    AllowedMentions, ApiErrorBody, ApiInvite, CreateMessage, Guild, GuildMember, RateLimited, Role,
};
use async_trait::async_trait;
use inviteward_ledger::{ChannelId, GuildId, Invite, Member, Platform, RoleId, UserId};
use reqwest::{header, Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Default REST base URL.
pub const API_BASE: &str = "https://discord.com/api/v10";

/// Attempts per request when Discord rate limits us.
const MAX_ATTEMPTS: usize = 3;

/// Discord "Unknown Member" error code.
const UNKNOWN_MEMBER: u64 = 10007;

/// Discord REST client. Cheap to clone.
#[derive(Clone)]
pub struct DiscordClient {
    http: Client,
    base_url: String,
    roles: Arc<RwLock<HashMap<GuildId, Vec<Role>>>>,
}

impl DiscordClient {
    /// Create a client authenticating with a bot token.
    pub fn new(token: &str) -> Result<Self> {
        Self::with_base_url(token, API_BASE)
    }

    /// Create a client against a different API root.
    pub fn with_base_url(token: &str, base_url: impl Into<String>) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        let mut auth = header::HeaderValue::from_str(&format!("Bot {}", token))
            .map_err(|_| Error::InvalidToken)?;
        auth.set_sensitive(true);
        headers.insert(header::AUTHORIZATION, auth);

        let http = Client::builder()
            .default_headers(headers)
            .user_agent(concat!(
                "DiscordBot (https://github.com/inviteward/inviteward, ",
                env!("CARGO_PKG_VERSION"),
                ")"
            ))
            .timeout(Duration::from_secs(15))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            roles: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a request, waiting out rate limits.
    async fn send(&self, method: Method, path: &str, build: impl Fn(RequestBuilder) -> RequestBuilder) -> Result<Response> {
        let url = self.url(path);
        for attempt in 1..=MAX_ATTEMPTS {
            let response = build(self.http.request(method.clone(), &url)).send().await?;

            if response.status() == StatusCode::TOO_MANY_REQUESTS && attempt < MAX_ATTEMPTS {
                let wait = response
                    .json::<RateLimited>()
                    .await
                    .map(|r| r.retry_after)
                    .unwrap_or(1.0);
                tracing::warn!(%method, path, "Rate limited, retrying in {:.2}s", wait);
                tokio::time::sleep(Duration::from_secs_f64(wait.clamp(0.0, 60.0))).await;
                continue;
            }

            return Ok(response);
        }
        Err(Error::Api {
            status: StatusCode::TOO_MANY_REQUESTS.as_u16(),
            message: "rate limited".into(),
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.send(Method::GET, path, |r| r).await?;
        Ok(check(response).await?.json().await?)
    }

    /// Fetch a guild's invites with use counters.
    pub async fn guild_invites(&self, guild: GuildId) -> Result<Vec<ApiInvite>> {
        self.get(&format!("/guilds/{}/invites", guild)).await
    }

    /// Fetch a guild member; `None` if they are not in the guild.
    pub async fn guild_member(&self, guild: GuildId, user: UserId) -> Result<Option<GuildMember>> {
        let response = self
            .send(Method::GET, &format!("/guilds/{}/members/{}", guild, user), |r| r)
            .await?;
        match check(response).await {
            Ok(response) => Ok(Some(response.json().await?)),
            Err(Error::Api { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Fetch a guild.
    pub async fn guild(&self, guild: GuildId) -> Result<Guild> {
        self.get(&format!("/guilds/{}", guild)).await
    }

    /// Fetch and cache a guild's roles.
    pub async fn refresh_roles(&self, guild: GuildId) -> Result<Vec<Role>> {
        let roles: Vec<Role> = self.get(&format!("/guilds/{}/roles", guild)).await?;
        self.roles.write().await.insert(guild, roles.clone());
        Ok(roles)
    }

    async fn role_names(&self, guild: GuildId, wanted: &[RoleId]) -> Result<HashMap<RoleId, String>> {
        let cached = self.roles.read().await.get(&guild).cloned();
        let roles = match cached {
            Some(roles) if wanted.iter().all(|id| roles.iter().any(|r| r.id == *id)) => roles,
            _ => self.refresh_roles(guild).await?,
        };
        Ok(roles.into_iter().map(|r| (r.id, r.name)).collect())
    }

    async fn role_id(&self, guild: GuildId, name: &str) -> Result<RoleId> {
        let cached = self
            .roles
            .read()
            .await
            .get(&guild)
            .and_then(|roles| roles.iter().find(|r| r.name == name).map(|r| r.id));
        if let Some(id) = cached {
            return Ok(id);
        }

        self.refresh_roles(guild)
            .await?
            .into_iter()
            .find(|r| r.name == name)
            .map(|r| r.id)
            .ok_or_else(|| Error::NotFound(format!("role '{}' in guild {}", name, guild)))
    }

    async fn member_role(&self, method: Method, guild: GuildId, user: UserId, role: &str) -> Result<()> {
        let role_id = self.role_id(guild, role).await?;
        let path = format!("/guilds/{}/members/{}/roles/{}", guild, user, role_id);
        let response = self
            .send(method, &path, |r| r.header(header::CONTENT_LENGTH, "0"))
            .await?;
        check(response).await?;
        Ok(())
    }

    /// Post a message to a channel.
    pub async fn create_message(&self, channel: ChannelId, content: &str) -> Result<()> {
        let body = CreateMessage {
            content,
            allowed_mentions: AllowedMentions::users(),
        };
        let path = format!("/channels/{}/messages", channel);
        let response = self.send(Method::POST, &path, |r| r.json(&body)).await?;
        check(response).await?;
        Ok(())
    }
}

/// Turn a non-success response into [`Error::Api`].
async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = match response.json::<ApiErrorBody>().await {
        Ok(body) if body.code == UNKNOWN_MEMBER => "Unknown Member".to_string(),
        Ok(body) => body.message,
        Err(_) => status.canonical_reason().unwrap_or("unknown error").to_string(),
    };
    Err(Error::Api {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl Platform for DiscordClient {
    async fn list_invites(&self, guild: GuildId) -> inviteward_ledger::Result<Vec<Invite>> {
        let invites = self.guild_invites(guild).await?;
        Ok(invites.into_iter().map(Invite::from).collect())
    }

    async fn resolve_member(&self, guild: GuildId, user: UserId) -> inviteward_ledger::Result<Option<Member>> {
        let Some(member) = self.guild_member(guild, user).await? else {
            return Ok(None);
        };
        let names = self.role_names(guild, &member.roles).await?;
        Ok(Some(member.to_member(&names)))
    }

    async fn grant_role(&self, guild: GuildId, user: UserId, role: &str) -> inviteward_ledger::Result<()> {
        Ok(self.member_role(Method::PUT, guild, user, role).await?)
    }

    async fn revoke_role(&self, guild: GuildId, user: UserId, role: &str) -> inviteward_ledger::Result<()> {
        Ok(self.member_role(Method::DELETE, guild, user, role).await?)
    }

    async fn send_message(&self, channel: ChannelId, text: &str) -> inviteward_ledger::Result<()> {
        Ok(self.create_message(channel, text).await?)
    }

    async fn default_channel(&self, guild: GuildId) -> inviteward_ledger::Result<Option<ChannelId>> {
        Ok(self.guild(guild).await?.system_channel_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_trailing_slash() {
        let client = DiscordClient::with_base_url("token", "http://localhost:9999/api/").unwrap();
        assert_eq!(client.url("/guilds/1"), "http://localhost:9999/api/guilds/1");
    }

    #[test]
    fn rejects_token_with_newline() {
        assert!(DiscordClient::new("bad\ntoken").is_err());
    }
}
