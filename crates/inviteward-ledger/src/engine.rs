//! Attribution engine.
//!
//! [`InviteTracker`] owns the snapshot cache and the ledger and reacts to
//! member joins and leaves. Handlers never fail: every collaborator error
//! is logged where it happens and the handler reports what it managed to
//! do through its outcome value.
//!
//! Handlers take `&mut self`, so whoever owns the tracker processes events
//! one at a time. That serialization is what keeps the snapshot diff and
//! the ledger read-modify-write free of races.

use crate::error::Result;
use crate::ids::{GuildId, UserId};
use crate::ledger::Ledger;
use crate::platform::{Member, Platform};
use crate::snapshot::{Attribution, InviteSnapshot, SnapshotCache};
use crate::store::LedgerStore;
use crate::threshold::{role_action, RoleAction, DEFAULT_REWARD_ROLE, MIN_INVITES};

/// Reward settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerConfig {
    /// Name of the role granted at the threshold
    pub reward_role: String,

    /// Credited members needed for the role
    pub min_invites: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            reward_role: DEFAULT_REWARD_ROLE.to_string(),
            min_invites: MIN_INVITES,
        }
    }
}

/// Why a join was not credited to anyone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unattributed {
    /// The invite list could not be fetched; the cache was left alone.
    InvitesUnavailable,
    /// No invite counter moved.
    NoIncrease,
    /// Several counters moved; the codes are listed.
    Ambiguous(Vec<String>),
    /// The invite has no inviter (vanity or widget invite).
    NoInviter { code: String },
    /// The inviter is no longer a member of the guild.
    InviterGone { code: String, inviter: UserId },
}

/// What happened on a member join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    Credited {
        inviter: UserId,
        code: String,
        total: u64,
        role_granted: bool,
    },
    /// The member was already credited to this inviter.
    AlreadyCredited { inviter: UserId },
    Unattributed(Unattributed),
}

/// What happened on a member leave.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaveOutcome {
    Released {
        inviter: UserId,
        total: u64,
        role_revoked: bool,
    },
    /// Nobody was credited with the member.
    Untracked,
}

/// Snapshot cache plus ledger, driven by platform events.
pub struct InviteTracker<P, S> {
    platform: P,
    store: S,
    config: TrackerConfig,
    cache: SnapshotCache,
    ledger: Ledger,
}

impl<P: Platform, S: LedgerStore> InviteTracker<P, S> {
    /// Create a tracker, loading the ledger from `store`.
    pub fn new(platform: P, store: S, config: TrackerConfig) -> Result<Self> {
        let ledger = store.load()?;
        tracing::info!(
            inviters = ledger.len(),
            members = ledger.grand_total(),
            "Loaded invite ledger"
        );
        Ok(Self {
            platform,
            store,
            config,
            cache: SnapshotCache::new(),
            ledger,
        })
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// In-memory ledger.
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Cached snapshot for a guild.
    pub fn snapshot(&self, guild: GuildId) -> InviteSnapshot {
        self.cache.get(guild)
    }

    /// Total credited to `user`.
    pub fn invites_of(&self, user: UserId) -> u64 {
        self.ledger.total_for(user)
    }

    /// Ledger as currently stored, falling back to memory if the store fails.
    pub fn stored_ledger(&self) -> Ledger {
        match self.store.load() {
            Ok(ledger) => ledger,
            Err(e) => {
                tracing::warn!("Failed to reload ledger, using in-memory copy: {}", e);
                self.ledger.clone()
            }
        }
    }

    /// Prime the cache for every guild the bot can see.
    pub async fn on_ready(&mut self, guilds: &[GuildId]) {
        for guild in guilds {
            self.refresh(*guild).await;
        }
        tracing::info!(guilds = guilds.len(), "Invite cache primed");
    }

    /// Re-read a guild's invites. Never touches the ledger.
    pub async fn refresh(&mut self, guild: GuildId) -> InviteSnapshot {
        self.cache.refresh(&self.platform, guild).await
    }

    /// Attribute a join to an inviter and apply the reward rules.
    pub async fn on_member_join(&mut self, guild: GuildId, joined: &Member) -> JoinOutcome {
        let new = match self.platform.list_invites(guild).await {
            Ok(invites) => InviteSnapshot::new(invites),
            Err(e) => {
                tracing::error!(guild = %guild, member = %joined.id, "Failed to fetch invites on join: {}", e);
                return JoinOutcome::Unattributed(Unattributed::InvitesUnavailable);
            }
        };

        let old = self.cache.replace(guild, new.clone());
        let invite = match new.diff(&old) {
            Attribution::Single(invite) => invite,
            Attribution::None => {
                tracing::info!(guild = %guild, member = %joined.id, "{} joined without a tracked invite", joined.name);
                return JoinOutcome::Unattributed(Unattributed::NoIncrease);
            }
            Attribution::Ambiguous(candidates) => {
                let codes: Vec<String> = candidates.into_iter().map(|i| i.code).collect();
                tracing::warn!(
                    guild = %guild,
                    member = %joined.id,
                    codes = ?codes,
                    "Several invites were used since the last refresh; not crediting anyone"
                );
                return JoinOutcome::Unattributed(Unattributed::Ambiguous(codes));
            }
        };

        let Some(inviter_id) = invite.inviter_id() else {
            tracing::info!(guild = %guild, code = %invite.code, "{} joined through an invite with no inviter", joined.name);
            return JoinOutcome::Unattributed(Unattributed::NoInviter { code: invite.code });
        };

        let inviter = match self.platform.resolve_member(guild, inviter_id).await {
            Ok(Some(member)) => member,
            Ok(None) => {
                tracing::info!(guild = %guild, inviter = %inviter_id, "Inviter of {} is no longer a member", invite.code);
                return JoinOutcome::Unattributed(Unattributed::InviterGone {
                    code: invite.code,
                    inviter: inviter_id,
                });
            }
            Err(e) => {
                tracing::warn!(guild = %guild, inviter = %inviter_id, "Failed to resolve inviter: {}", e);
                return JoinOutcome::Unattributed(Unattributed::InviterGone {
                    code: invite.code,
                    inviter: inviter_id,
                });
            }
        };

        let credit = self.ledger.credit(inviter.id, joined.id);
        if !credit.changed {
            tracing::debug!(guild = %guild, member = %joined.id, "Member already credited to {}", inviter.name);
            return JoinOutcome::AlreadyCredited { inviter: inviter.id };
        }
        self.persist();

        tracing::info!(
            guild = %guild,
            code = %invite.code,
            "{} invited {}! Total invites: {}",
            inviter.name,
            joined.name,
            credit.total
        );

        if let Some((previous, total)) = credit.moved_from {
            tracing::info!(guild = %guild, member = %joined.id, "Moved member away from {}", previous);
            self.check_revoke(guild, previous, total).await;
        }

        let role_granted = match role_action(
            credit.total,
            self.config.min_invites,
            inviter.has_role(&self.config.reward_role),
        ) {
            Some(RoleAction::Grant) => self.grant_reward(guild, &inviter).await,
            _ => false,
        };

        JoinOutcome::Credited {
            inviter: inviter.id,
            code: invite.code,
            total: credit.total,
            role_granted,
        }
    }

    /// Reverse the credit for a departing member.
    pub async fn on_member_remove(&mut self, guild: GuildId, left: &Member) -> LeaveOutcome {
        let Some(release) = self.ledger.release(left.id) else {
            tracing::debug!(guild = %guild, member = %left.id, "{} left; not tracked", left.name);
            return LeaveOutcome::Untracked;
        };
        self.persist();

        tracing::info!(
            guild = %guild,
            inviter = %release.inviter,
            "{} left or was kicked. Inviter's invite count: {}",
            left.name,
            release.total
        );

        let role_revoked = self.check_revoke(guild, release.inviter, release.total).await;

        LeaveOutcome::Released {
            inviter: release.inviter,
            total: release.total,
            role_revoked,
        }
    }

    /// Revoke the reward if `inviter` fell below the threshold.
    async fn check_revoke(&self, guild: GuildId, inviter: UserId, total: u64) -> bool {
        let member = match self.platform.resolve_member(guild, inviter).await {
            Ok(Some(member)) => member,
            Ok(None) => return false,
            Err(e) => {
                tracing::warn!(guild = %guild, inviter = %inviter, "Failed to resolve inviter: {}", e);
                return false;
            }
        };

        let has_role = member.has_role(&self.config.reward_role);
        if role_action(total, self.config.min_invites, has_role) != Some(RoleAction::Revoke) {
            return false;
        }

        match self
            .platform
            .revoke_role(guild, member.id, &self.config.reward_role)
            .await
        {
            Ok(()) => {
                tracing::info!(guild = %guild, "{} lost {} role", member.name, self.config.reward_role);
                true
            }
            Err(e) => {
                tracing::error!(guild = %guild, inviter = %inviter, "Failed to revoke reward role: {}", e);
                false
            }
        }
    }

    async fn grant_reward(&self, guild: GuildId, inviter: &Member) -> bool {
        let role = &self.config.reward_role;
        if let Err(e) = self.platform.grant_role(guild, inviter.id, role).await {
            tracing::error!(guild = %guild, inviter = %inviter.id, "Failed to grant reward role: {}", e);
            return false;
        }
        tracing::info!(guild = %guild, "{} awarded {} role", inviter.name, role);

        let text = format!("🎉 {} earned {}", inviter.mention(), role);
        match self.platform.default_channel(guild).await {
            Ok(Some(channel)) => {
                if let Err(e) = self.platform.send_message(channel, &text).await {
                    tracing::warn!(guild = %guild, "Failed to announce reward: {}", e);
                }
            }
            Ok(None) => {
                tracing::warn!(guild = %guild, "No system channel to announce reward in");
            }
            Err(e) => {
                tracing::warn!(guild = %guild, "Failed to look up system channel: {}", e);
            }
        }
        true
    }

    /// Write the whole ledger through the store.
    ///
    /// Runs inline on the dispatch task; `JsonFileStore` blocks on the
    /// write and fsync.
    fn persist(&self) -> bool {
        match self.store.save(&self.ledger) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Failed to save invite ledger: {}", e);
                false
            }
        }
    }
}
