//! Invite snapshots and the per-guild snapshot cache.
//!
//! A snapshot is the list of invite links a guild had the last time we
//! asked, with their use counters. Attribution works by comparing the
//! snapshot taken before a join with the one taken after it.

use crate::ids::{GuildId, UserId};
use crate::platform::Platform;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The member who created an invite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inviter {
    pub id: UserId,
    pub name: String,
}

/// A single invite link and its use counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invite {
    /// Invite code (the part after `discord.gg/`)
    pub code: String,

    /// Creator of the invite. Vanity and widget invites have none.
    pub inviter: Option<Inviter>,

    /// How many times the invite has been used
    pub uses: u64,
}

impl Invite {
    /// Create an invite owned by `inviter`.
    pub fn new(code: impl Into<String>, inviter: Option<Inviter>, uses: u64) -> Self {
        Self {
            code: code.into(),
            inviter,
            uses,
        }
    }

    /// Id of the inviter, if any.
    pub fn inviter_id(&self) -> Option<UserId> {
        self.inviter.as_ref().map(|i| i.id)
    }
}

/// Ordered list of a guild's invites at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteSnapshot {
    invites: Vec<Invite>,
}

impl InviteSnapshot {
    /// Build a snapshot from a platform query result.
    pub fn new(invites: Vec<Invite>) -> Self {
        Self { invites }
    }

    /// All invites in platform order.
    pub fn invites(&self) -> &[Invite] {
        &self.invites
    }

    /// Find an invite by code.
    pub fn get(&self, code: &str) -> Option<&Invite> {
        self.invites.iter().find(|i| i.code == code)
    }

    pub fn len(&self) -> usize {
        self.invites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.invites.is_empty()
    }

    /// Compare against an older snapshot and report which invite was used.
    ///
    /// Only codes present in both snapshots are compared. Invites created
    /// after `older` was taken are ignored, so an invite created and used
    /// between two refreshes cannot be attributed.
    ///
    /// Several increased counters are only ambiguous when they belong to
    /// different inviters; if one inviter owns them all, the first is
    /// reported.
    pub fn diff(&self, older: &InviteSnapshot) -> Attribution {
        let mut increased: Vec<Invite> = self
            .invites
            .iter()
            .filter(|new| {
                older
                    .get(&new.code)
                    .is_some_and(|old| new.uses > old.uses)
            })
            .cloned()
            .collect();

        let shared_inviter = increased
            .first()
            .and_then(Invite::inviter_id)
            .filter(|first| increased.iter().all(|i| i.inviter_id() == Some(*first)));

        match increased.len() {
            0 => Attribution::None,
            1 => Attribution::Single(increased.remove(0)),
            _ if shared_inviter.is_some() => Attribution::Single(increased.remove(0)),
            _ => Attribution::Ambiguous(increased),
        }
    }
}

impl From<Vec<Invite>> for InviteSnapshot {
    fn from(invites: Vec<Invite>) -> Self {
        Self::new(invites)
    }
}

/// Outcome of diffing two snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attribution {
    /// No counter moved (vanity invite, expired one-shot invite, ...).
    None,
    /// Exactly one invite's counter increased.
    Single(Invite),
    /// Counters of different inviters increased between refreshes; joins raced.
    Ambiguous(Vec<Invite>),
}

/// Latest known snapshot per guild.
#[derive(Debug, Default)]
pub struct SnapshotCache {
    snapshots: HashMap<GuildId, InviteSnapshot>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self {
            snapshots: HashMap::new(),
        }
    }

    /// Cached snapshot for a guild; empty if never refreshed.
    pub fn get(&self, guild: GuildId) -> InviteSnapshot {
        self.snapshots.get(&guild).cloned().unwrap_or_default()
    }

    /// Replace a guild's snapshot wholesale, returning the previous one.
    pub fn replace(&mut self, guild: GuildId, snapshot: InviteSnapshot) -> InviteSnapshot {
        self.snapshots.insert(guild, snapshot).unwrap_or_default()
    }

    /// Query the platform and replace the cached snapshot.
    ///
    /// On failure the previous snapshot stays in place and is returned.
    pub async fn refresh<P: Platform + ?Sized>(
        &mut self,
        platform: &P,
        guild: GuildId,
    ) -> InviteSnapshot {
        match platform.list_invites(guild).await {
            Ok(invites) => {
                let snapshot = InviteSnapshot::new(invites);
                tracing::debug!(guild = %guild, invites = snapshot.len(), "Cached invites");
                self.replace(guild, snapshot.clone());
                snapshot
            }
            Err(e) => {
                tracing::error!(guild = %guild, "Invite caching error: {}", e);
                self.get(guild)
            }
        }
    }
}
