//! Read-only reports over the ledger and the snapshot cache.

use crate::ids::{GuildId, UserId};
use crate::ledger::Ledger;
use crate::platform::Platform;
use crate::snapshot::InviteSnapshot;

/// One leaderboard line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderboardRow {
    pub rank: usize,
    pub inviter: UserId,
    pub name: String,
    pub total: u64,
}

/// Inviters ranked by total.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Leaderboard {
    /// No inviter has a non-zero total.
    NoData,
    Ranked(Vec<LeaderboardRow>),
}

impl Leaderboard {
    /// Rank the ledger, resolving names through the platform.
    ///
    /// Inviters that no longer resolve are shown as `User-<id>`.
    pub async fn build<P: Platform + ?Sized>(ledger: &Ledger, platform: &P, guild: GuildId) -> Self {
        if !ledger.has_data() {
            return Self::NoData;
        }

        let mut rows = Vec::with_capacity(ledger.len());
        for (idx, (inviter, entry)) in ledger.ranked().into_iter().enumerate() {
            let name = match platform.resolve_member(guild, inviter).await {
                Ok(Some(member)) => member.display().to_string(),
                Ok(None) => placeholder_name(inviter),
                Err(e) => {
                    tracing::debug!(inviter = %inviter, "Name lookup failed: {}", e);
                    placeholder_name(inviter)
                }
            };
            rows.push(LeaderboardRow {
                rank: idx + 1,
                inviter,
                name,
                total: entry.total,
            });
        }
        Self::Ranked(rows)
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::NoData)
    }

    /// Chat-formatted leaderboard.
    pub fn render(&self) -> String {
        match self {
            Self::NoData => "❌ No invite data available.".to_string(),
            Self::Ranked(rows) => {
                let mut out = String::from("**📊 Invite Leaderboard**\n");
                for row in rows {
                    out.push_str(&format!("**{}. {} - {} invites**\n", row.rank, row.name, row.total));
                }
                out
            }
        }
    }
}

/// Name used for inviters who can no longer be resolved.
pub fn placeholder_name(user: UserId) -> String {
    format!("User-{}", user)
}

/// Raw dump of a guild's cached invite counters, or `None` if empty.
pub fn invite_usage(snapshot: &InviteSnapshot) -> Option<String> {
    if snapshot.is_empty() {
        return None;
    }

    let lines: Vec<String> = snapshot
        .invites()
        .iter()
        .map(|invite| {
            let inviter = invite
                .inviter
                .as_ref()
                .map(|i| i.name.as_str())
                .unwrap_or("unknown");
            format!(
                "📩 Invite Code: `{}`, Inviter: **{}**, Uses: `{}`",
                invite.code, inviter, invite.uses
            )
        })
        .collect();
    Some(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockPlatform;
    use crate::platform::Member;
    use crate::snapshot::{Invite, Inviter};

    const GUILD: GuildId = GuildId(1);

    #[tokio::test]
    async fn empty_ledger_has_no_data() {
        let platform = MockPlatform::new();
        let board = Leaderboard::build(&Ledger::new(), &platform, GUILD).await;
        assert_eq!(board, Leaderboard::NoData);
        assert_eq!(board.render(), "❌ No invite data available.");
    }

    #[tokio::test]
    async fn orders_and_resolves_names() {
        let platform = MockPlatform::new();
        platform.add_member(GUILD, Member::new(UserId(1), "alice"));

        let mut ledger = Ledger::new();
        for m in 0..5 {
            ledger.credit(UserId(1), UserId(100 + m));
        }
        for m in 0..12 {
            ledger.credit(UserId(2), UserId(200 + m));
        }

        let board = Leaderboard::build(&ledger, &platform, GUILD).await;
        let Leaderboard::Ranked(rows) = &board else {
            panic!("expected ranked leaderboard");
        };
        assert_eq!(rows[0].name, "User-2");
        assert_eq!(rows[0].total, 12);
        assert_eq!(rows[1].name, "alice");

        assert_eq!(
            board.render(),
            "**📊 Invite Leaderboard**\n**1. User-2 - 12 invites**\n**2. alice - 5 invites**\n"
        );
    }

    #[test]
    fn usage_dump() {
        assert!(invite_usage(&InviteSnapshot::default()).is_none());

        let snapshot = InviteSnapshot::new(vec![
            Invite::new(
                "abc",
                Some(Inviter {
                    id: UserId(1),
                    name: "alice".into(),
                }),
                3,
            ),
            Invite::new("vanity", None, 9),
        ]);
        let text = invite_usage(&snapshot).unwrap();
        assert_eq!(
            text,
            "📩 Invite Code: `abc`, Inviter: **alice**, Uses: `3`\n\
             📩 Invite Code: `vanity`, Inviter: **unknown**, Uses: `9`"
        );
    }
}
