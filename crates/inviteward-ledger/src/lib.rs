//! Inviteward Ledger - invite attribution for community bots
//!
//! Works out which invite link a new member used by diffing invite use
//! counters before and after the join, credits the invite's creator in a
//! durable ledger, and grants or revokes a reward role as the creator's
//! total crosses a threshold.
//!
//! # Architecture
//!
//! - **Snapshot**: per-guild invite lists and the counter diff
//! - **Ledger**: inviter → credited members, with `total == |members|`
//! - **Store**: whole-ledger persistence with atomic file replacement
//! - **Engine**: [`InviteTracker`], the join/leave handlers
//! - **Report**: leaderboard and raw invite usage
//! - **Platform**: the chat platform capabilities the engine consumes
//!
//! # Example
//!
//! ```no_run
//! use inviteward_ledger::mock::MockPlatform;
//! use inviteward_ledger::{GuildId, InviteTracker, JsonFileStore, Member, TrackerConfig, UserId};
//!
//! # async fn run() -> inviteward_ledger::Result<()> {
//! let store = JsonFileStore::new("invite_data.json");
//! let mut tracker = InviteTracker::new(MockPlatform::new(), store, TrackerConfig::default())?;
//! tracker.on_ready(&[GuildId(1)]).await;
//! tracker.on_member_join(GuildId(1), &Member::new(UserId(42), "newcomer")).await;
//! # Ok(())
//! # }
//! ```

pub mod access;
pub mod engine;
pub mod error;
pub mod ids;
pub mod ledger;
pub mod mock;
pub mod platform;
pub mod report;
pub mod snapshot;
pub mod store;
pub mod threshold;

pub use access::AccessGate;
pub use engine::{InviteTracker, JoinOutcome, LeaveOutcome, TrackerConfig, Unattributed};
pub use error::{Error, Result};
pub use ids::{ChannelId, GuildId, RoleId, UserId};
pub use ledger::{Ledger, LedgerEntry};
pub use platform::{Member, Platform};
pub use report::{invite_usage, Leaderboard, LeaderboardRow};
pub use snapshot::{Attribution, Invite, InviteSnapshot, Inviter, SnapshotCache};
pub use store::{JsonFileStore, LedgerStore, MemoryStore};
pub use threshold::{RoleAction, MIN_INVITES};
