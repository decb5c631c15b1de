//! End-to-end join/leave scenarios against the mock platform.

use inviteward_ledger::mock::{Call, MockPlatform};
use inviteward_ledger::{
    ChannelId, GuildId, InviteTracker, JoinOutcome, JsonFileStore, Leaderboard, LeaveOutcome,
    LedgerStore, Member, MemoryStore, TrackerConfig, Unattributed, UserId,
};
use std::sync::Arc;

const GUILD: GuildId = GuildId(500);
const SYSTEM: ChannelId = ChannelId(501);
const ALICE: UserId = UserId(1);
const BOB: UserId = UserId(2);

type Tracker = InviteTracker<Arc<MockPlatform>, Arc<MemoryStore>>;

async fn tracker() -> (Tracker, Arc<MockPlatform>, Arc<MemoryStore>) {
    let platform = Arc::new(MockPlatform::new());
    platform.add_guild(GUILD, Some(SYSTEM), &["VIP", "DF"]);
    platform.add_member(GUILD, Member::new(ALICE, "alice"));
    platform.add_member(GUILD, Member::new(BOB, "bob"));
    platform.add_invite(GUILD, "abc123", Some(ALICE));
    platform.add_invite(GUILD, "bob-link", Some(BOB));
    platform.add_invite(GUILD, "vanity", None);

    let store = Arc::new(MemoryStore::new());
    let mut tracker = InviteTracker::new(
        Arc::clone(&platform),
        Arc::clone(&store),
        TrackerConfig::default(),
    )
    .unwrap();
    tracker.on_ready(&[GUILD]).await;
    (tracker, platform, store)
}

fn newcomer(id: u64) -> Member {
    Member::new(UserId(id), format!("newcomer{}", id))
}

async fn join_via(tracker: &mut Tracker, platform: &MockPlatform, code: &str, id: u64) -> JoinOutcome {
    let member = newcomer(id);
    platform.add_member(GUILD, member.clone());
    platform.use_invite(GUILD, code);
    tracker.on_member_join(GUILD, &member).await
}

async fn leave(tracker: &mut Tracker, platform: &MockPlatform, id: u64) -> LeaveOutcome {
    platform.remove_member(GUILD, UserId(id));
    tracker.on_member_remove(GUILD, &newcomer(id)).await
}

#[tokio::test]
async fn used_invite_credits_its_inviter() {
    let (mut tracker, platform, store) = tracker().await;
    for _ in 0..3 {
        platform.use_invite(GUILD, "abc123");
    }
    tracker.refresh(GUILD).await;

    let outcome = join_via(&mut tracker, &platform, "abc123", 100).await;

    assert!(matches!(outcome, JoinOutcome::Credited { inviter: ALICE, total: 1, .. }));
    let entry = tracker.ledger().get(ALICE).cloned().unwrap();
    assert_eq!(entry.members, vec![UserId(100)]);
    assert_eq!(store.stored().get(ALICE), Some(&entry));
    assert_eq!(tracker.ledger().total_for(BOB), 0);
}

#[tokio::test]
async fn totals_match_attributed_joins() {
    let (mut tracker, platform, _) = tracker().await;

    let mut attributed = 0;
    for (i, code) in ["abc123", "bob-link", "vanity", "abc123", "abc123", "vanity"]
        .iter()
        .enumerate()
    {
        if let JoinOutcome::Credited { .. } = join_via(&mut tracker, &platform, code, 100 + i as u64).await {
            attributed += 1;
        }
    }

    assert_eq!(attributed, 4);
    assert_eq!(tracker.ledger().grand_total(), 4);
    assert!(tracker.ledger().is_consistent());
}

#[tokio::test]
async fn vanity_join_only_refreshes_cache() {
    let (mut tracker, platform, store) = tracker().await;

    let outcome = join_via(&mut tracker, &platform, "vanity", 100).await;

    assert_eq!(
        outcome,
        JoinOutcome::Unattributed(Unattributed::NoInviter {
            code: "vanity".into()
        })
    );
    assert_eq!(tracker.snapshot(GUILD).get("vanity").unwrap().uses, 1);
    assert_eq!(store.save_count(), 0);
}

#[tokio::test]
async fn repeated_refresh_does_not_touch_ledger() {
    let (mut tracker, _platform, store) = tracker().await;
    let before = tracker.ledger().clone();

    let first = tracker.refresh(GUILD).await;
    let second = tracker.refresh(GUILD).await;

    assert_eq!(first, second);
    assert_eq!(tracker.ledger(), &before);
    assert_eq!(store.save_count(), 0);
}

#[tokio::test]
async fn racing_joins_are_not_guessed() {
    let (mut tracker, platform, _) = tracker().await;
    platform.use_invite(GUILD, "bob-link");

    let outcome = join_via(&mut tracker, &platform, "abc123", 100).await;

    assert_eq!(
        outcome,
        JoinOutcome::Unattributed(Unattributed::Ambiguous(vec![
            "abc123".to_string(),
            "bob-link".to_string()
        ]))
    );
    assert!(tracker.ledger().is_empty());

    // The next join diffs against the fresh snapshot and is attributed again
    let outcome = join_via(&mut tracker, &platform, "bob-link", 101).await;
    assert!(matches!(outcome, JoinOutcome::Credited { inviter: BOB, total: 1, .. }));
}

#[tokio::test]
async fn invite_created_between_refreshes_is_picked_up() {
    let (mut tracker, platform, _) = tracker().await;
    platform.add_invite(GUILD, "fresh", Some(BOB));

    tracker.refresh(GUILD).await;
    let outcome = join_via(&mut tracker, &platform, "fresh", 100).await;

    assert!(matches!(outcome, JoinOutcome::Credited { inviter: BOB, .. }));
}

#[tokio::test]
async fn reaching_threshold_grants_once() {
    let (mut tracker, platform, _) = tracker().await;

    for id in 0..9 {
        join_via(&mut tracker, &platform, "abc123", 100 + id).await;
    }
    assert!(platform.grants().is_empty());

    let outcome = join_via(&mut tracker, &platform, "abc123", 109).await;
    assert!(matches!(outcome, JoinOutcome::Credited { total: 10, role_granted: true, .. }));

    let outcome = join_via(&mut tracker, &platform, "abc123", 110).await;
    assert!(matches!(outcome, JoinOutcome::Credited { total: 11, role_granted: false, .. }));

    assert_eq!(
        platform.grants(),
        vec![Call::Grant {
            guild: GUILD,
            user: ALICE,
            role: "VIP".into()
        }]
    );
    assert_eq!(platform.messages(), vec!["🎉 <@1> earned VIP".to_string()]);
    assert!(platform.member(GUILD, ALICE).unwrap().has_role("VIP"));
}

#[tokio::test]
async fn dropping_below_threshold_revokes_once() {
    let (mut tracker, platform, _) = tracker().await;
    for id in 0..10 {
        join_via(&mut tracker, &platform, "abc123", 100 + id).await;
    }
    assert!(platform.member(GUILD, ALICE).unwrap().has_role("VIP"));

    let outcome = leave(&mut tracker, &platform, 100).await;
    assert_eq!(
        outcome,
        LeaveOutcome::Released {
            inviter: ALICE,
            total: 9,
            role_revoked: true
        }
    );

    let outcome = leave(&mut tracker, &platform, 101).await;
    assert_eq!(
        outcome,
        LeaveOutcome::Released {
            inviter: ALICE,
            total: 8,
            role_revoked: false
        }
    );

    assert_eq!(platform.revokes().len(), 1);
    assert!(!platform.member(GUILD, ALICE).unwrap().has_role("VIP"));
}

#[tokio::test]
async fn rejoin_through_other_invite_moves_credit_and_revokes() {
    let (mut tracker, platform, store) = tracker().await;
    for id in 0..10 {
        join_via(&mut tracker, &platform, "abc123", 100 + id).await;
    }
    assert!(platform.member(GUILD, ALICE).unwrap().has_role("VIP"));

    // Member 100 comes back through Bob's link; the leave was never seen
    let outcome = join_via(&mut tracker, &platform, "bob-link", 100).await;

    assert!(matches!(outcome, JoinOutcome::Credited { inviter: BOB, total: 1, .. }));
    assert_eq!(tracker.invites_of(ALICE), 9);
    assert_eq!(tracker.invites_of(BOB), 1);
    assert_eq!(tracker.ledger().owner_of(UserId(100)), Some(BOB));
    assert!(tracker.ledger().is_consistent());
    assert_eq!(store.stored(), *tracker.ledger());

    assert_eq!(
        platform.revokes(),
        vec![Call::Revoke {
            guild: GUILD,
            user: ALICE,
            role: "VIP".into()
        }]
    );
    assert!(!platform.member(GUILD, ALICE).unwrap().has_role("VIP"));
}

#[tokio::test]
async fn several_links_of_one_inviter_still_credit() {
    let (mut tracker, platform, _) = tracker().await;
    platform.add_invite(GUILD, "abc-second", Some(ALICE));
    tracker.refresh(GUILD).await;
    platform.use_invite(GUILD, "abc-second");

    let outcome = join_via(&mut tracker, &platform, "abc123", 100).await;

    assert!(matches!(outcome, JoinOutcome::Credited { inviter: ALICE, total: 1, .. }));
}

#[tokio::test]
async fn untracked_leave_changes_nothing() {
    let (mut tracker, platform, store) = tracker().await;
    join_via(&mut tracker, &platform, "abc123", 100).await;
    let before = tracker.ledger().clone();
    let saves = store.save_count();

    let outcome = leave(&mut tracker, &platform, 999).await;

    assert_eq!(outcome, LeaveOutcome::Untracked);
    assert_eq!(tracker.ledger(), &before);
    assert_eq!(store.save_count(), saves);
    assert!(platform.revokes().is_empty());
}

#[tokio::test]
async fn invariant_holds_through_mixed_events() {
    let (mut tracker, platform, _) = tracker().await;
    let codes = ["abc123", "bob-link", "vanity"];

    for id in 0..30u64 {
        join_via(&mut tracker, &platform, codes[(id % 3) as usize], 100 + id).await;
        if id % 4 == 0 {
            leave(&mut tracker, &platform, 100 + id / 2).await;
        }
        assert!(tracker.ledger().is_consistent());
    }
}

#[tokio::test]
async fn leaderboard_orders_by_total() {
    let (mut tracker, platform, _) = tracker().await;
    for id in 0..5 {
        join_via(&mut tracker, &platform, "abc123", 100 + id).await;
    }
    for id in 0..12 {
        join_via(&mut tracker, &platform, "bob-link", 200 + id).await;
    }

    let board = Leaderboard::build(&tracker.stored_ledger(), platform.as_ref(), GUILD).await;
    let Leaderboard::Ranked(rows) = board else {
        panic!("expected ranked leaderboard");
    };
    let names: Vec<_> = rows.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["bob", "alice"]);
}

#[tokio::test]
async fn ledger_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("invite_data.json");
    let platform = Arc::new(MockPlatform::new());
    platform.add_guild(GUILD, Some(SYSTEM), &["VIP"]);
    platform.add_member(GUILD, Member::new(ALICE, "alice"));
    platform.add_invite(GUILD, "abc123", Some(ALICE));

    {
        let mut tracker = InviteTracker::new(
            Arc::clone(&platform),
            JsonFileStore::new(&path),
            TrackerConfig::default(),
        )
        .unwrap();
        tracker.on_ready(&[GUILD]).await;
        let member = newcomer(100);
        platform.add_member(GUILD, member.clone());
        platform.use_invite(GUILD, "abc123");
        tracker.on_member_join(GUILD, &member).await;
    }

    let store = JsonFileStore::new(&path);
    let tracker =
        InviteTracker::new(Arc::clone(&platform), store.clone(), TrackerConfig::default()).unwrap();
    assert_eq!(tracker.invites_of(ALICE), 1);

    let loaded = store.load().unwrap();
    store.save(&loaded).unwrap();
    assert_eq!(store.load().unwrap(), loaded);
}
