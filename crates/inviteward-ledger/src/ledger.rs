//! The invite ledger: per-inviter totals and the members they brought in.

use crate::ids::UserId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Invite record for one inviter.
///
/// Invariant: `total == members.len()` after every mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Number of members currently credited to this inviter
    #[serde(default)]
    pub total: u64,

    /// Members credited to this inviter, in join order
    #[serde(default, rename = "users")]
    pub members: Vec<UserId>,
}

impl LedgerEntry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether this entry credits `member`.
    pub fn contains(&self, member: UserId) -> bool {
        self.members.contains(&member)
    }

    /// Whether the invariant holds.
    pub fn is_consistent(&self) -> bool {
        self.total == self.members.len() as u64
    }

    fn add(&mut self, member: UserId) -> bool {
        if self.contains(member) {
            return false;
        }
        self.members.push(member);
        self.total += 1;
        true
    }

    fn remove(&mut self, member: UserId) -> bool {
        match self.members.iter().position(|m| *m == member) {
            Some(idx) => {
                self.members.remove(idx);
                self.total = self.total.saturating_sub(1);
                true
            }
            None => false,
        }
    }
}

/// Result of crediting a join to an inviter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Credit {
    /// Inviter's total after the join
    pub total: u64,

    /// False if the member was already credited to this inviter
    pub changed: bool,

    /// Inviter the member was moved away from, with their new total
    pub moved_from: Option<(UserId, u64)>,
}

/// Result of releasing a departing member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Release {
    /// Inviter who lost the member
    pub inviter: UserId,

    /// Inviter's total after the leave
    pub total: u64,
}

/// Mapping from inviter to their ledger entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ledger {
    entries: BTreeMap<UserId, LedgerEntry>,
}

impl Ledger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Get an inviter's entry.
    pub fn get(&self, inviter: UserId) -> Option<&LedgerEntry> {
        self.entries.get(&inviter)
    }

    /// Inviter's total, zero if untracked.
    pub fn total_for(&self, inviter: UserId) -> u64 {
        self.entries.get(&inviter).map(|e| e.total).unwrap_or(0)
    }

    /// Credit `member` to `inviter`.
    ///
    /// A member is credited to at most one inviter. If another inviter
    /// already holds the member, the member is moved.
    pub fn credit(&mut self, inviter: UserId, member: UserId) -> Credit {
        let moved_from = match self.owner_of(member) {
            Some(owner) if owner == inviter => {
                return Credit {
                    total: self.total_for(inviter),
                    changed: false,
                    moved_from: None,
                };
            }
            Some(owner) => self
                .release(member)
                .map(|r| (owner, r.total)),
            None => None,
        };

        let entry = self.entries.entry(inviter).or_default();
        entry.add(member);

        Credit {
            total: entry.total,
            changed: true,
            moved_from,
        }
    }

    /// Remove a departing member from whichever inviter holds them.
    ///
    /// Linear scan over all entries; first match wins.
    pub fn release(&mut self, member: UserId) -> Option<Release> {
        let inviter = self.owner_of(member)?;
        let entry = self.entries.get_mut(&inviter)?;
        entry.remove(member);
        Some(Release {
            inviter,
            total: entry.total,
        })
    }

    /// Inviter currently credited with `member`.
    pub fn owner_of(&self, member: UserId) -> Option<UserId> {
        self.entries
            .iter()
            .find(|(_, entry)| entry.contains(member))
            .map(|(inviter, _)| *inviter)
    }

    /// True when at least one inviter has a non-zero total.
    pub fn has_data(&self) -> bool {
        self.entries.values().any(|e| e.total > 0)
    }

    /// Entries ordered by total, highest first. Ties keep id order.
    pub fn ranked(&self) -> Vec<(UserId, &LedgerEntry)> {
        let mut ranked: Vec<_> = self.entries.iter().map(|(id, e)| (*id, e)).collect();
        ranked.sort_by(|a, b| b.1.total.cmp(&a.1.total));
        ranked
    }

    /// Sum of all totals.
    pub fn grand_total(&self) -> u64 {
        self.entries.values().map(|e| e.total).sum()
    }

    /// Whether every entry satisfies `total == |members|`.
    pub fn is_consistent(&self) -> bool {
        self.entries.values().all(LedgerEntry::is_consistent)
    }

    /// Recompute totals from member lists, returning how many entries changed.
    ///
    /// Files written by older versions may list a member twice, under one
    /// inviter or several, or carry a total that drifted from the list.
    /// Each member stays with the first inviter in id order.
    pub fn repair(&mut self) -> usize {
        let mut seen = HashSet::new();
        let mut repaired = 0;
        for entry in self.entries.values_mut() {
            let before = entry.members.len();
            entry.members.retain(|m| seen.insert(*m));
            if entry.members.len() != before || !entry.is_consistent() {
                entry.total = entry.members.len() as u64;
                repaired += 1;
            }
        }
        repaired
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn credit_creates_entry() {
        let mut ledger = Ledger::new();
        let credit = ledger.credit(UserId(1), UserId(100));

        assert_eq!(credit.total, 1);
        assert!(credit.changed);
        assert_eq!(ledger.get(UserId(1)).unwrap().members, vec![UserId(100)]);
    }

    #[test]
    fn credit_same_member_twice_is_noop() {
        let mut ledger = Ledger::new();
        ledger.credit(UserId(1), UserId(100));
        let again = ledger.credit(UserId(1), UserId(100));

        assert!(!again.changed);
        assert_eq!(again.total, 1);
        assert!(ledger.is_consistent());
    }

    #[test]
    fn credit_moves_member_between_inviters() {
        let mut ledger = Ledger::new();
        ledger.credit(UserId(1), UserId(100));
        ledger.credit(UserId(1), UserId(101));

        let credit = ledger.credit(UserId(2), UserId(100));

        assert_eq!(credit.total, 1);
        assert_eq!(credit.moved_from, Some((UserId(1), 1)));
        assert_eq!(ledger.owner_of(UserId(100)), Some(UserId(2)));
        assert!(ledger.is_consistent());
    }

    #[test]
    fn release_unknown_member() {
        let mut ledger = Ledger::new();
        ledger.credit(UserId(1), UserId(100));
        let before = ledger.clone();

        assert!(ledger.release(UserId(999)).is_none());
        assert_eq!(ledger, before);
    }

    #[test]
    fn release_decrements() {
        let mut ledger = Ledger::new();
        ledger.credit(UserId(1), UserId(100));
        ledger.credit(UserId(1), UserId(101));

        let release = ledger.release(UserId(100)).unwrap();
        assert_eq!(release, Release { inviter: UserId(1), total: 1 });
        assert_eq!(ledger.get(UserId(1)).unwrap().members, vec![UserId(101)]);
    }

    #[test]
    fn ranked_orders_by_total() {
        let mut ledger = Ledger::new();
        for m in 0..5 {
            ledger.credit(UserId(1), UserId(100 + m));
        }
        for m in 0..12 {
            ledger.credit(UserId(2), UserId(200 + m));
        }

        let order: Vec<_> = ledger.ranked().iter().map(|(id, _)| *id).collect();
        assert_eq!(order, vec![UserId(2), UserId(1)]);
    }

    #[test]
    fn has_data_ignores_zero_totals() {
        let mut ledger = Ledger::new();
        assert!(!ledger.has_data());

        ledger.credit(UserId(1), UserId(100));
        ledger.release(UserId(100));
        assert_eq!(ledger.len(), 1);
        assert!(!ledger.has_data());
    }

    #[test]
    fn file_format_matches_legacy_layout() {
        let json = r#"{"42": {"total": 2, "users": ["7", "8"]}}"#;
        let ledger: Ledger = serde_json::from_str(json).unwrap();

        let entry = ledger.get(UserId(42)).unwrap();
        assert_eq!(entry.total, 2);
        assert_eq!(entry.members, vec![UserId(7), UserId(8)]);
    }

    #[test]
    fn repair_fixes_drift() {
        let json = r#"{"42": {"total": 5, "users": ["7", "7", "8"]}}"#;
        let mut ledger: Ledger = serde_json::from_str(json).unwrap();

        assert_eq!(ledger.repair(), 1);
        let entry = ledger.get(UserId(42)).unwrap();
        assert_eq!(entry.total, 2);
        assert_eq!(entry.members, vec![UserId(7), UserId(8)]);
    }

    #[test]
    fn repair_keeps_member_with_first_inviter() {
        let json = r#"{"1": {"users": ["7"]}, "2": {"users": ["7"]}}"#;
        let mut ledger: Ledger = serde_json::from_str(json).unwrap();

        assert_eq!(ledger.repair(), 2);
        assert_eq!(ledger.get(UserId(1)).unwrap().members, vec![UserId(7)]);
        assert_eq!(ledger.total_for(UserId(1)), 1);
        assert_eq!(ledger.total_for(UserId(2)), 0);
        assert!(ledger.get(UserId(2)).unwrap().members.is_empty());

        let release = ledger.release(UserId(7)).unwrap();
        assert_eq!(release.inviter, UserId(1));
        assert_eq!(ledger.owner_of(UserId(7)), None);
        assert_eq!(ledger.grand_total(), 0);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Join { inviter: u64, member: u64 },
        Leave { member: u64 },
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u64..5, 0u64..40).prop_map(|(inviter, member)| Op::Join { inviter, member }),
            (0u64..40).prop_map(|member| Op::Leave { member }),
        ]
    }

    proptest! {
        #[test]
        fn invariant_holds_for_any_sequence(ops in prop::collection::vec(op(), 0..200)) {
            let mut ledger = Ledger::new();
            for op in ops {
                match op {
                    Op::Join { inviter, member } => {
                        ledger.credit(UserId(inviter), UserId(1000 + member));
                    }
                    Op::Leave { member } => {
                        ledger.release(UserId(1000 + member));
                    }
                }
                prop_assert!(ledger.is_consistent());
            }
        }

        #[test]
        fn totals_sum_to_distinct_joins(joins in prop::collection::vec((0u64..5, 0u64..1000), 0..100)) {
            let mut ledger = Ledger::new();
            let mut changed = 0u64;
            for (inviter, member) in joins {
                let credit = ledger.credit(UserId(inviter), UserId(member));
                if credit.changed && credit.moved_from.is_none() {
                    changed += 1;
                }
            }
            prop_assert_eq!(ledger.grand_total(), changed);
        }
    }
}
