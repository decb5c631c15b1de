//! Reward threshold rules.
//!
//! An inviter holds the reward role exactly while their total is at or
//! above the threshold:
//! - total >= MIN_INVITES and role missing → grant
//! - total <  MIN_INVITES and role held    → revoke
//! - otherwise                             → nothing

/// Default number of credited members needed for the reward role.
pub const MIN_INVITES: u64 = 10;

/// Default name of the reward role.
pub const DEFAULT_REWARD_ROLE: &str = "VIP";

/// Role mutation required after a ledger change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleAction {
    Grant,
    Revoke,
}

/// Check if a total meets the threshold.
pub const fn meets_threshold(total: u64, min_invites: u64) -> bool {
    total >= min_invites
}

/// Decide whether the reward role must change.
///
/// # Examples
///
/// ```
/// use inviteward_ledger::threshold::{role_action, RoleAction};
///
/// assert_eq!(role_action(10, 10, false), Some(RoleAction::Grant));
/// assert_eq!(role_action(11, 10, true), None);
/// assert_eq!(role_action(9, 10, true), Some(RoleAction::Revoke));
/// ```
pub const fn role_action(total: u64, min_invites: u64, has_role: bool) -> Option<RoleAction> {
    match (meets_threshold(total, min_invites), has_role) {
        (true, false) => Some(RoleAction::Grant),
        (false, true) => Some(RoleAction::Revoke),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crossing_up_grants_once() {
        assert_eq!(role_action(9, MIN_INVITES, false), None);
        assert_eq!(role_action(10, MIN_INVITES, false), Some(RoleAction::Grant));
        // Once granted, further joins leave the role alone
        assert_eq!(role_action(11, MIN_INVITES, true), None);
    }

    #[test]
    fn crossing_down_revokes_once() {
        assert_eq!(role_action(10, MIN_INVITES, true), None);
        assert_eq!(role_action(9, MIN_INVITES, true), Some(RoleAction::Revoke));
        assert_eq!(role_action(8, MIN_INVITES, false), None);
    }

    #[test]
    fn zero_threshold_always_meets() {
        assert!(meets_threshold(0, 0));
        assert_eq!(role_action(0, 0, false), Some(RoleAction::Grant));
    }
}
