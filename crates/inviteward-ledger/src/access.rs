//! Access gate for the reporting commands.

use crate::platform::Member;

/// Default role allowed to read invite reports.
pub const DEFAULT_ACCESS_ROLE: &str = "DF";

/// Member holds `role`, or is the override user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessGate {
    role: String,
    override_user: Option<String>,
}

impl AccessGate {
    pub fn new(role: impl Into<String>, override_user: Option<String>) -> Self {
        Self {
            role: role.into(),
            override_user: override_user.filter(|u| !u.is_empty()),
        }
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    /// Whether `member` may read the reports.
    pub fn permits(&self, member: &Member) -> bool {
        member.has_role(&self.role) || self.override_user.as_deref() == Some(member.name.as_str())
    }
}

impl Default for AccessGate {
    fn default() -> Self {
        Self::new(DEFAULT_ACCESS_ROLE, None)
    }
}
