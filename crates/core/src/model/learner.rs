use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::ids::LearnerId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RoleError {
    #[error("unknown role: {0}")]
    Unknown(String),

    #[error("learner handle is empty")]
    EmptyHandle,
}

//
// ─── ROLE ──────────────────────────────────────────────────────────────────────
//

/// Capability level of a learner. Ordering is `Member < Admin < Superadmin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Member,
    Admin,
    Superadmin,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Member => "member",
            Role::Admin => "admin",
            Role::Superadmin => "superadmin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Role {
    type Err = RoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "member" | "user" => Ok(Role::Member),
            "admin" => Ok(Role::Admin),
            "superadmin" => Ok(Role::Superadmin),
            other => Err(RoleError::Unknown(other.to_owned())),
        }
    }
}

//
// ─── LEARNER ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Learner {
    id: LearnerId,
    handle: String,
    role: Role,
    created_at: DateTime<Utc>,
}

impl Learner {
    /// # Errors
    ///
    /// Returns `RoleError::EmptyHandle` if the handle is blank after trimming.
    pub fn new(
        id: LearnerId,
        handle: impl Into<String>,
        role: Role,
        created_at: DateTime<Utc>,
    ) -> Result<Self, RoleError> {
        let handle = handle.into().trim().to_owned();
        if handle.is_empty() {
            return Err(RoleError::EmptyHandle);
        }
        Ok(Self {
            id,
            handle,
            role,
            created_at,
        })
    }

    #[must_use]
    pub fn id(&self) -> LearnerId {
        self.id
    }

    #[must_use]
    pub fn handle(&self) -> &str {
        &self.handle
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// True when `learner` holds at least the `required` role.
#[must_use]
pub fn has_role(learner: &Learner, required: Role) -> bool {
    learner.role >= required
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn learner(role: Role) -> Learner {
        Learner::new(LearnerId::new(1), "alice", role, fixed_now()).unwrap()
    }

    #[test]
    fn role_ordering_is_member_admin_superadmin() {
        assert!(Role::Member < Role::Admin);
        assert!(Role::Admin < Role::Superadmin);
    }

    #[test]
    fn has_role_respects_hierarchy() {
        assert!(has_role(&learner(Role::Superadmin), Role::Admin));
        assert!(has_role(&learner(Role::Admin), Role::Admin));
        assert!(!has_role(&learner(Role::Member), Role::Admin));
        assert!(!has_role(&learner(Role::Admin), Role::Superadmin));
        assert!(has_role(&learner(Role::Member), Role::Member));
    }

    #[test]
    fn role_parses_legacy_user_spelling() {
        assert_eq!("user".parse::<Role>().unwrap(), Role::Member);
        assert_eq!("Admin".parse::<Role>().unwrap(), Role::Admin);
        assert!(matches!("root".parse::<Role>(), Err(RoleError::Unknown(_))));
    }

    #[test]
    fn blank_handle_is_rejected() {
        let err = Learner::new(LearnerId::new(2), "  ", Role::Member, fixed_now()).unwrap_err();
        assert_eq!(err, RoleError::EmptyHandle);
    }
}
