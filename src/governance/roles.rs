/// Role catalog and ordinal rank comparisons
///
/// The platform uses a fixed, small role hierarchy. Every authorization
/// question reduces to comparing integer ranks, so the catalog is the single
/// source of truth for how much authority a role carries. Editors and
/// moderators share a tier: editors author content, moderators review
/// comments, and neither outranks the other.
use crate::error::{PlatformError, PlatformResult};
use serde::{Deserialize, Serialize};

/// Rank evaluated for requests with no authenticated actor
pub const ANONYMOUS_RANK: u8 = 0;

/// Roles a user can hold, ordered by authority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Can read published content and comment
    User,
    /// Can author posts and manage their own drafts
    Editor,
    /// Can moderate comments
    Moderator,
    /// Can approve, reject and archive any content
    Admin,
    /// Full access, the only rank that may alter roles
    SuperAdmin,
}

impl Role {
    /// Ordinal rank used for "at least as privileged as" comparisons.
    /// Editor and Moderator deliberately share a tier.
    pub const fn rank(&self) -> u8 {
        match self {
            Role::User => 1,
            Role::Editor => 2,
            Role::Moderator => 2,
            Role::Admin => 3,
            Role::SuperAdmin => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Editor => "editor",
            Role::Moderator => "moderator",
            Role::Admin => "admin",
            Role::SuperAdmin => "super_admin",
        }
    }

    pub fn from_str(s: &str) -> PlatformResult<Self> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Role::User),
            "editor" => Ok(Role::Editor),
            "moderator" => Ok(Role::Moderator),
            "admin" => Ok(Role::Admin),
            "super_admin" => Ok(Role::SuperAdmin),
            _ => Err(PlatformError::Validation(format!("Invalid role: {}", s))),
        }
    }

    /// Returns all roles as a slice, lowest rank first
    pub const fn all() -> &'static [Self] {
        &[
            Role::User,
            Role::Editor,
            Role::Moderator,
            Role::Admin,
            Role::SuperAdmin,
        ]
    }

    /// Check if this role can perform actions requiring another role
    pub fn can_act_as(&self, required: Role) -> bool {
        self.rank() >= required.rank()
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_hierarchy() {
        assert!(Role::SuperAdmin.rank() > Role::Admin.rank());
        assert!(Role::Admin.rank() > Role::Editor.rank());
        assert!(Role::Editor.rank() > Role::User.rank());
        assert!(Role::User.rank() > ANONYMOUS_RANK);

        assert!(Role::SuperAdmin.can_act_as(Role::Admin));
        assert!(Role::Admin.can_act_as(Role::Moderator));
        assert!(!Role::Moderator.can_act_as(Role::Admin));
        assert!(!Role::Admin.can_act_as(Role::SuperAdmin));
    }

    #[test]
    fn test_editor_and_moderator_share_a_tier() {
        assert_eq!(Role::Editor.rank(), Role::Moderator.rank());
        assert!(Role::Editor.can_act_as(Role::Moderator));
        assert!(Role::Moderator.can_act_as(Role::Editor));
        assert_ne!(Role::Editor, Role::Moderator);
    }

    #[test]
    fn test_ranks_increase_through_catalog() {
        let ranks: Vec<u8> = Role::all().iter().map(|r| r.rank()).collect();
        for pair in ranks.windows(2) {
            assert!(pair[0] <= pair[1], "catalog must be ordered by rank");
        }
    }

    #[test]
    fn test_role_from_str() {
        assert_eq!(Role::from_str("user").unwrap(), Role::User);
        assert_eq!(Role::from_str("editor").unwrap(), Role::Editor);
        assert_eq!(Role::from_str("super_admin").unwrap(), Role::SuperAdmin);
        assert_eq!(Role::from_str("ADMIN").unwrap(), Role::Admin);

        assert!(Role::from_str("root").is_err());
    }

    #[test]
    fn test_round_trip_through_str() {
        for role in Role::all() {
            assert_eq!(Role::from_str(role.as_str()).unwrap(), *role);
        }
    }

    #[test]
    fn test_serde_matches_as_str() {
        for role in Role::all() {
            let json = serde_json::to_string(role).unwrap();
            assert_eq!(json, format!("\"{}\"", role.as_str()));
        }
    }
}
