/// Permission evaluation
///
/// `evaluate` is a pure, total function from (actor, capability, resource
/// context) to a grant/deny decision. It performs no I/O and never records
/// anything; callers are responsible for reporting every decision to the
/// audit log. Keeping the evaluator side-effect-free is what makes the
/// authorization rules independently testable.
use crate::db::models::Actor;
use crate::governance::lifecycle::PostStatus;
use crate::governance::roles::{Role, ANONYMOUS_RANK};
use serde::{Deserialize, Serialize};

/// A named permission required to perform an action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Author a new post
    CreatePost,
    /// Edit a post
    EditPost,
    /// Delete a post
    DeletePost,
    /// Move a post to published (approve)
    PublishPost,
    /// Reject or archive posts under moderation
    ModeratePosts,
    /// Approve, reject or mark comments as spam
    ModerateComments,
    /// Leave a comment as an authenticated user
    Comment,
    /// Change another user's role
    ManageRoles,
    /// Deactivate user accounts
    ManageUsers,
    /// Read the audit trail
    ViewAuditLog,
}

impl Capability {
    /// Returns the action name for audit logging
    pub const fn action_name(&self) -> &'static str {
        match self {
            Capability::CreatePost => "create_post",
            Capability::EditPost => "edit_post",
            Capability::DeletePost => "delete_post",
            Capability::PublishPost => "publish_post",
            Capability::ModeratePosts => "moderate_posts",
            Capability::ModerateComments => "moderate_comments",
            Capability::Comment => "comment",
            Capability::ManageRoles => "manage_roles",
            Capability::ManageUsers => "manage_users",
            Capability::ViewAuditLog => "view_audit_log",
        }
    }

    /// Minimum rank required when the actor does not own the resource
    pub const fn required_rank(&self) -> u8 {
        match self {
            Capability::CreatePost => Role::Editor.rank(),
            Capability::EditPost => Role::Admin.rank(),
            Capability::DeletePost => Role::Admin.rank(),
            Capability::PublishPost => Role::Admin.rank(),
            Capability::ModeratePosts => Role::Admin.rank(),
            Capability::ModerateComments => Role::Moderator.rank(),
            Capability::Comment => Role::User.rank(),
            Capability::ManageRoles => Role::SuperAdmin.rank(),
            Capability::ManageUsers => Role::Admin.rank(),
            Capability::ViewAuditLog => Role::Admin.rank(),
        }
    }

    /// Rank required when the actor owns the resource. Publishing never has
    /// an owner tier: authors cannot push their own work live.
    pub const fn owner_rank(&self) -> Option<u8> {
        match self {
            Capability::EditPost | Capability::DeletePost => Some(Role::User.rank()),
            _ => None,
        }
    }

    /// Capabilities whose target being the actor themself is categorically
    /// rejected (role mutation, account deletion)
    pub const fn forbids_self(&self) -> bool {
        matches!(self, Capability::ManageRoles | Capability::ManageUsers)
    }
}

/// Outcome of a permission evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub granted: bool,
    pub reason: &'static str,
}

impl Decision {
    fn grant(reason: &'static str) -> Self {
        Self {
            granted: true,
            reason,
        }
    }

    fn deny(reason: &'static str) -> Self {
        Self {
            granted: false,
            reason,
        }
    }
}

pub const REASON_GRANTED: &str = "granted";
pub const REASON_OWNER: &str = "owner";
pub const REASON_NOT_OWNER: &str = "not_owner";
pub const REASON_INSUFFICIENT_ROLE: &str = "insufficient_role";
pub const REASON_SELF_ACTION: &str = "self_action_forbidden";
pub const REASON_PUBLISHED_LOCK: &str = "published_content_locked";
pub const REASON_INACTIVE: &str = "account_inactive";

/// Evaluate whether `actor` may exercise `capability` against a resource.
///
/// `resource_owner` is the owning user id when the resource has one;
/// `resource_status` is the post's current lifecycle status when the
/// resource is a post. A missing actor is an anonymous request and is
/// evaluated at rank 0.
pub fn evaluate(
    actor: Option<&Actor>,
    capability: Capability,
    resource_owner: Option<&str>,
    resource_status: Option<PostStatus>,
) -> Decision {
    let (actor_id, rank, is_active) = match actor {
        Some(a) => (Some(a.id.as_str()), a.role.rank(), a.is_active),
        None => (None, ANONYMOUS_RANK, true),
    };

    if !is_active {
        return Decision::deny(REASON_INACTIVE);
    }

    let is_owner = match (actor_id, resource_owner) {
        (Some(a), Some(o)) => a == o,
        _ => false,
    };

    // Self-protection: nobody mutates their own role or deletes their own
    // account through this evaluator, whatever their rank.
    if capability.forbids_self() && is_owner {
        return Decision::deny(REASON_SELF_ACTION);
    }

    // Published content is locked to its owner: edit/delete requires admin
    // rank even for the author.
    if matches!(resource_status, Some(PostStatus::Published))
        && matches!(capability, Capability::EditPost | Capability::DeletePost)
    {
        return if rank >= Role::Admin.rank() {
            Decision::grant(REASON_GRANTED)
        } else {
            Decision::deny(REASON_PUBLISHED_LOCK)
        };
    }

    if is_owner {
        if let Some(owner_rank) = capability.owner_rank() {
            if rank >= owner_rank {
                return Decision::grant(REASON_OWNER);
            }
        }
    }

    if rank >= capability.required_rank() {
        Decision::grant(REASON_GRANTED)
    } else {
        Decision::deny(REASON_INSUFFICIENT_ROLE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor(id: &str, role: Role) -> Actor {
        Actor {
            id: id.to_string(),
            role,
            is_active: true,
        }
    }

    #[test]
    fn test_anonymous_is_rank_zero() {
        let decision = evaluate(None, Capability::Comment, None, None);
        assert!(!decision.granted);
        assert_eq!(decision.reason, REASON_INSUFFICIENT_ROLE);
    }

    #[test]
    fn test_minimum_rank_rule() {
        let editor = actor("e1", Role::Editor);
        assert!(evaluate(Some(&editor), Capability::CreatePost, None, None).granted);
        assert!(!evaluate(Some(&editor), Capability::PublishPost, None, None).granted);

        let admin = actor("a1", Role::Admin);
        assert!(evaluate(Some(&admin), Capability::PublishPost, None, None).granted);
    }

    #[test]
    fn test_ownership_lowers_edit_rank() {
        let editor = actor("e1", Role::Editor);
        let denied = evaluate(Some(&editor), Capability::EditPost, Some("someone-else"), None);
        assert!(!denied.granted);

        let granted = evaluate(
            Some(&editor),
            Capability::EditPost,
            Some("e1"),
            Some(PostStatus::Draft),
        );
        assert!(granted.granted);
        assert_eq!(granted.reason, REASON_OWNER);
    }

    #[test]
    fn test_ownership_never_lowers_publish() {
        let editor = actor("e1", Role::Editor);
        let decision = evaluate(
            Some(&editor),
            Capability::PublishPost,
            Some("e1"),
            Some(PostStatus::UnderReview),
        );
        assert!(!decision.granted);
        assert_eq!(decision.reason, REASON_INSUFFICIENT_ROLE);
    }

    #[test]
    fn test_published_content_locked_to_owner() {
        let editor = actor("e1", Role::Editor);
        let decision = evaluate(
            Some(&editor),
            Capability::EditPost,
            Some("e1"),
            Some(PostStatus::Published),
        );
        assert!(!decision.granted);
        assert_eq!(decision.reason, REASON_PUBLISHED_LOCK);

        let admin = actor("a1", Role::Admin);
        let decision = evaluate(
            Some(&admin),
            Capability::EditPost,
            Some("e1"),
            Some(PostStatus::Published),
        );
        assert!(decision.granted);
    }

    #[test]
    fn test_self_action_forbidden_for_every_rank() {
        for role in Role::all() {
            let a = actor("u1", *role);
            let decision = evaluate(Some(&a), Capability::ManageRoles, Some("u1"), None);
            assert!(!decision.granted, "{:?} must not mutate own role", role);
            assert_eq!(decision.reason, REASON_SELF_ACTION);

            let decision = evaluate(Some(&a), Capability::ManageUsers, Some("u1"), None);
            assert!(!decision.granted, "{:?} must not delete own account", role);
        }
    }

    #[test]
    fn test_inactive_actor_denied() {
        let mut a = actor("u1", Role::Admin);
        a.is_active = false;
        let decision = evaluate(Some(&a), Capability::PublishPost, None, None);
        assert!(!decision.granted);
        assert_eq!(decision.reason, REASON_INACTIVE);
    }

    #[test]
    fn test_moderator_can_moderate_comments_not_posts() {
        let moderator = actor("m1", Role::Moderator);
        assert!(evaluate(Some(&moderator), Capability::ModerateComments, None, None).granted);
        assert!(!evaluate(Some(&moderator), Capability::ModeratePosts, None, None).granted);
    }

    #[test]
    fn test_only_super_admin_manages_roles() {
        let admin = actor("a1", Role::Admin);
        assert!(!evaluate(Some(&admin), Capability::ManageRoles, Some("u2"), None).granted);

        let super_admin = actor("s1", Role::SuperAdmin);
        assert!(evaluate(Some(&super_admin), Capability::ManageRoles, Some("u2"), None).granted);
    }

    #[test]
    fn test_action_names_are_snake_case() {
        let caps = [
            Capability::CreatePost,
            Capability::EditPost,
            Capability::DeletePost,
            Capability::PublishPost,
            Capability::ModeratePosts,
            Capability::ModerateComments,
            Capability::Comment,
            Capability::ManageRoles,
            Capability::ManageUsers,
            Capability::ViewAuditLog,
        ];
        for cap in caps {
            assert!(cap
                .action_name()
                .chars()
                .all(|c| c.is_ascii_lowercase() || c == '_'));
        }
    }
}
