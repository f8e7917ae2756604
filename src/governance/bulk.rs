/// Bulk governance operations
///
/// A bulk run is a client-requested batch of independent single-item
/// operations. Items are applied sequentially through the same guarded
/// paths as their single-item endpoints, and one item's failure never
/// aborts, rolls back, or skips the rest: moderation queues are large and
/// an admin should not lose a whole batch to one stale id. Only a storage
/// failure, which would poison every remaining item anyway, stops the run.
use crate::db::models::Actor;
use crate::error::{PlatformError, PlatformResult};
use crate::governance::comments::CommentModeration;
use crate::governance::lifecycle::ContentLifecycle;
use crate::governance::role_change::RoleChangeCoordinator;
use crate::governance::roles::Role;
use serde::{Deserialize, Serialize};

/// Operations a bulk request can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkAction {
    /// Approve posts under review
    Approve,
    /// Reject posts under review (requires feedback)
    Reject,
    /// Archive published or rejected posts
    Archive,
    /// Delete posts
    Delete,
    /// Approve pending comments
    ApproveComments,
    /// Reject pending comments
    RejectComments,
    /// Mark pending comments as spam
    SpamComments,
    /// Change user roles (requires role)
    ChangeRole,
}

impl BulkAction {
    /// Label used in metrics and logging
    pub const fn action_name(&self) -> &'static str {
        match self {
            BulkAction::Approve => "approve",
            BulkAction::Reject => "reject",
            BulkAction::Archive => "archive",
            BulkAction::Delete => "delete",
            BulkAction::ApproveComments => "approve_comments",
            BulkAction::RejectComments => "reject_comments",
            BulkAction::SpamComments => "spam_comments",
            BulkAction::ChangeRole => "change_role",
        }
    }
}

/// Optional parameters shared by the whole batch
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BulkParams {
    pub feedback: Option<String>,
    pub role: Option<Role>,
    pub reason: Option<String>,
}

/// Result of one item in a batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkItemResult {
    pub id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of a whole batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkOutcome {
    pub total: usize,
    #[serde(rename = "successful")]
    pub succeeded: usize,
    pub failed: usize,
    pub results: Vec<BulkItemResult>,
}

/// Bulk operation runner
#[derive(Clone)]
pub struct BulkOperationRunner {
    lifecycle: ContentLifecycle,
    comments: CommentModeration,
    role_changes: RoleChangeCoordinator,
}

impl BulkOperationRunner {
    pub fn new(
        lifecycle: ContentLifecycle,
        comments: CommentModeration,
        role_changes: RoleChangeCoordinator,
    ) -> Self {
        Self {
            lifecycle,
            comments,
            role_changes,
        }
    }

    /// Apply `action` to every id, collecting per-item outcomes
    pub async fn run(
        &self,
        action: BulkAction,
        ids: &[String],
        actor: &Actor,
        params: &BulkParams,
    ) -> PlatformResult<BulkOutcome> {
        let mut results = Vec::with_capacity(ids.len());
        let mut succeeded = 0;
        let mut failed = 0;

        for id in ids {
            match self.apply_one(action, id, actor, params).await {
                Ok(()) => {
                    succeeded += 1;
                    results.push(BulkItemResult {
                        id: id.clone(),
                        success: true,
                        error: None,
                    });
                }
                // A storage failure poisons the whole batch; everything else
                // is an item-level outcome.
                Err(e @ PlatformError::Database(_)) => return Err(e),
                Err(e) => {
                    failed += 1;
                    results.push(BulkItemResult {
                        id: id.clone(),
                        success: false,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        Ok(BulkOutcome {
            total: ids.len(),
            succeeded,
            failed,
            results,
        })
    }

    async fn apply_one(
        &self,
        action: BulkAction,
        id: &str,
        actor: &Actor,
        params: &BulkParams,
    ) -> PlatformResult<()> {
        match action {
            BulkAction::Approve => {
                self.lifecycle.approve(id, actor).await?;
            }
            BulkAction::Reject => {
                let feedback = params.feedback.as_deref().unwrap_or("");
                self.lifecycle.reject(id, actor, feedback).await?;
            }
            BulkAction::Archive => {
                self.lifecycle.archive(id, actor).await?;
            }
            BulkAction::Delete => {
                self.lifecycle.delete(id, actor).await?;
            }
            BulkAction::ApproveComments => {
                self.comments.approve(id, actor).await?;
            }
            BulkAction::RejectComments => {
                self.comments.reject(id, actor).await?;
            }
            BulkAction::SpamComments => {
                self.comments.mark_spam(id, actor).await?;
            }
            BulkAction::ChangeRole => {
                let role = params.role.ok_or_else(|| {
                    PlatformError::Validation("Bulk role change requires a role".to_string())
                })?;
                self.role_changes
                    .change_role(id, role, actor, params.reason.as_deref())
                    .await?;
            }
        }
        Ok(())
    }
}
