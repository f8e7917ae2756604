/// Comment moderation
///
/// Comments use a reduced machine: pending -> approved | rejected | spam.
/// Guest comments always enter pending. Authenticated comments enter
/// approved only when the deployment's auto-approval policy is on; whether
/// that is a trust decision is a per-deployment call, so it is a
/// configuration flag rather than hardcoded behavior.
use crate::db::models::{Actor, Comment};
use crate::error::{PlatformError, PlatformResult};
use crate::governance::audit::{AuditEntry, AuditLog};
use crate::governance::permissions::{self, Capability};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Comment moderation status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommentStatus {
    Pending,
    Approved,
    Rejected,
    Spam,
}

impl CommentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommentStatus::Pending => "pending",
            CommentStatus::Approved => "approved",
            CommentStatus::Rejected => "rejected",
            CommentStatus::Spam => "spam",
        }
    }

    pub fn from_str(s: &str) -> PlatformResult<Self> {
        match s {
            "pending" => Ok(CommentStatus::Pending),
            "approved" => Ok(CommentStatus::Approved),
            "rejected" => Ok(CommentStatus::Rejected),
            "spam" => Ok(CommentStatus::Spam),
            _ => Err(PlatformError::Validation(format!(
                "Invalid comment status: {}",
                s
            ))),
        }
    }
}

/// Comment moderation manager
#[derive(Clone)]
pub struct CommentModeration {
    db: SqlitePool,
    audit: AuditLog,
    auto_approve: bool,
}

impl CommentModeration {
    pub fn new(db: SqlitePool, audit: AuditLog, auto_approve: bool) -> Self {
        Self {
            db,
            audit,
            auto_approve,
        }
    }

    /// Create a comment on a post. `author` is None for guest comments,
    /// which always enter the pending queue.
    pub async fn create_comment(
        &self,
        post_id: &str,
        author: Option<&Actor>,
        guest_name: Option<&str>,
        body: &str,
    ) -> PlatformResult<Comment> {
        if body.trim().is_empty() {
            return Err(PlatformError::Validation(
                "Comment body cannot be empty".to_string(),
            ));
        }

        let mut granted_decision = None;
        let status = match author {
            Some(actor) => {
                let decision =
                    permissions::evaluate(Some(actor), Capability::Comment, None, None);
                if !decision.granted {
                    self.audit
                        .record_best_effort(&AuditEntry::decision(
                            Some(&actor.id),
                            "comment.create",
                            Capability::Comment,
                            &decision,
                        ))
                        .await;
                    return Err(PlatformError::PermissionDenied(decision.reason.to_string()));
                }
                granted_decision = Some(decision);
                if self.auto_approve {
                    CommentStatus::Approved
                } else {
                    CommentStatus::Pending
                }
            }
            None => {
                if guest_name.map_or(true, |n| n.trim().is_empty()) {
                    return Err(PlatformError::Validation(
                        "Guest comments require a name".to_string(),
                    ));
                }
                CommentStatus::Pending
            }
        };

        // Reject comments on posts that are not published
        let post_status: Option<String> =
            sqlx::query_scalar("SELECT status FROM posts WHERE id = ?")
                .bind(post_id)
                .fetch_optional(&self.db)
                .await?;
        match post_status.as_deref() {
            None => {
                return Err(PlatformError::NotFound(format!(
                    "Post {} not found",
                    post_id
                )))
            }
            Some("published") => {}
            Some(_) => {
                return Err(PlatformError::Validation(
                    "Comments are only accepted on published posts".to_string(),
                ))
            }
        }

        let now = Utc::now();
        let comment = Comment {
            id: Uuid::new_v4().to_string(),
            post_id: post_id.to_string(),
            author_id: author.map(|a| a.id.clone()),
            guest_name: guest_name.map(str::to_string),
            body: body.to_string(),
            status,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO comments (id, post_id, author_id, guest_name, body, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&comment.id)
        .bind(&comment.post_id)
        .bind(&comment.author_id)
        .bind(&comment.guest_name)
        .bind(&comment.body)
        .bind(comment.status.as_str())
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.db)
        .await?;

        if let (Some(actor), Some(decision)) = (author, granted_decision) {
            self.audit
                .record_best_effort(
                    &AuditEntry::decision(Some(&actor.id), "comment.create", Capability::Comment, &decision)
                        .with_change(
                            serde_json::Value::Null,
                            serde_json::json!({"id": comment.id, "status": comment.status.as_str()}),
                        ),
                )
                .await;
        }

        Ok(comment)
    }

    /// pending -> approved
    pub async fn approve(&self, comment_id: &str, actor: &Actor) -> PlatformResult<Comment> {
        self.moderate(comment_id, actor, "comment.approve", CommentStatus::Approved)
            .await
    }

    /// pending -> rejected
    pub async fn reject(&self, comment_id: &str, actor: &Actor) -> PlatformResult<Comment> {
        self.moderate(comment_id, actor, "comment.reject", CommentStatus::Rejected)
            .await
    }

    /// pending -> spam
    pub async fn mark_spam(&self, comment_id: &str, actor: &Actor) -> PlatformResult<Comment> {
        self.moderate(comment_id, actor, "comment.spam", CommentStatus::Spam)
            .await
    }

    /// The moderation queue: pending comments, oldest first
    pub async fn list_pending(&self, limit: i64) -> PlatformResult<Vec<Comment>> {
        let rows = sqlx::query(
            r#"
            SELECT id, post_id, author_id, guest_name, body, status, created_at, updated_at
            FROM comments
            WHERE status = 'pending'
            ORDER BY created_at ASC
            LIMIT ?
            "#,
        )
        .bind(limit.clamp(1, 500))
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(Self::parse_comment).collect()
    }

    /// Fetch a comment by id
    pub async fn get_comment(&self, comment_id: &str) -> PlatformResult<Comment> {
        let row = sqlx::query(
            r#"
            SELECT id, post_id, author_id, guest_name, body, status, created_at, updated_at
            FROM comments
            WHERE id = ?
            "#,
        )
        .bind(comment_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| PlatformError::NotFound(format!("Comment {} not found", comment_id)))?;

        Self::parse_comment(row)
    }

    async fn moderate(
        &self,
        comment_id: &str,
        actor: &Actor,
        action: &str,
        to: CommentStatus,
    ) -> PlatformResult<Comment> {
        let decision =
            permissions::evaluate(Some(actor), Capability::ModerateComments, None, None);
        if !decision.granted {
            self.audit
                .record_best_effort(&AuditEntry::decision(
                    Some(&actor.id),
                    action,
                    Capability::ModerateComments,
                    &decision,
                ))
                .await;
            return Err(PlatformError::PermissionDenied(decision.reason.to_string()));
        }

        let mut tx = self.db.begin().await?;

        let comment = {
            let row = sqlx::query(
                r#"
                SELECT id, post_id, author_id, guest_name, body, status, created_at, updated_at
                FROM comments
                WHERE id = ?
                "#,
            )
            .bind(comment_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| PlatformError::NotFound(format!("Comment {} not found", comment_id)))?;
            Self::parse_comment(row)?
        };

        if comment.status != CommentStatus::Pending {
            drop(tx);
            self.audit
                .record_best_effort(&AuditEntry {
                    actor_id: Some(actor.id.clone()),
                    action: action.to_string(),
                    capability: Some(Capability::ModerateComments),
                    granted: false,
                    denial_reason: Some("not_pending_for_action".to_string()),
                    ..AuditEntry::default()
                })
                .await;
            return Err(PlatformError::InvalidTransition(format!(
                "{} is not valid while comment is {}",
                action,
                comment.status.as_str()
            )));
        }

        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE comments SET status = ?, updated_at = ? WHERE id = ? AND status = 'pending'",
        )
        .bind(to.as_str())
        .bind(now.to_rfc3339())
        .bind(comment_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            drop(tx);
            return Err(PlatformError::InvalidTransition(format!(
                "Comment {} changed state concurrently",
                comment_id
            )));
        }

        tx.commit().await?;

        self.audit
            .record_best_effort(
                &AuditEntry::decision(Some(&actor.id), action, Capability::ModerateComments, &decision)
                    .with_change(
                        serde_json::json!({"status": comment.status.as_str()}),
                        serde_json::json!({"status": to.as_str()}),
                    ),
            )
            .await;

        let mut updated = comment;
        updated.status = to;
        updated.updated_at = now;
        Ok(updated)
    }

    fn parse_comment(row: sqlx::sqlite::SqliteRow) -> PlatformResult<Comment> {
        let status_str: String = row.get("status");
        let status = CommentStatus::from_str(&status_str)?;

        let created_at_str: String = row.get("created_at");
        let created_at = DateTime::parse_from_rfc3339(&created_at_str)
            .map_err(|e| PlatformError::Internal(format!("Invalid timestamp: {}", e)))?
            .with_timezone(&Utc);
        let updated_at_str: String = row.get("updated_at");
        let updated_at = DateTime::parse_from_rfc3339(&updated_at_str)
            .map_err(|e| PlatformError::Internal(format!("Invalid timestamp: {}", e)))?
            .with_timezone(&Utc);

        Ok(Comment {
            id: row.get("id"),
            post_id: row.get("post_id"),
            author_id: row.get("author_id"),
            guest_name: row.get("guest_name"),
            body: row.get("body"),
            status,
            created_at,
            updated_at,
        })
    }
}
