/// Post lifecycle state machine
///
/// Posts move along a fixed set of guarded edges:
/// draft -> under_review -> published | rejected, rejected -> under_review
/// (resubmission), and published | rejected -> archived. Status is never
/// written outside this module; every transition is a read-then-write on the
/// post row inside one transaction, and every attempt lands in the audit
/// trail exactly once.
use crate::db::models::{Actor, Post};
use crate::error::{PlatformError, PlatformResult};
use crate::governance::audit::{AuditEntry, AuditLog};
use crate::governance::permissions::{
    self, Capability, REASON_NOT_OWNER,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqliteConnection, SqlitePool};
use uuid::Uuid;

/// Post lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostStatus {
    Draft,
    UnderReview,
    Published,
    Rejected,
    Archived,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::UnderReview => "under_review",
            PostStatus::Published => "published",
            PostStatus::Rejected => "rejected",
            PostStatus::Archived => "archived",
        }
    }

    pub fn from_str(s: &str) -> PlatformResult<Self> {
        match s {
            "draft" => Ok(PostStatus::Draft),
            "under_review" => Ok(PostStatus::UnderReview),
            "published" => Ok(PostStatus::Published),
            "rejected" => Ok(PostStatus::Rejected),
            "archived" => Ok(PostStatus::Archived),
            _ => Err(PlatformError::Validation(format!(
                "Invalid post status: {}",
                s
            ))),
        }
    }
}

/// Post lifecycle manager
#[derive(Clone)]
pub struct ContentLifecycle {
    db: SqlitePool,
    audit: AuditLog,
    min_feedback_chars: usize,
}

impl ContentLifecycle {
    pub fn new(db: SqlitePool, audit: AuditLog, min_feedback_chars: usize) -> Self {
        Self {
            db,
            audit,
            min_feedback_chars,
        }
    }

    /// Create a new draft post owned by the actor
    pub async fn create_draft(
        &self,
        actor: &Actor,
        title: &str,
        body: &str,
    ) -> PlatformResult<Post> {
        let decision = permissions::evaluate(Some(actor), Capability::CreatePost, None, None);
        if !decision.granted {
            self.audit
                .record_best_effort(&AuditEntry::decision(
                    Some(&actor.id),
                    "post.create",
                    Capability::CreatePost,
                    &decision,
                ))
                .await;
            return Err(PlatformError::PermissionDenied(decision.reason.to_string()));
        }

        if title.trim().is_empty() {
            return Err(PlatformError::Validation("Title cannot be empty".to_string()));
        }

        let now = Utc::now();
        let post = Post {
            id: Uuid::new_v4().to_string(),
            author_id: actor.id.clone(),
            title: title.to_string(),
            body: body.to_string(),
            status: PostStatus::Draft,
            feedback: None,
            resubmission_note: None,
            published_at: None,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO posts (id, author_id, title, body, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&post.id)
        .bind(&post.author_id)
        .bind(&post.title)
        .bind(&post.body)
        .bind(post.status.as_str())
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.db)
        .await?;

        self.audit
            .record_best_effort(
                &AuditEntry::decision(Some(&actor.id), "post.create", Capability::CreatePost, &decision)
                    .with_change(
                        serde_json::Value::Null,
                        serde_json::json!({"id": post.id, "status": "draft"}),
                    ),
            )
            .await;

        Ok(post)
    }

    /// Fetch a post by id
    pub async fn get_post(&self, post_id: &str) -> PlatformResult<Post> {
        let row = sqlx::query(
            r#"
            SELECT id, author_id, title, body, status, feedback, resubmission_note,
                   published_at, created_at, updated_at
            FROM posts
            WHERE id = ?
            "#,
        )
        .bind(post_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| PlatformError::NotFound(format!("Post {} not found", post_id)))?;

        Self::parse_post(row)
    }

    /// List posts in a given status, oldest first (moderation queue order)
    pub async fn list_by_status(
        &self,
        status: PostStatus,
        limit: i64,
    ) -> PlatformResult<Vec<Post>> {
        let rows = sqlx::query(
            r#"
            SELECT id, author_id, title, body, status, feedback, resubmission_note,
                   published_at, created_at, updated_at
            FROM posts
            WHERE status = ?
            ORDER BY updated_at ASC
            LIMIT ?
            "#,
        )
        .bind(status.as_str())
        .bind(limit.clamp(1, 500))
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(Self::parse_post).collect()
    }

    /// draft -> under_review; only the owner may submit
    pub async fn submit_for_review(&self, post_id: &str, actor: &Actor) -> PlatformResult<Post> {
        self.transition(
            post_id,
            actor,
            "post.submit_for_review",
            Capability::EditPost,
            &[PostStatus::Draft],
            PostStatus::UnderReview,
            TransitionEffect::None,
            OwnerGuard::OwnerOnly,
        )
        .await
    }

    /// under_review -> published; requires admin rank, sets published_at
    pub async fn approve(&self, post_id: &str, actor: &Actor) -> PlatformResult<Post> {
        self.transition(
            post_id,
            actor,
            "post.approve",
            Capability::PublishPost,
            &[PostStatus::UnderReview],
            PostStatus::Published,
            TransitionEffect::SetPublishedAt,
            OwnerGuard::Rank,
        )
        .await
    }

    /// under_review -> rejected; requires admin rank and substantive feedback
    pub async fn reject(
        &self,
        post_id: &str,
        actor: &Actor,
        feedback: &str,
    ) -> PlatformResult<Post> {
        let feedback = feedback.trim();
        if feedback.chars().count() < self.min_feedback_chars {
            return Err(PlatformError::Validation(format!(
                "Rejection feedback must be at least {} characters",
                self.min_feedback_chars
            )));
        }

        self.transition(
            post_id,
            actor,
            "post.reject",
            Capability::ModeratePosts,
            &[PostStatus::UnderReview],
            PostStatus::Rejected,
            TransitionEffect::SetFeedback(feedback.to_string()),
            OwnerGuard::Rank,
        )
        .await
    }

    /// rejected -> under_review; only the owner may resubmit
    pub async fn resubmit(
        &self,
        post_id: &str,
        actor: &Actor,
        note: Option<&str>,
    ) -> PlatformResult<Post> {
        self.transition(
            post_id,
            actor,
            "post.resubmit",
            Capability::EditPost,
            &[PostStatus::Rejected],
            PostStatus::UnderReview,
            TransitionEffect::SetResubmissionNote(note.map(str::to_string)),
            OwnerGuard::OwnerOnly,
        )
        .await
    }

    /// published | rejected -> archived; terminal administrative action
    pub async fn archive(&self, post_id: &str, actor: &Actor) -> PlatformResult<Post> {
        self.transition(
            post_id,
            actor,
            "post.archive",
            Capability::ModeratePosts,
            &[PostStatus::Published, PostStatus::Rejected],
            PostStatus::Archived,
            TransitionEffect::None,
            OwnerGuard::Rank,
        )
        .await
    }

    /// Remove a post row entirely. Owners may delete their own unpublished
    /// work; published posts are locked to admin rank.
    pub async fn delete(&self, post_id: &str, actor: &Actor) -> PlatformResult<()> {
        let mut tx = self.db.begin().await?;

        let post = Self::fetch_for_update(&mut tx, post_id).await?;

        let decision = permissions::evaluate(
            Some(actor),
            Capability::DeletePost,
            Some(&post.author_id),
            Some(post.status),
        );
        if !decision.granted {
            drop(tx);
            self.audit
                .record_best_effort(&AuditEntry::decision(
                    Some(&actor.id),
                    "post.delete",
                    Capability::DeletePost,
                    &decision,
                ))
                .await;
            return Err(PlatformError::PermissionDenied(decision.reason.to_string()));
        }

        sqlx::query("DELETE FROM comments WHERE post_id = ?")
            .bind(post_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM posts WHERE id = ?")
            .bind(post_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        self.audit
            .record_best_effort(
                &AuditEntry::decision(Some(&actor.id), "post.delete", Capability::DeletePost, &decision)
                    .with_change(
                        serde_json::json!({"id": post.id, "status": post.status.as_str()}),
                        serde_json::Value::Null,
                    ),
            )
            .await;

        Ok(())
    }

    /// Shared transition path: permission check, state guard, guarded write,
    /// then one audit entry for the attempt.
    #[allow(clippy::too_many_arguments)]
    async fn transition(
        &self,
        post_id: &str,
        actor: &Actor,
        action: &str,
        capability: Capability,
        from: &[PostStatus],
        to: PostStatus,
        effect: TransitionEffect,
        owner_guard: OwnerGuard,
    ) -> PlatformResult<Post> {
        let mut tx = self.db.begin().await?;

        let post = Self::fetch_for_update(&mut tx, post_id).await?;

        // Ownership-guarded events (submit, resubmit) are restricted to the
        // owner; rank-guarded events go through the evaluator.
        let decision = match owner_guard {
            OwnerGuard::OwnerOnly => {
                if post.author_id == actor.id {
                    permissions::evaluate(
                        Some(actor),
                        capability,
                        Some(&post.author_id),
                        Some(post.status),
                    )
                } else {
                    crate::governance::permissions::Decision {
                        granted: false,
                        reason: REASON_NOT_OWNER,
                    }
                }
            }
            OwnerGuard::Rank => permissions::evaluate(
                Some(actor),
                capability,
                Some(&post.author_id),
                Some(post.status),
            ),
        };

        if !decision.granted {
            drop(tx);
            self.audit
                .record_best_effort(&AuditEntry::decision(
                    Some(&actor.id),
                    action,
                    capability,
                    &decision,
                ))
                .await;
            return Err(PlatformError::PermissionDenied(decision.reason.to_string()));
        }

        if !from.contains(&post.status) {
            drop(tx);
            // Invalid transitions are audited as denied attempts, not
            // silently ignored.
            self.audit
                .record_best_effort(&AuditEntry {
                    actor_id: Some(actor.id.clone()),
                    action: action.to_string(),
                    capability: Some(capability),
                    granted: false,
                    denial_reason: Some("not_pending_for_action".to_string()),
                    ..AuditEntry::default()
                })
                .await;
            return Err(PlatformError::InvalidTransition(format!(
                "{} is not valid while post is {}",
                action,
                post.status.as_str()
            )));
        }

        let now = Utc::now();
        let mut updated = post.clone();
        updated.status = to;
        updated.updated_at = now;

        // Guarded write: the WHERE clause re-checks the status read above so
        // a racing transition cannot both succeed from the same prior state.
        let result = match &effect {
            TransitionEffect::None => {
                sqlx::query("UPDATE posts SET status = ?, updated_at = ? WHERE id = ? AND status = ?")
                    .bind(to.as_str())
                    .bind(now.to_rfc3339())
                    .bind(post_id)
                    .bind(post.status.as_str())
                    .execute(&mut *tx)
                    .await?
            }
            TransitionEffect::SetPublishedAt => {
                updated.published_at = Some(now);
                sqlx::query(
                    "UPDATE posts SET status = ?, published_at = ?, updated_at = ? WHERE id = ? AND status = ?",
                )
                .bind(to.as_str())
                .bind(now.to_rfc3339())
                .bind(now.to_rfc3339())
                .bind(post_id)
                .bind(post.status.as_str())
                .execute(&mut *tx)
                .await?
            }
            TransitionEffect::SetFeedback(feedback) => {
                updated.feedback = Some(feedback.clone());
                sqlx::query(
                    "UPDATE posts SET status = ?, feedback = ?, updated_at = ? WHERE id = ? AND status = ?",
                )
                .bind(to.as_str())
                .bind(feedback)
                .bind(now.to_rfc3339())
                .bind(post_id)
                .bind(post.status.as_str())
                .execute(&mut *tx)
                .await?
            }
            TransitionEffect::SetResubmissionNote(note) => {
                updated.resubmission_note = note.clone();
                sqlx::query(
                    "UPDATE posts SET status = ?, resubmission_note = ?, updated_at = ? WHERE id = ? AND status = ?",
                )
                .bind(to.as_str())
                .bind(note)
                .bind(now.to_rfc3339())
                .bind(post_id)
                .bind(post.status.as_str())
                .execute(&mut *tx)
                .await?
            }
        };

        if result.rows_affected() == 0 {
            drop(tx);
            return Err(PlatformError::InvalidTransition(format!(
                "Post {} changed state concurrently",
                post_id
            )));
        }

        tx.commit().await?;

        // Mutation is committed; the audit row is best-effort from here.
        let reason = match &effect {
            TransitionEffect::SetFeedback(feedback) => Some(feedback.clone()),
            TransitionEffect::SetResubmissionNote(note) => note.clone(),
            _ => None,
        };
        self.audit
            .record_best_effort(
                &AuditEntry::decision(Some(&actor.id), action, capability, &decision)
                    .with_change(
                        serde_json::json!({"status": post.status.as_str()}),
                        serde_json::json!({"status": to.as_str()}),
                    )
                    .with_reason(reason),
            )
            .await;

        Ok(updated)
    }

    async fn fetch_for_update(
        tx: &mut SqliteConnection,
        post_id: &str,
    ) -> PlatformResult<Post> {
        let row = sqlx::query(
            r#"
            SELECT id, author_id, title, body, status, feedback, resubmission_note,
                   published_at, created_at, updated_at
            FROM posts
            WHERE id = ?
            "#,
        )
        .bind(post_id)
        .fetch_optional(tx)
        .await?
        .ok_or_else(|| PlatformError::NotFound(format!("Post {} not found", post_id)))?;

        Self::parse_post(row)
    }

    fn parse_post(row: sqlx::sqlite::SqliteRow) -> PlatformResult<Post> {
        let status_str: String = row.get("status");
        let status = PostStatus::from_str(&status_str)?;

        let created_at = Self::parse_timestamp(row.get("created_at"))?;
        let updated_at = Self::parse_timestamp(row.get("updated_at"))?;
        let published_at = row
            .try_get::<String, _>("published_at")
            .ok()
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        Ok(Post {
            id: row.get("id"),
            author_id: row.get("author_id"),
            title: row.get("title"),
            body: row.get("body"),
            status,
            feedback: row.get("feedback"),
            resubmission_note: row.get("resubmission_note"),
            published_at,
            created_at,
            updated_at,
        })
    }

    fn parse_timestamp(s: String) -> PlatformResult<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| PlatformError::Internal(format!("Invalid timestamp: {}", e)))
    }
}

enum TransitionEffect {
    None,
    SetPublishedAt,
    SetFeedback(String),
    SetResubmissionNote(Option<String>),
}

enum OwnerGuard {
    /// Only the owning author may fire the event
    OwnerOnly,
    /// Rank (or ownership tier) via the evaluator
    Rank,
}
