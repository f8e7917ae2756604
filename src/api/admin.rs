/// Admin and moderation API endpoints
use crate::{
    auth::{require_capability, StaffAuthContext},
    context::AppContext,
    error::{PlatformError, PlatformResult},
    governance::audit::AuditFilter,
    governance::bulk::{BulkAction, BulkOutcome, BulkParams},
    governance::lifecycle::PostStatus,
    governance::permissions::Capability,
    governance::roles::Role,
    metrics,
};
use axum::{
    extract::{Path, Query, State},
    routing::{get, patch, post},
    Json, Router,
};
use serde::Deserialize;

/// Build admin routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        // User administration
        .route("/admin/users", get(list_users))
        .route("/admin/users/:id/role", patch(change_role))
        .route("/admin/users/:id/role-history", get(role_history))
        .route("/admin/users/:id/deactivate", post(deactivate_user))
        // Moderation queues and bulk operations
        .route("/moderation/posts", get(post_queue))
        .route("/moderation/comments", get(comment_queue))
        .route("/moderation/bulk", post(bulk))
        // Audit trail
        .route("/audit/events", get(audit_events))
        .route("/audit/stats", get(audit_stats))
}

#[derive(Debug, Deserialize)]
struct ListUsersQuery {
    #[serde(default)]
    page: Option<i64>,
    #[serde(default)]
    size: Option<i64>,
}

/// List users, newest first
async fn list_users(
    State(ctx): State<AppContext>,
    auth: StaffAuthContext,
    Query(query): Query<ListUsersQuery>,
) -> PlatformResult<Json<serde_json::Value>> {
    require_capability(&ctx, &auth.actor, Capability::ManageUsers, "admin.list_users").await?;

    let size = query.size.unwrap_or(50);
    let offset = query.page.unwrap_or(0).max(0) * size.clamp(1, 100);
    let users = ctx.users.list(size, offset).await?;

    Ok(Json(serde_json::json!({ "users": users })))
}

#[derive(Debug, Deserialize)]
struct ChangeRoleRequest {
    role: String,
    #[serde(default)]
    reason: Option<String>,
}

/// Change a user's role
async fn change_role(
    State(ctx): State<AppContext>,
    auth: StaffAuthContext,
    Path(id): Path<String>,
    Json(req): Json<ChangeRoleRequest>,
) -> PlatformResult<Json<serde_json::Value>> {
    let new_role = Role::from_str(&req.role)?;

    let user = ctx
        .role_changes
        .change_role(&id, new_role, &auth.actor, req.reason.as_deref())
        .await?;

    metrics::ROLE_CHANGES_TOTAL.inc();

    Ok(Json(serde_json::json!({
        "id": user.id,
        "username": user.username,
        "email": user.email,
        "role": user.role.as_str(),
        "is_active": user.is_active,
    })))
}

#[derive(Debug, Deserialize)]
struct RoleHistoryQuery {
    #[serde(default)]
    page: Option<i64>,
    #[serde(default)]
    size: Option<i64>,
}

/// Paginated role change history for a user
async fn role_history(
    State(ctx): State<AppContext>,
    auth: StaffAuthContext,
    Path(id): Path<String>,
    Query(query): Query<RoleHistoryQuery>,
) -> PlatformResult<Json<serde_json::Value>> {
    require_capability(&ctx, &auth.actor, Capability::ViewAuditLog, "admin.role_history").await?;

    // 404 for unknown users rather than an empty history
    ctx.users.get(&id).await?;

    let history = ctx
        .role_changes
        .history(&id, query.page.unwrap_or(0), query.size.unwrap_or(20))
        .await?;

    Ok(Json(serde_json::json!({
        "user_id": id,
        "history": history,
    })))
}

#[derive(Debug, Deserialize, Default)]
struct DeactivateRequest {
    #[serde(default)]
    reason: Option<String>,
}

/// Deactivate a user account (status change, never row removal)
async fn deactivate_user(
    State(ctx): State<AppContext>,
    auth: StaffAuthContext,
    Path(id): Path<String>,
    body: Option<Json<DeactivateRequest>>,
) -> PlatformResult<Json<serde_json::Value>> {
    let req = body.map(|Json(r)| r).unwrap_or_default();

    let user = ctx
        .role_changes
        .deactivate_user(&id, &auth.actor, req.reason.as_deref())
        .await?;

    Ok(Json(serde_json::json!({
        "id": user.id,
        "is_active": user.is_active,
    })))
}

#[derive(Debug, Deserialize)]
struct QueueQuery {
    #[serde(default)]
    limit: Option<i64>,
}

/// Posts waiting for review, oldest first
async fn post_queue(
    State(ctx): State<AppContext>,
    auth: StaffAuthContext,
    Query(query): Query<QueueQuery>,
) -> PlatformResult<Json<serde_json::Value>> {
    require_capability(&ctx, &auth.actor, Capability::ModeratePosts, "moderation.post_queue")
        .await?;

    let posts = ctx
        .lifecycle
        .list_by_status(PostStatus::UnderReview, query.limit.unwrap_or(50))
        .await?;

    Ok(Json(serde_json::json!({
        "count": posts.len(),
        "queue": posts,
    })))
}

/// Comments waiting for moderation, oldest first
async fn comment_queue(
    State(ctx): State<AppContext>,
    auth: StaffAuthContext,
    Query(query): Query<QueueQuery>,
) -> PlatformResult<Json<serde_json::Value>> {
    require_capability(
        &ctx,
        &auth.actor,
        Capability::ModerateComments,
        "moderation.comment_queue",
    )
    .await?;

    let comments = ctx.comments.list_pending(query.limit.unwrap_or(50)).await?;

    Ok(Json(serde_json::json!({
        "count": comments.len(),
        "queue": comments,
    })))
}

#[derive(Debug, Deserialize)]
struct BulkRequest {
    action: BulkAction,
    ids: Vec<String>,
    #[serde(default)]
    feedback: Option<String>,
    #[serde(default)]
    role: Option<Role>,
    #[serde(default)]
    reason: Option<String>,
}

/// Apply a governance action to a batch of ids. Always answers 200 with
/// per-item results in the body; a failing item never fails the request.
async fn bulk(
    State(ctx): State<AppContext>,
    auth: StaffAuthContext,
    Json(req): Json<BulkRequest>,
) -> PlatformResult<Json<BulkOutcome>> {
    if req.ids.is_empty() {
        return Err(PlatformError::Validation(
            "Bulk request requires at least one id".to_string(),
        ));
    }
    if req.ids.len() > 100 {
        return Err(PlatformError::Validation(
            "Bulk request is limited to 100 ids".to_string(),
        ));
    }

    let params = BulkParams {
        feedback: req.feedback,
        role: req.role,
        reason: req.reason,
    };

    let outcome = ctx.bulk.run(req.action, &req.ids, &auth.actor, &params).await?;

    metrics::BULK_ITEMS_TOTAL
        .with_label_values(&[req.action.action_name(), "succeeded"])
        .inc_by(outcome.succeeded as u64);
    metrics::BULK_ITEMS_TOTAL
        .with_label_values(&[req.action.action_name(), "failed"])
        .inc_by(outcome.failed as u64);

    Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
struct AuditEventsQuery {
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    granted: Option<bool>,
    #[serde(default)]
    action_prefix: Option<String>,
    #[serde(default)]
    limit: Option<i64>,
}

/// Recent audit events, newest first
async fn audit_events(
    State(ctx): State<AppContext>,
    auth: StaffAuthContext,
    Query(query): Query<AuditEventsQuery>,
) -> PlatformResult<Json<serde_json::Value>> {
    require_capability(&ctx, &auth.actor, Capability::ViewAuditLog, "audit.events").await?;

    let filter = AuditFilter {
        actor_id: query.user_id,
        granted: query.granted,
        action_prefix: query.action_prefix,
    };
    let events = ctx.audit.recent(&filter, query.limit.unwrap_or(50)).await?;

    Ok(Json(serde_json::json!({ "events": events })))
}

#[derive(Debug, Deserialize)]
struct AuditStatsQuery {
    #[serde(default)]
    days: Option<i64>,
}

/// Aggregate audit statistics over a recent window
async fn audit_stats(
    State(ctx): State<AppContext>,
    auth: StaffAuthContext,
    Query(query): Query<AuditStatsQuery>,
) -> PlatformResult<Json<serde_json::Value>> {
    require_capability(&ctx, &auth.actor, Capability::ViewAuditLog, "audit.stats").await?;

    let stats = ctx
        .audit
        .statistics(query.days.unwrap_or(7).clamp(1, 365))
        .await?;

    Ok(Json(serde_json::json!({ "stats": stats })))
}
