/// Content API endpoints: post CRUD glue plus the lifecycle and comment
/// moderation surfaces
use crate::{
    auth::{AuthContext, OptionalAuthContext},
    context::AppContext,
    db::models::Post,
    error::{PlatformError, PlatformResult},
    governance::lifecycle::PostStatus,
    governance::roles::Role,
    metrics,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use validator::Validate;

/// Build content routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/posts", post(create_post))
        .route("/posts/:id", get(get_post).delete(delete_post))
        .route("/content/:id/submit-review", post(submit_for_review))
        .route("/content/:id/approve", post(approve))
        .route("/content/:id/reject", post(reject))
        .route("/content/:id/resubmit", post(resubmit))
        .route("/content/:id/archive", post(archive))
        .route("/posts/:id/comments", post(create_comment))
        .route("/comments/:id/approve", post(approve_comment))
        .route("/comments/:id/reject", post(reject_comment))
        .route("/comments/:id/spam", post(spam_comment))
}

#[derive(Debug, Deserialize, Validate)]
struct CreatePostRequest {
    #[validate(length(min = 1, max = 200))]
    title: String,
    #[validate(length(min = 1))]
    body: String,
}

/// Create a draft post
async fn create_post(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(req): Json<CreatePostRequest>,
) -> PlatformResult<(StatusCode, Json<Post>)> {
    req.validate()
        .map_err(|e| PlatformError::Validation(e.to_string()))?;

    let post = ctx
        .lifecycle
        .create_draft(&auth.actor, &req.title, &req.body)
        .await?;

    Ok((StatusCode::CREATED, Json(post)))
}

/// Fetch a post. Published posts are public; everything else is visible
/// only to its author and to admins.
async fn get_post(
    State(ctx): State<AppContext>,
    maybe_auth: OptionalAuthContext,
    Path(id): Path<String>,
) -> PlatformResult<Json<Post>> {
    let post = ctx.lifecycle.get_post(&id).await?;

    if post.status != PostStatus::Published {
        let visible = maybe_auth.auth.as_ref().is_some_and(|auth| {
            auth.actor.id == post.author_id || auth.actor.role.can_act_as(Role::Admin)
        });
        if !visible {
            // Don't reveal that the post exists
            return Err(PlatformError::NotFound(format!("Post {} not found", id)));
        }
    }

    Ok(Json(post))
}

/// Delete a post
async fn delete_post(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> PlatformResult<Json<serde_json::Value>> {
    ctx.lifecycle.delete(&id, &auth.actor).await?;

    Ok(Json(serde_json::json!({ "deleted": id })))
}

/// draft -> under_review
async fn submit_for_review(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> PlatformResult<Json<Post>> {
    let post = ctx.lifecycle.submit_for_review(&id, &auth.actor).await?;
    metrics::LIFECYCLE_TRANSITIONS_TOTAL
        .with_label_values(&["submit_for_review"])
        .inc();

    Ok(Json(post))
}

/// under_review -> published
async fn approve(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> PlatformResult<Json<Post>> {
    let post = ctx.lifecycle.approve(&id, &auth.actor).await?;
    metrics::LIFECYCLE_TRANSITIONS_TOTAL
        .with_label_values(&["approve"])
        .inc();

    Ok(Json(post))
}

#[derive(Debug, Deserialize)]
struct RejectRequest {
    feedback: String,
}

/// under_review -> rejected; feedback is required and validated against the
/// deployment's minimum length
async fn reject(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
    Json(req): Json<RejectRequest>,
) -> PlatformResult<Json<Post>> {
    let post = ctx.lifecycle.reject(&id, &auth.actor, &req.feedback).await?;
    metrics::LIFECYCLE_TRANSITIONS_TOTAL
        .with_label_values(&["reject"])
        .inc();

    Ok(Json(post))
}

#[derive(Debug, Deserialize, Default)]
struct ResubmitRequest {
    note: Option<String>,
}

/// rejected -> under_review
async fn resubmit(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
    body: Option<Json<ResubmitRequest>>,
) -> PlatformResult<Json<Post>> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let post = ctx
        .lifecycle
        .resubmit(&id, &auth.actor, req.note.as_deref())
        .await?;
    metrics::LIFECYCLE_TRANSITIONS_TOTAL
        .with_label_values(&["resubmit"])
        .inc();

    Ok(Json(post))
}

/// published | rejected -> archived
async fn archive(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> PlatformResult<Json<Post>> {
    let post = ctx.lifecycle.archive(&id, &auth.actor).await?;
    metrics::LIFECYCLE_TRANSITIONS_TOTAL
        .with_label_values(&["archive"])
        .inc();

    Ok(Json(post))
}

#[derive(Debug, Deserialize, Validate)]
struct CreateCommentRequest {
    #[validate(length(min = 1, max = 4000))]
    body: String,
    guest_name: Option<String>,
}

/// Comment on a published post, as an authenticated user or a guest
async fn create_comment(
    State(ctx): State<AppContext>,
    maybe_auth: OptionalAuthContext,
    Path(post_id): Path<String>,
    Json(req): Json<CreateCommentRequest>,
) -> PlatformResult<(StatusCode, Json<crate::db::models::Comment>)> {
    req.validate()
        .map_err(|e| PlatformError::Validation(e.to_string()))?;

    let comment = ctx
        .comments
        .create_comment(
            &post_id,
            maybe_auth.auth.as_ref().map(|a| &a.actor),
            req.guest_name.as_deref(),
            &req.body,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(comment)))
}

/// pending -> approved
async fn approve_comment(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> PlatformResult<Json<crate::db::models::Comment>> {
    let comment = ctx.comments.approve(&id, &auth.actor).await?;
    Ok(Json(comment))
}

/// pending -> rejected
async fn reject_comment(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> PlatformResult<Json<crate::db::models::Comment>> {
    let comment = ctx.comments.reject(&id, &auth.actor).await?;
    Ok(Json(comment))
}

/// pending -> spam
async fn spam_comment(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> PlatformResult<Json<crate::db::models::Comment>> {
    let comment = ctx.comments.mark_spam(&id, &auth.actor).await?;
    Ok(Json(comment))
}
