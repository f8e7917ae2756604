//! HTTP-level tests for the admin surface: role changes, bulk moderation,
//! and the error codes the governance core maps onto responses.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use sqlx::sqlite::SqlitePoolOptions;
use tower::ServiceExt;
use vellum::config::{
    AuthConfig, LoggingConfig, ModerationConfig, RateLimitSettings, RetentionConfig, ServerConfig,
    ServiceConfig, StorageConfig,
};
use vellum::context::AppContext;
use vellum::governance::Role;

fn test_config() -> ServerConfig {
    ServerConfig {
        service: ServiceConfig {
            hostname: "localhost".to_string(),
            port: 0,
            version: "test".to_string(),
        },
        storage: StorageConfig {
            data_directory: ".".into(),
            database: ":memory:".into(),
        },
        authentication: AuthConfig {
            jwt_secret: "0123456789abcdef0123456789abcdef".to_string(),
            session_ttl: 3600,
            admin_emails: vec!["root@example.com".to_string()],
        },
        moderation: ModerationConfig {
            auto_approve_comments: true,
            min_feedback_chars: 10,
        },
        retention: RetentionConfig {
            audit_retention_days: 365,
            purge_interval_secs: 86400,
        },
        rate_limit: RateLimitSettings {
            enabled: false,
            authenticated_rps: 100,
            unauthenticated_rps: 10,
            burst_size: 50,
        },
        logging: LoggingConfig {
            level: "info".to_string(),
        },
    }
}

struct TestApp {
    ctx: AppContext,
    app: Router,
}

async fn setup() -> TestApp {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(":memory:")
        .await
        .unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();

    let ctx = AppContext::with_pool(pool, Arc::new(test_config()));
    let app = vellum::server::build_router(ctx.clone());
    TestApp { ctx, app }
}

/// Register a user, optionally pin a stored role, and mint a bearer token
async fn seed_session(app: &TestApp, username: &str, role: Role) -> (String, String) {
    let user = app
        .ctx
        .account_manager
        .register(
            username,
            &format!("{}@example.com", username),
            "a strong passphrase",
        )
        .await
        .unwrap();

    sqlx::query("UPDATE users SET role = ? WHERE id = ?")
        .bind(role.as_str())
        .bind(&user.id)
        .execute(&app.ctx.db)
        .await
        .unwrap();

    let session = app.ctx.account_manager.create_session(&user.id).await.unwrap();
    (user.id, session.access_token)
}

async fn send(
    app: &TestApp,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
    };
    (status, json)
}

#[tokio::test]
async fn role_change_requires_super_admin() {
    let app = setup().await;
    let (_admin_id, admin_token) = seed_session(&app, "admin", Role::Admin).await;
    let (target_id, _) = seed_session(&app, "target", Role::User).await;

    let (status, body) = send(
        &app,
        "PATCH",
        &format!("/admin/users/{}/role", target_id),
        Some(&admin_token),
        Some(serde_json::json!({"role": "editor"})),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "insufficient_role");
}

#[tokio::test]
async fn bootstrap_admin_promotes_user() {
    let app = setup().await;
    // "root" is in the configured admin emails and acts as super_admin
    let (_root_id, root_token) = seed_session(&app, "root", Role::User).await;
    let (target_id, _) = seed_session(&app, "target", Role::User).await;

    let (status, body) = send(
        &app,
        "PATCH",
        &format!("/admin/users/{}/role", target_id),
        Some(&root_token),
        Some(serde_json::json!({"role": "editor", "reason": "joining the team"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role"], "editor");

    let (status, body) = send(
        &app,
        "GET",
        &format!("/admin/users/{}/role-history", target_id),
        Some(&root_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["history"].as_array().unwrap().len(), 1);
    assert_eq!(body["history"][0]["new_role"], "editor");
}

#[tokio::test]
async fn self_role_change_is_forbidden() {
    let app = setup().await;
    let (root_id, root_token) = seed_session(&app, "root", Role::SuperAdmin).await;

    let (status, body) = send(
        &app,
        "PATCH",
        &format!("/admin/users/{}/role", root_id),
        Some(&root_token),
        Some(serde_json::json!({"role": "admin"})),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "self_action_forbidden");
}

#[tokio::test]
async fn demoting_last_super_admin_is_forbidden() {
    let app = setup().await;
    let (_root_id, root_token) = seed_session(&app, "root", Role::User).await;
    let (target_id, _) = seed_session(&app, "target", Role::SuperAdmin).await;

    let (status, body) = send(
        &app,
        "PATCH",
        &format!("/admin/users/{}/role", target_id),
        Some(&root_token),
        Some(serde_json::json!({"role": "admin"})),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "last_super_admin_violation");
}

#[tokio::test]
async fn unknown_user_is_404() {
    let app = setup().await;
    let (_root_id, root_token) = seed_session(&app, "root", Role::User).await;

    let (status, _) = send(
        &app,
        "PATCH",
        "/admin/users/no-such-user/role",
        Some(&root_token),
        Some(serde_json::json!({"role": "editor"})),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn bulk_answers_200_with_partial_failure() {
    let app = setup().await;
    let (_root_id, root_token) = seed_session(&app, "root", Role::User).await;
    let (_editor_id, editor_token) = seed_session(&app, "editor", Role::Editor).await;

    // Editor drafts and submits a post
    let (status, post) = send(
        &app,
        "POST",
        "/posts",
        Some(&editor_token),
        Some(serde_json::json!({"title": "A post", "body": "Body"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let post_id = post["id"].as_str().unwrap().to_string();

    let (status, _) = send(
        &app,
        "POST",
        &format!("/content/{}/submit-review", post_id),
        Some(&editor_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Reject the real post and a bogus id in one batch
    let (status, body) = send(
        &app,
        "POST",
        "/moderation/bulk",
        Some(&root_token),
        Some(serde_json::json!({
            "action": "reject",
            "ids": [post_id, "nonexistent"],
            "feedback": "not up to standard",
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);
    assert_eq!(body["successful"], 1);
    assert_eq!(body["failed"], 1);
    assert_eq!(body["results"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn short_feedback_is_400_and_invalid_transition_is_409() {
    let app = setup().await;
    let (_root_id, root_token) = seed_session(&app, "root", Role::User).await;
    let (_editor_id, editor_token) = seed_session(&app, "editor", Role::Editor).await;

    let (_, post) = send(
        &app,
        "POST",
        "/posts",
        Some(&editor_token),
        Some(serde_json::json!({"title": "A post", "body": "Body"})),
    )
    .await;
    let post_id = post["id"].as_str().unwrap().to_string();

    send(
        &app,
        "POST",
        &format!("/content/{}/submit-review", post_id),
        Some(&editor_token),
        None,
    )
    .await;

    // Short feedback
    let (status, body) = send(
        &app,
        "POST",
        &format!("/content/{}/reject", post_id),
        Some(&root_token),
        Some(serde_json::json!({"feedback": "meh"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_request");

    // Archive from under_review is not a valid edge
    let (status, body) = send(
        &app,
        "POST",
        &format!("/content/{}/archive", post_id),
        Some(&root_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "not_pending_for_action");
}

#[tokio::test]
async fn guest_comments_queue_for_moderation() {
    let app = setup().await;
    let (_root_id, root_token) = seed_session(&app, "root", Role::User).await;
    let (_editor_id, editor_token) = seed_session(&app, "editor", Role::Editor).await;

    let (_, post) = send(
        &app,
        "POST",
        "/posts",
        Some(&editor_token),
        Some(serde_json::json!({"title": "A post", "body": "Body"})),
    )
    .await;
    let post_id = post["id"].as_str().unwrap().to_string();
    send(
        &app,
        "POST",
        &format!("/content/{}/submit-review", post_id),
        Some(&editor_token),
        None,
    )
    .await;
    send(
        &app,
        "POST",
        &format!("/content/{}/approve", post_id),
        Some(&root_token),
        None,
    )
    .await;

    // Anonymous guest comment enters pending
    let (status, comment) = send(
        &app,
        "POST",
        &format!("/posts/{}/comments", post_id),
        None,
        Some(serde_json::json!({"body": "first!", "guest_name": "visitor"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(comment["status"], "pending");

    let (status, queue) = send(&app, "GET", "/moderation/comments", Some(&root_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(queue["count"], 1);
}

#[tokio::test]
async fn audit_trail_requires_admin_rank() {
    let app = setup().await;
    let (_user_id, user_token) = seed_session(&app, "someone", Role::User).await;
    let (_root_id, root_token) = seed_session(&app, "root", Role::User).await;

    // Plain users are turned away at the staff gate
    let (status, _) = send(&app, "GET", "/audit/events", Some(&user_token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app, "GET", "/audit/events", Some(&root_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["events"].is_array());

    let (status, body) = send(&app, "GET", "/audit/stats?days=7", Some(&root_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["stats"]["total"].is_number());
}
