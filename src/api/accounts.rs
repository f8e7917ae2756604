/// Account API endpoints
use crate::{
    account::{LoginRequest, RegisterRequest, SessionResponse},
    auth::AuthContext,
    context::AppContext,
    error::{PlatformError, PlatformResult},
    metrics,
};
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use validator::Validate;

/// Build account routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/session", get(session))
}

/// Register a new account and open a session
async fn register(
    State(ctx): State<AppContext>,
    Json(req): Json<RegisterRequest>,
) -> PlatformResult<(StatusCode, Json<SessionResponse>)> {
    req.validate()
        .map_err(|e| PlatformError::Validation(e.to_string()))?;

    let user = ctx
        .account_manager
        .register(&req.username, &req.email, &req.password)
        .await?;
    let session = ctx.account_manager.create_session(&user.id).await?;

    metrics::ACCOUNT_REGISTRATIONS_TOTAL.inc();

    Ok((
        StatusCode::CREATED,
        Json(SessionResponse {
            user_id: user.id,
            username: user.username,
            role: user.role.as_str().to_string(),
            access_token: session.access_token,
            refresh_token: session.refresh_token,
        }),
    ))
}

/// Authenticate with username/email and password
async fn login(
    State(ctx): State<AppContext>,
    Json(req): Json<LoginRequest>,
) -> PlatformResult<Json<SessionResponse>> {
    req.validate()
        .map_err(|e| PlatformError::Validation(e.to_string()))?;

    let (user, session) = ctx.account_manager.login(&req.identifier, &req.password).await?;

    Ok(Json(SessionResponse {
        user_id: user.id,
        username: user.username,
        role: user.role.as_str().to_string(),
        access_token: session.access_token,
        refresh_token: session.refresh_token,
    }))
}

#[derive(Debug, Deserialize)]
struct RefreshRequest {
    refresh_token: String,
}

/// Exchange a refresh token for a new session
async fn refresh(
    State(ctx): State<AppContext>,
    Json(req): Json<RefreshRequest>,
) -> PlatformResult<Json<SessionResponse>> {
    let (user, session) = ctx.account_manager.refresh_session(&req.refresh_token).await?;

    Ok(Json(SessionResponse {
        user_id: user.id,
        username: user.username,
        role: user.role.as_str().to_string(),
        access_token: session.access_token,
        refresh_token: session.refresh_token,
    }))
}

/// Describe the current session
async fn session(auth: AuthContext) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "user_id": auth.user.id,
        "username": auth.user.username,
        "email": auth.user.email,
        "role": auth.user.role.as_str(),
        "effective_role": auth.actor.role.as_str(),
    }))
}
