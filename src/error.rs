/// Unified error types for the Vellum backend
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the platform
#[derive(Error, Debug)]
pub enum PlatformError {
    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Authentication errors
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Permission denials; the payload is the machine-readable reason code
    /// (e.g. "insufficient_role", "self_action_forbidden")
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Demoting the only remaining super admin
    #[error("Cannot demote the last super-admin")]
    LastSuperAdmin,

    /// Lifecycle event not valid from the item's current state
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// Conflict errors (e.g., duplicate username)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Rate limiting errors
    #[error("Rate limit exceeded")]
    RateLimitExceeded { retry_after: std::time::Duration },

    /// Account exists but has been deactivated
    #[error("Account disabled: {0}")]
    AccountDisabled(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// JSON error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Convert PlatformError to HTTP response
impl IntoResponse for PlatformError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            PlatformError::Authentication(_) => (
                StatusCode::UNAUTHORIZED,
                "authentication_required".to_string(),
                self.to_string(),
            ),
            // The reason code doubles as the response error field so clients
            // can branch on insufficient_role / self_action_forbidden without
            // parsing the message.
            PlatformError::PermissionDenied(reason) => {
                (StatusCode::FORBIDDEN, reason.clone(), self.to_string())
            }
            PlatformError::LastSuperAdmin => (
                StatusCode::FORBIDDEN,
                "last_super_admin_violation".to_string(),
                self.to_string(),
            ),
            PlatformError::InvalidTransition(_) => (
                StatusCode::CONFLICT,
                "not_pending_for_action".to_string(),
                self.to_string(),
            ),
            PlatformError::Validation(_) => (
                StatusCode::BAD_REQUEST,
                "invalid_request".to_string(),
                self.to_string(),
            ),
            PlatformError::NotFound(_) => (
                StatusCode::NOT_FOUND,
                "not_found".to_string(),
                self.to_string(),
            ),
            PlatformError::Conflict(_) => (
                StatusCode::CONFLICT,
                "conflict".to_string(),
                self.to_string(),
            ),
            PlatformError::RateLimitExceeded { .. } => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limit_exceeded".to_string(),
                "Rate limit exceeded".to_string(),
            ),
            PlatformError::AccountDisabled(_) => (
                StatusCode::FORBIDDEN,
                "account_disabled".to_string(),
                self.to_string(),
            ),
            PlatformError::Database(_) | PlatformError::Internal(_) | PlatformError::Io(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_server_error".to_string(),
                "Internal server error".to_string(), // Don't leak details
            ),
        };

        let body = Json(ErrorResponse {
            error: error_code,
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for platform operations
pub type PlatformResult<T> = Result<T, PlatformError>;
