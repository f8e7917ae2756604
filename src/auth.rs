/// Authentication extractors and utilities
use crate::{
    account::ValidatedSession,
    api::middleware::extract_bearer_token,
    context::AppContext,
    db::models::{Actor, User},
    error::PlatformError,
    governance::audit::AuditEntry,
    governance::permissions::{self, Capability},
    governance::roles::Role,
};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

/// Authenticated context - extracts and validates a session from the request
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user: User,
    pub actor: Actor,
    pub session: ValidatedSession,
}

#[async_trait]
impl FromRequestParts<AppContext> for AuthContext {
    type Rejection = PlatformError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers).ok_or_else(|| {
            PlatformError::Authentication("Missing authorization header".to_string())
        })?;

        let session = state.account_manager.validate_access_token(&token).await?;
        let user = state.users.get(&session.user_id).await?;

        if !user.is_active {
            return Err(PlatformError::AccountDisabled(
                "Account has been deactivated".to_string(),
            ));
        }

        let actor = resolve_actor(state, &user);

        Ok(AuthContext {
            user,
            actor,
            session,
        })
    }
}

/// Optional authenticated context - does not fail if no auth provided.
/// Anonymous requests are evaluated at rank 0 by the permission evaluator.
#[derive(Debug, Clone)]
pub struct OptionalAuthContext {
    pub auth: Option<AuthContext>,
}

#[async_trait]
impl FromRequestParts<AppContext> for OptionalAuthContext {
    type Rejection = PlatformError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let auth = match AuthContext::from_request_parts(parts, state).await {
            Ok(auth) => Some(auth),
            Err(_) => None,
        };

        Ok(OptionalAuthContext { auth })
    }
}

/// Staff context - requires moderator rank or above. Accepts a normal
/// session, or an admin-scoped JWT as a break-glass path when no session
/// can be created (e.g. operational tooling).
#[derive(Debug, Clone)]
pub struct StaffAuthContext {
    pub user: User,
    pub actor: Actor,
}

#[async_trait]
impl FromRequestParts<AppContext> for StaffAuthContext {
    type Rejection = PlatformError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers).ok_or_else(|| {
            PlatformError::Authentication("Missing authorization header".to_string())
        })?;

        let (user, actor) = match state.account_manager.validate_access_token(&token).await {
            Ok(session) => {
                let user = state.users.get(&session.user_id).await?;
                let actor = resolve_actor(state, &user);
                (user, actor)
            }
            Err(_) => {
                // Session validation failed, try the admin-scoped JWT path
                tracing::debug!("staff auth: session validation failed, trying JWT");

                let token_data =
                    verify_jwt_token(&token, &state.config.authentication.jwt_secret)?;
                let claims = &token_data.claims;

                let user_id = claims
                    .get("sub")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| {
                        PlatformError::Authentication("Invalid JWT: missing 'sub' claim".to_string())
                    })?;
                let scope = claims.get("scope").and_then(|v| v.as_str());
                if scope != Some("admin") {
                    return Err(PlatformError::Authentication(
                        "JWT token does not have admin scope".to_string(),
                    ));
                }

                let user = state.users.get(user_id).await?;
                let mut actor = user.as_actor();
                actor.role = Role::SuperAdmin;
                (user, actor)
            }
        };

        if !user.is_active {
            return Err(PlatformError::AccountDisabled(
                "Account has been deactivated".to_string(),
            ));
        }

        if !actor.role.can_act_as(Role::Moderator) {
            return Err(PlatformError::PermissionDenied(
                "insufficient_role".to_string(),
            ));
        }

        Ok(StaffAuthContext { user, actor })
    }
}

/// Build the evaluation actor for a user, elevating configured bootstrap
/// admins to super_admin. The stored role is untouched; elevation exists so
/// a fresh deployment has a role-granting identity before any roles exist.
pub fn resolve_actor(state: &AppContext, user: &User) -> Actor {
    let mut actor = user.as_actor();
    if state
        .config
        .authentication
        .admin_emails
        .contains(&user.email)
    {
        actor.role = Role::SuperAdmin;
    }
    actor
}

/// Evaluate a capability with no specific resource, record the decision in
/// the audit trail, and turn denials into typed errors. Used by read-side
/// endpoints (audit views, user listings) where there is no state machine
/// to do the recording.
pub async fn require_capability(
    state: &AppContext,
    actor: &Actor,
    capability: Capability,
    action: &str,
) -> Result<(), PlatformError> {
    let decision = permissions::evaluate(Some(actor), capability, None, None);
    crate::metrics::GOVERNANCE_DECISIONS_TOTAL
        .with_label_values(&[
            capability.action_name(),
            if decision.granted { "granted" } else { "denied" },
        ])
        .inc();
    state
        .audit
        .record_best_effort(&AuditEntry::decision(
            Some(&actor.id),
            action,
            capability,
            &decision,
        ))
        .await;

    if decision.granted {
        Ok(())
    } else {
        Err(PlatformError::PermissionDenied(decision.reason.to_string()))
    }
}

/// Verify a JWT token with full validation
pub fn verify_jwt_token(
    token: &str,
    jwt_secret: &str,
) -> Result<jsonwebtoken::TokenData<serde_json::Value>, PlatformError> {
    use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

    let decoding_key = DecodingKey::from_secret(jwt_secret.as_bytes());
    let mut validation = Validation::new(Algorithm::HS256);
    // Allow some clock skew (5 minutes)
    validation.leeway = 300;

    decode::<serde_json::Value>(token, &decoding_key, &validation).map_err(|e| {
        tracing::warn!("JWT verification failed: {}", e);
        match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                PlatformError::Authentication("Token has expired".to_string())
            }
            jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                PlatformError::Authentication("Invalid token signature".to_string())
            }
            _ => PlatformError::Authentication(format!("Invalid token: {}", e)),
        }
    })
}
