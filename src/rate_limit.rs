/// Rate limiting
use crate::{
    api::middleware::extract_bearer_token,
    config::RateLimitSettings,
    context::AppContext,
    error::{PlatformError, PlatformResult},
};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorLimiter,
};
use std::{num::NonZeroU32, sync::Arc};

/// Rate limiter manager
#[derive(Clone)]
pub struct RateLimiter {
    enabled: bool,
    authenticated: Arc<GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    unauthenticated: Arc<GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl RateLimiter {
    pub fn new(settings: &RateLimitSettings) -> Self {
        let auth_quota = Quota::per_second(
            NonZeroU32::new(settings.authenticated_rps).unwrap_or(NonZeroU32::new(100).unwrap()),
        )
        .allow_burst(NonZeroU32::new(settings.burst_size).unwrap_or(NonZeroU32::new(50).unwrap()));

        let unauth_quota = Quota::per_second(
            NonZeroU32::new(settings.unauthenticated_rps).unwrap_or(NonZeroU32::new(10).unwrap()),
        )
        .allow_burst(
            NonZeroU32::new(settings.burst_size / 5).unwrap_or(NonZeroU32::new(10).unwrap()),
        );

        Self {
            enabled: settings.enabled,
            authenticated: Arc::new(GovernorLimiter::direct(auth_quota)),
            unauthenticated: Arc::new(GovernorLimiter::direct(unauth_quota)),
        }
    }

    /// Check rate limit for an authenticated request
    pub fn check_authenticated(&self) -> PlatformResult<()> {
        if !self.enabled {
            return Ok(());
        }
        match self.authenticated.check() {
            Ok(_) => Ok(()),
            Err(_) => Err(PlatformError::RateLimitExceeded {
                retry_after: std::time::Duration::from_secs(1),
            }),
        }
    }

    /// Check rate limit for an unauthenticated request
    pub fn check_unauthenticated(&self) -> PlatformResult<()> {
        if !self.enabled {
            return Ok(());
        }
        match self.unauthenticated.check() {
            Ok(_) => Ok(()),
            Err(_) => Err(PlatformError::RateLimitExceeded {
                retry_after: std::time::Duration::from_secs(1),
            }),
        }
    }
}

/// Rate limiting middleware. Requests carrying a bearer token get the
/// authenticated quota; everything else shares the tighter anonymous one.
pub async fn rate_limit_middleware(
    State(ctx): State<AppContext>,
    req: Request,
    next: Next,
) -> Result<Response, PlatformError> {
    if extract_bearer_token(req.headers()).is_some() {
        ctx.rate_limiter.check_authenticated()?;
    } else {
        ctx.rate_limiter.check_unauthenticated()?;
    }

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(enabled: bool, rps: u32) -> RateLimitSettings {
        RateLimitSettings {
            enabled,
            authenticated_rps: rps,
            unauthenticated_rps: rps,
            burst_size: rps,
        }
    }

    #[test]
    fn test_disabled_limiter_always_allows() {
        let limiter = RateLimiter::new(&settings(false, 1));
        for _ in 0..100 {
            assert!(limiter.check_unauthenticated().is_ok());
        }
    }

    #[test]
    fn test_burst_exhaustion_rejects() {
        let limiter = RateLimiter::new(&settings(true, 5));
        // Burst for the unauthenticated tier is burst_size / 5 = 1
        assert!(limiter.check_unauthenticated().is_ok());
        assert!(limiter.check_unauthenticated().is_err());
    }
}
