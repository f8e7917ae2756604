/// Background task implementations
use crate::{context::AppContext, error::PlatformResult, metrics};

/// Cleanup expired sessions
pub async fn cleanup_expired_sessions(ctx: &AppContext) -> PlatformResult<u64> {
    ctx.account_manager.cleanup_expired_sessions().await
}

/// Purge audit entries older than the configured retention window
pub async fn purge_expired_audit_entries(ctx: &AppContext) -> PlatformResult<u64> {
    let purged = ctx
        .audit
        .purge(ctx.config.retention.audit_retention_days)
        .await?;
    metrics::AUDIT_PURGED_TOTAL.inc_by(purged);

    Ok(purged)
}

/// Health check - verify the database is reachable and refresh gauges
pub async fn health_check(ctx: &AppContext) -> PlatformResult<()> {
    sqlx::query("SELECT 1").fetch_one(&ctx.db).await?;

    let active_sessions: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM sessions WHERE expires_at > ?")
            .bind(chrono::Utc::now().to_rfc3339())
            .fetch_one(&ctx.db)
            .await?;
    metrics::SESSIONS_ACTIVE.set(active_sessions);

    Ok(())
}
