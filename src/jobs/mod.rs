use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::{error, info};

pub mod tasks;

use crate::metrics;

/// Job scheduler for background tasks
pub struct JobScheduler {
    context: Arc<crate::context::AppContext>,
}

impl JobScheduler {
    pub fn new(context: Arc<crate::context::AppContext>) -> Self {
        Self { context }
    }

    /// Start all background jobs
    pub fn start(self: Arc<Self>) {
        info!("Starting background job scheduler");

        tokio::spawn(Self::expired_session_cleanup_job(Arc::clone(&self)));
        tokio::spawn(Self::audit_retention_job(Arc::clone(&self)));
        tokio::spawn(Self::health_check_job(Arc::clone(&self)));

        info!("Background jobs started");
    }

    /// Cleanup expired sessions (runs every hour)
    async fn expired_session_cleanup_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(3600));

        loop {
            interval.tick().await;

            match tasks::cleanup_expired_sessions(&scheduler.context).await {
                Ok(count) => {
                    metrics::BACKGROUND_JOBS_TOTAL
                        .with_label_values(&["session_cleanup", "ok"])
                        .inc();
                    if count > 0 {
                        info!("Cleaned up {} expired sessions", count);
                    }
                }
                Err(e) => {
                    metrics::BACKGROUND_JOBS_TOTAL
                        .with_label_values(&["session_cleanup", "error"])
                        .inc();
                    error!("Failed to cleanup expired sessions: {}", e);
                }
            }
        }
    }

    /// Purge audit entries past the retention window
    async fn audit_retention_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(
            scheduler.context.config.retention.purge_interval_secs,
        ));

        loop {
            interval.tick().await;

            match tasks::purge_expired_audit_entries(&scheduler.context).await {
                Ok(count) => {
                    metrics::BACKGROUND_JOBS_TOTAL
                        .with_label_values(&["audit_retention", "ok"])
                        .inc();
                    if count > 0 {
                        info!("Purged {} audit entries past retention", count);
                    }
                }
                Err(e) => {
                    metrics::BACKGROUND_JOBS_TOTAL
                        .with_label_values(&["audit_retention", "error"])
                        .inc();
                    error!("Failed to purge audit entries: {}", e);
                }
            }
        }
    }

    /// Health check (runs every 5 minutes)
    async fn health_check_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(300));

        loop {
            interval.tick().await;

            if let Err(e) = tasks::health_check(&scheduler.context).await {
                metrics::BACKGROUND_JOBS_TOTAL
                    .with_label_values(&["health_check", "error"])
                    .inc();
                error!("Health check failed: {}", e);
            }
        }
    }
}
