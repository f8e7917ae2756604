/// Application context and dependency injection
use crate::{
    account::AccountManager,
    config::ServerConfig,
    db,
    error::PlatformResult,
    governance::{
        AuditLog, BulkOperationRunner, CommentModeration, ContentLifecycle, RoleChangeCoordinator,
    },
    rate_limit::RateLimiter,
    users::UserRepository,
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub db: SqlitePool,
    pub users: UserRepository,
    pub account_manager: Arc<AccountManager>,
    // Governance core
    pub audit: AuditLog,
    pub lifecycle: ContentLifecycle,
    pub comments: CommentModeration,
    pub role_changes: RoleChangeCoordinator,
    pub bulk: BulkOperationRunner,
    // Rate limiter
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> PlatformResult<Self> {
        // Validate configuration
        config.validate()?;

        // Create data directories if they don't exist
        Self::ensure_directories(&config).await?;

        // Initialize database
        let pool = db::create_pool(&config.storage.database, db::DatabaseOptions::default()).await?;
        db::run_migrations(&pool).await?;
        db::test_connection(&pool).await?;

        let config = Arc::new(config);

        Ok(Self::with_pool(pool, config))
    }

    /// Wire services over an existing pool. Split out so tests can provide
    /// an in-memory database.
    pub fn with_pool(pool: SqlitePool, config: Arc<ServerConfig>) -> Self {
        let users = UserRepository::new(pool.clone());
        let account_manager = Arc::new(AccountManager::new(
            pool.clone(),
            users.clone(),
            Arc::clone(&config),
        ));

        let audit = AuditLog::new(pool.clone());
        let lifecycle = ContentLifecycle::new(
            pool.clone(),
            audit.clone(),
            config.moderation.min_feedback_chars,
        );
        let comments = CommentModeration::new(
            pool.clone(),
            audit.clone(),
            config.moderation.auto_approve_comments,
        );
        let role_changes = RoleChangeCoordinator::new(pool.clone(), audit.clone());
        let bulk = BulkOperationRunner::new(
            lifecycle.clone(),
            comments.clone(),
            role_changes.clone(),
        );

        let rate_limiter = Arc::new(RateLimiter::new(&config.rate_limit));

        Self {
            config,
            db: pool,
            users,
            account_manager,
            audit,
            lifecycle,
            comments,
            role_changes,
            bulk,
            rate_limiter,
        }
    }

    /// Ensure required directories exist
    async fn ensure_directories(config: &ServerConfig) -> PlatformResult<()> {
        let dir = &config.storage.data_directory;
        if !dir.exists() {
            tokio::fs::create_dir_all(dir).await?;
        }

        Ok(())
    }

    /// Get service URL
    pub fn service_url(&self) -> String {
        format!(
            "http://{}:{}",
            self.config.service.hostname, self.config.service.port
        )
    }
}
