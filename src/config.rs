/// Configuration management for the Vellum backend
use crate::error::{PlatformError, PlatformResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub authentication: AuthConfig,
    pub moderation: ModerationConfig,
    pub retention: RetentionConfig,
    pub rate_limit: RateLimitSettings,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    pub version: String,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_directory: PathBuf,
    pub database: PathBuf,
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    /// Session lifetime in seconds
    pub session_ttl: i64,
    /// Emails that resolve as super_admin even without a stored role grant
    pub admin_emails: Vec<String>,
}

/// Moderation policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationConfig {
    /// Whether comments from authenticated users skip the pending queue.
    /// Guest comments always enter pending regardless of this flag.
    pub auto_approve_comments: bool,
    /// Minimum feedback length required when rejecting a post
    pub min_feedback_chars: usize,
}

/// Audit retention configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Audit entries older than this many days are purged
    pub audit_retention_days: i64,
    /// Seconds between retention sweeps
    pub purge_interval_secs: u64,
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    pub enabled: bool,
    pub authenticated_rps: u32,
    pub unauthenticated_rps: u32,
    pub burst_size: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> PlatformResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env::var("VELLUM_HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
        let port = env::var("VELLUM_PORT")
            .unwrap_or_else(|_| "8380".to_string())
            .parse()
            .map_err(|_| PlatformError::Validation("Invalid port number".to_string()))?;
        let version = env::var("VELLUM_VERSION").unwrap_or_else(|_| "0.1.0".to_string());

        let data_directory: PathBuf = env::var("VELLUM_DATA_DIRECTORY")
            .unwrap_or_else(|_| "./data".to_string())
            .into();
        let database = env::var("VELLUM_DB_LOCATION")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("vellum.sqlite"));

        let jwt_secret = env::var("VELLUM_JWT_SECRET")
            .map_err(|_| PlatformError::Validation("JWT secret required".to_string()))?;
        let session_ttl = env::var("VELLUM_SESSION_TTL_SECS")
            .unwrap_or_else(|_| "86400".to_string())
            .parse()
            .unwrap_or(86400);

        // Parse admin emails from comma-separated list
        let admin_emails = env::var("VELLUM_ADMIN_EMAILS")
            .unwrap_or_else(|_| String::new())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect::<Vec<String>>();

        let auto_approve_comments = env::var("VELLUM_AUTO_APPROVE_COMMENTS")
            .unwrap_or_else(|_| "true".to_string())
            .parse()
            .unwrap_or(true);
        let min_feedback_chars = env::var("VELLUM_MIN_FEEDBACK_CHARS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .unwrap_or(10);

        let audit_retention_days = env::var("VELLUM_AUDIT_RETENTION_DAYS")
            .unwrap_or_else(|_| "365".to_string())
            .parse()
            .unwrap_or(365);
        let purge_interval_secs = env::var("VELLUM_AUDIT_PURGE_INTERVAL_SECS")
            .unwrap_or_else(|_| "86400".to_string())
            .parse()
            .unwrap_or(86400);

        let rate_limit_enabled = env::var("VELLUM_RATE_LIMITS_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse()
            .unwrap_or(true);
        let authenticated_rps = env::var("VELLUM_RATE_LIMIT_AUTHENTICATED_RPS")
            .unwrap_or_else(|_| "100".to_string())
            .parse()
            .unwrap_or(100);
        let unauthenticated_rps = env::var("VELLUM_RATE_LIMIT_UNAUTHENTICATED_RPS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .unwrap_or(10);
        let burst_size = env::var("VELLUM_RATE_LIMIT_BURST")
            .unwrap_or_else(|_| "50".to_string())
            .parse()
            .unwrap_or(50);

        let log_level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        Ok(ServerConfig {
            service: ServiceConfig {
                hostname,
                port,
                version,
            },
            storage: StorageConfig {
                data_directory,
                database,
            },
            authentication: AuthConfig {
                jwt_secret,
                session_ttl,
                admin_emails,
            },
            moderation: ModerationConfig {
                auto_approve_comments,
                min_feedback_chars,
            },
            retention: RetentionConfig {
                audit_retention_days,
                purge_interval_secs,
            },
            rate_limit: RateLimitSettings {
                enabled: rate_limit_enabled,
                authenticated_rps,
                unauthenticated_rps,
                burst_size,
            },
            logging: LoggingConfig { level: log_level },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> PlatformResult<()> {
        if self.service.hostname.is_empty() {
            return Err(PlatformError::Validation(
                "Hostname cannot be empty".to_string(),
            ));
        }

        if self.authentication.jwt_secret.len() < 32 {
            return Err(PlatformError::Validation(
                "JWT secret must be at least 32 characters".to_string(),
            ));
        }

        if self.retention.audit_retention_days < 1 {
            return Err(PlatformError::Validation(
                "Audit retention must be at least one day".to_string(),
            ));
        }

        Ok(())
    }
}
