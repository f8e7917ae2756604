/// Account manager implementation using runtime queries
use crate::{
    account::ValidatedSession,
    config::ServerConfig,
    db::models::{Session, User},
    error::{PlatformError, PlatformResult},
    governance::roles::Role,
    users::UserRepository,
};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, SaltString},
    Argon2, PasswordHasher, PasswordVerifier,
};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;
use uuid::Uuid;

const TOKEN_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const TOKEN_LENGTH: usize = 48;

/// Account manager service
pub struct AccountManager {
    db: SqlitePool,
    users: UserRepository,
    config: Arc<ServerConfig>,
}

impl AccountManager {
    /// Create a new account manager
    pub fn new(db: SqlitePool, users: UserRepository, config: Arc<ServerConfig>) -> Self {
        Self { db, users, config }
    }

    /// Register a new user. Everyone starts at the `user` role; authority is
    /// only ever granted through the role change coordinator.
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> PlatformResult<User> {
        self.validate_username(username)?;

        if self.users.find_by_identifier(username).await?.is_some() {
            return Err(PlatformError::Conflict(format!(
                "Username {} already taken",
                username
            )));
        }
        if self.users.find_by_email(email).await?.is_some() {
            return Err(PlatformError::Conflict(
                "Email already registered".to_string(),
            ));
        }

        let password_hash = Self::hash_password(password)?;

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4().to_string(),
            username: username.to_string(),
            email: email.to_string(),
            password_hash,
            role: Role::User,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            "INSERT INTO users (id, username, email, password_hash, role, is_active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(&user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(user.is_active)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.db)
        .await
        .map_err(PlatformError::Database)?;

        Ok(user)
    }

    /// Authenticate and create a session
    pub async fn login(&self, identifier: &str, password: &str) -> PlatformResult<(User, Session)> {
        let user = self
            .users
            .find_by_identifier(identifier)
            .await?
            .ok_or_else(|| {
                PlatformError::Authentication("Invalid credentials".to_string())
            })?;

        if !user.is_active {
            return Err(PlatformError::AccountDisabled(
                "Account has been deactivated".to_string(),
            ));
        }

        if !Self::verify_password(password, &user.password_hash) {
            return Err(PlatformError::Authentication(
                "Invalid credentials".to_string(),
            ));
        }

        let session = self.create_session(&user.id).await?;

        Ok((user, session))
    }

    /// Create a session for a user
    pub async fn create_session(&self, user_id: &str) -> PlatformResult<Session> {
        let now = Utc::now();
        let expires_at = now + Duration::seconds(self.config.authentication.session_ttl);

        let session = Session {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            access_token: Self::generate_token(),
            refresh_token: Self::generate_token(),
            created_at: now,
            expires_at,
        };

        sqlx::query(
            "INSERT INTO sessions (id, user_id, access_token, refresh_token, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(&session.id)
        .bind(&session.user_id)
        .bind(&session.access_token)
        .bind(&session.refresh_token)
        .bind(now.to_rfc3339())
        .bind(expires_at.to_rfc3339())
        .execute(&self.db)
        .await?;

        Ok(session)
    }

    /// Validate an access token and return the session it belongs to
    pub async fn validate_access_token(&self, token: &str) -> PlatformResult<ValidatedSession> {
        let row = sqlx::query("SELECT id, user_id, expires_at FROM sessions WHERE access_token = ?1")
            .bind(token)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| PlatformError::Authentication("Invalid access token".to_string()))?;

        let expires_at_str: String = row.get("expires_at");
        let expires_at = DateTime::parse_from_rfc3339(&expires_at_str)
            .map_err(|e| PlatformError::Internal(format!("Invalid timestamp: {}", e)))?
            .with_timezone(&Utc);

        if expires_at < Utc::now() {
            return Err(PlatformError::Authentication(
                "Session has expired".to_string(),
            ));
        }

        Ok(ValidatedSession {
            user_id: row.get("user_id"),
            session_id: row.get("id"),
        })
    }

    /// Exchange a refresh token for a fresh session
    pub async fn refresh_session(&self, refresh_token: &str) -> PlatformResult<(User, Session)> {
        let row = sqlx::query("SELECT id, user_id FROM sessions WHERE refresh_token = ?1")
            .bind(refresh_token)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| PlatformError::Authentication("Invalid refresh token".to_string()))?;

        let session_id: String = row.get("id");
        let user_id: String = row.get("user_id");

        // One-shot refresh: the old session is replaced
        sqlx::query("DELETE FROM sessions WHERE id = ?1")
            .bind(&session_id)
            .execute(&self.db)
            .await?;

        let user = self.users.get(&user_id).await?;
        if !user.is_active {
            return Err(PlatformError::AccountDisabled(
                "Account has been deactivated".to_string(),
            ));
        }

        let session = self.create_session(&user_id).await?;
        Ok((user, session))
    }

    /// Delete expired sessions, returning the number removed
    pub async fn cleanup_expired_sessions(&self) -> PlatformResult<u64> {
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query("DELETE FROM sessions WHERE expires_at < ?1")
            .bind(&now)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected())
    }

    fn validate_username(&self, username: &str) -> PlatformResult<()> {
        if username.len() < 3 || username.len() > 32 {
            return Err(PlatformError::Validation(
                "Username must be between 3 and 32 characters".to_string(),
            ));
        }
        if !username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(PlatformError::Validation(
                "Username may only contain letters, digits, '_' and '-'".to_string(),
            ));
        }
        Ok(())
    }

    fn hash_password(password: &str) -> PlatformResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| PlatformError::Internal(format!("Password hashing failed: {}", e)))
    }

    fn verify_password(password: &str, hash: &str) -> bool {
        PasswordHash::new(hash)
            .map(|parsed| {
                Argon2::default()
                    .verify_password(password.as_bytes(), &parsed)
                    .is_ok()
            })
            .unwrap_or(false)
    }

    fn generate_token() -> String {
        let mut rng = rand::thread_rng();
        (0..TOKEN_LENGTH)
            .map(|_| {
                let idx = rng.gen_range(0..TOKEN_CHARSET.len());
                TOKEN_CHARSET[idx] as char
            })
            .collect()
    }
}
