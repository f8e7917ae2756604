/// User repository
///
/// The single lookup path for user records. Everything that needs to
/// resolve a user — auth extractors, the role change coordinator, admin
/// listings — goes through here; there is no secondary user store.
use crate::db::models::User;
use crate::error::{PlatformError, PlatformResult};
use crate::governance::roles::Role;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

const USER_COLUMNS: &str =
    "id, username, email, password_hash, role, is_active, created_at, updated_at";

/// User lookup and listing queries
#[derive(Clone)]
pub struct UserRepository {
    db: SqlitePool,
}

impl UserRepository {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Find a user by id
    pub async fn find_by_id(&self, id: &str) -> PlatformResult<Option<User>> {
        let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.db)
            .await?;

        row.map(parse_user).transpose()
    }

    /// Find a user by email
    pub async fn find_by_email(&self, email: &str) -> PlatformResult<Option<User>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM users WHERE email = ?",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await?;

        row.map(parse_user).transpose()
    }

    /// Find a user by username or email
    pub async fn find_by_identifier(&self, identifier: &str) -> PlatformResult<Option<User>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM users WHERE username = ? OR email = ?",
            USER_COLUMNS
        ))
        .bind(identifier)
        .bind(identifier)
        .fetch_optional(&self.db)
        .await?;

        row.map(parse_user).transpose()
    }

    /// Require a user by id
    pub async fn get(&self, id: &str) -> PlatformResult<User> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| PlatformError::NotFound(format!("User {} not found", id)))
    }

    /// Count users currently holding a role
    pub async fn count_with_role(&self, role: Role) -> PlatformResult<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = ? AND is_active = 1")
            .bind(role.as_str())
            .fetch_one(&self.db)
            .await?;

        Ok(count)
    }

    /// List users, newest first
    pub async fn list(&self, limit: i64, offset: i64) -> PlatformResult<Vec<User>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM users ORDER BY created_at DESC LIMIT ? OFFSET ?",
            USER_COLUMNS
        ))
        .bind(limit.clamp(1, 100))
        .bind(offset.max(0))
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(parse_user).collect()
    }
}

/// Parse a user row. Shared with the role change coordinator, which reads
/// user rows inside its own transaction.
pub(crate) fn parse_user(row: sqlx::sqlite::SqliteRow) -> PlatformResult<User> {
    let role_str: String = row.get("role");
    let role = Role::from_str(&role_str)?;

    let created_at_str: String = row.get("created_at");
    let created_at = DateTime::parse_from_rfc3339(&created_at_str)
        .map_err(|e| PlatformError::Internal(format!("Invalid timestamp: {}", e)))?
        .with_timezone(&Utc);
    let updated_at_str: String = row.get("updated_at");
    let updated_at = DateTime::parse_from_rfc3339(&updated_at_str)
        .map_err(|e| PlatformError::Internal(format!("Invalid timestamp: {}", e)))?
        .with_timezone(&Utc);

    Ok(User {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        role,
        is_active: row.get("is_active"),
        created_at,
        updated_at,
    })
}
