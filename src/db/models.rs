/// Database models shared across the platform
use crate::governance::comments::CommentStatus;
use crate::governance::lifecycle::PostStatus;
use crate::governance::roles::Role;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User record in the database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Lightweight view used by the permission evaluator
    pub fn as_actor(&self) -> Actor {
        Actor {
            id: self.id.clone(),
            role: self.role,
            is_active: self.is_active,
        }
    }
}

/// The identity a governance operation runs as
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: String,
    pub role: Role,
    pub is_active: bool,
}

/// Session record in the database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Post record in the database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub author_id: String,
    pub title: String,
    pub body: String,
    pub status: PostStatus,
    pub feedback: Option<String>,
    pub resubmission_note: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Comment record in the database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub post_id: String,
    /// None for guest comments
    pub author_id: Option<String>,
    pub guest_name: Option<String>,
    pub body: String,
    pub status: CommentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
