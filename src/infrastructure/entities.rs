//! Database entities

use chrono::{DateTime, Utc};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct AuthToken {
    pub key: String,
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct Assistant {
    pub id: i64,
    pub name: String,
    pub remote_id: String,
    pub company_name: String,
    pub instructions: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub query_count: u32,
    pub files: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct Chat {
    pub id: i64,
    pub assistant_id: Option<i64>,
    pub thread_id: Option<String>,
    pub input: String,
    pub output: String,
}

/// Row data for an assistant that does not have an id yet.
#[derive(Debug, Clone)]
pub struct NewAssistant {
    pub name: String,
    pub remote_id: String,
    pub company_name: String,
    pub instructions: String,
    pub files: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewChat {
    pub assistant_id: Option<i64>,
    pub thread_id: Option<String>,
    pub input: String,
    pub output: String,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}
