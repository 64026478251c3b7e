use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,        // Argon2 PHC string, never exposed
    pub is_activated: bool,
    #[serde(skip_serializing)]
    pub activation_token: String,     // empty once activated
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Fields supplied by signup; the store assigns `id` and `created_at`.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub activation_token: String,
}

/// Operator-visible projection of a user.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct UserSummary {
    pub id: i64,
    pub name: String,
    pub email: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub is_activated: bool,
}

impl From<&User> for UserSummary {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            name: u.name.clone(),
            email: u.email.clone(),
            created_at: u.created_at,
            is_activated: u.is_activated,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Session {
    pub user_id: i64,
    pub token: String,
    pub expires_at: OffsetDateTime,
}

/// Owner lookup result for a session token.
#[derive(Debug, Clone, Copy, FromRow)]
pub struct SessionOwner {
    pub user_id: i64,
    pub expires_at: OffsetDateTime,
}
