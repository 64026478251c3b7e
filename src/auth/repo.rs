use std::{future::Future, time::Duration};

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::error;

use crate::auth::repo_types::{NewUser, Session, SessionOwner, User, UserSummary};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("email already registered")]
    DuplicateEmail,
    #[error("store call timed out")]
    Timeout,
    #[error("database error: {0}")]
    Database(sqlx::Error),
}

/// Postgres' default name for the `UNIQUE` on `users.email`.
const EMAIL_UNIQUE: &str = "users_email_key";

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::Database(ref db)
                if db.is_unique_violation() && db.constraint() == Some(EMAIL_UNIQUE) =>
            {
                StoreError::DuplicateEmail
            }
            other => StoreError::Database(other),
        }
    }
}

/// Writes aimed at one row report a miss as `NotFound`.
fn expect_row(rows_affected: u64) -> Result<(), StoreError> {
    if rows_affected == 0 {
        Err(StoreError::NotFound)
    } else {
        Ok(())
    }
}

/// Persistence for users and sessions. No business rules live here.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Fails with `DuplicateEmail` when the email is taken.
    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError>;
    async fn user_by_id(&self, id: i64) -> Result<User, StoreError>;
    async fn user_by_email(&self, email: &str) -> Result<User, StoreError>;
    async fn user_by_activation_token(&self, token: &str) -> Result<User, StoreError>;
    async fn update_password_hash(&self, id: i64, password_hash: &str) -> Result<(), StoreError>;
    /// Returns `false` when the user was already activated.
    async fn activate_user(&self, id: i64) -> Result<bool, StoreError>;
    async fn delete_user(&self, id: i64) -> Result<(), StoreError>;
    async fn list_users(&self) -> Result<Vec<UserSummary>, StoreError>;

    /// Stores `session` as the user's only session, replacing any previous one.
    async fn upsert_session(&self, session: &Session) -> Result<(), StoreError>;
    async fn delete_session_by_token(&self, token: &str) -> Result<(), StoreError>;
    async fn delete_sessions_by_user(&self, user_id: i64) -> Result<u64, StoreError>;
    async fn session_owner(&self, token: &str) -> Result<SessionOwner, StoreError>;
}

const USER_COLUMNS: &str =
    "id, name, email, password_hash, is_activated, activation_token, created_at";

#[derive(Clone)]
pub struct PgCredentialStore {
    db: PgPool,
    timeout: Duration,
}

impl PgCredentialStore {
    pub fn new(db: PgPool, timeout: Duration) -> Self {
        Self { db, timeout }
    }

    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, sqlx::Error>> + Send,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(res) => res.map_err(StoreError::from),
            Err(_) => {
                error!(op, timeout_ms = self.timeout.as_millis() as u64, "store call timed out");
                Err(StoreError::Timeout)
            }
        }
    }

    async fn user_where(
        &self,
        op: &'static str,
        column: &str,
        value: &str,
    ) -> Result<User, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = $1");
        self.bounded(op, sqlx::query_as::<_, User>(&sql).bind(value).fetch_optional(&self.db))
            .await?
            .ok_or(StoreError::NotFound)
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO users (name, email, password_hash, is_activated, activation_token)
            VALUES ($1, $2, $3, FALSE, $4)
            RETURNING {USER_COLUMNS}
            "#
        );
        self.bounded(
            "insert_user",
            sqlx::query_as::<_, User>(&sql)
                .bind(&user.name)
                .bind(&user.email)
                .bind(&user.password_hash)
                .bind(&user.activation_token)
                .fetch_one(&self.db),
        )
        .await
    }

    async fn user_by_id(&self, id: i64) -> Result<User, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let query = sqlx::query_as::<_, User>(&sql).bind(id);
        self.bounded("user_by_id", query.fetch_optional(&self.db))
            .await?
            .ok_or(StoreError::NotFound)
    }

    async fn user_by_email(&self, email: &str) -> Result<User, StoreError> {
        self.user_where("user_by_email", "email", email).await
    }

    async fn user_by_activation_token(&self, token: &str) -> Result<User, StoreError> {
        self.user_where("user_by_activation_token", "activation_token", token).await
    }

    async fn update_password_hash(&self, id: i64, password_hash: &str) -> Result<(), StoreError> {
        let res = self
            .bounded(
                "update_password_hash",
                sqlx::query("UPDATE users SET password_hash = $1 WHERE id = $2")
                    .bind(password_hash)
                    .bind(id)
                    .execute(&self.db),
            )
            .await?;
        expect_row(res.rows_affected())
    }

    async fn activate_user(&self, id: i64) -> Result<bool, StoreError> {
        let res = self
            .bounded(
                "activate_user",
                sqlx::query(
                    r#"
                    UPDATE users
                       SET is_activated = TRUE, activation_token = ''
                     WHERE id = $1 AND is_activated = FALSE
                    "#,
                )
                .bind(id)
                .execute(&self.db),
            )
            .await?;
        Ok(res.rows_affected() == 1)
    }

    async fn delete_user(&self, id: i64) -> Result<(), StoreError> {
        let res = self
            .bounded(
                "delete_user",
                sqlx::query("DELETE FROM users WHERE id = $1").bind(id).execute(&self.db),
            )
            .await?;
        expect_row(res.rows_affected())
    }

    async fn list_users(&self) -> Result<Vec<UserSummary>, StoreError> {
        self.bounded(
            "list_users",
            sqlx::query_as::<_, UserSummary>(
                r#"
                SELECT id, name, email, created_at, is_activated
                  FROM users
                 ORDER BY id ASC
                "#,
            )
            .fetch_all(&self.db),
        )
        .await
    }

    async fn upsert_session(&self, session: &Session) -> Result<(), StoreError> {
        self.bounded(
            "upsert_session",
            sqlx::query(
                r#"
                INSERT INTO sessions (user_id, token, expires_at)
                VALUES ($1, $2, $3)
                ON CONFLICT (user_id)
                DO UPDATE SET token = EXCLUDED.token, expires_at = EXCLUDED.expires_at
                "#,
            )
            .bind(session.user_id)
            .bind(&session.token)
            .bind(session.expires_at)
            .execute(&self.db),
        )
        .await?;
        Ok(())
    }

    async fn delete_session_by_token(&self, token: &str) -> Result<(), StoreError> {
        self.bounded(
            "delete_session_by_token",
            sqlx::query("DELETE FROM sessions WHERE token = $1").bind(token).execute(&self.db),
        )
        .await?;
        Ok(())
    }

    async fn delete_sessions_by_user(&self, user_id: i64) -> Result<u64, StoreError> {
        let res = self
            .bounded(
                "delete_sessions_by_user",
                sqlx::query("DELETE FROM sessions WHERE user_id = $1")
                    .bind(user_id)
                    .execute(&self.db),
            )
            .await?;
        Ok(res.rows_affected())
    }

    async fn session_owner(&self, token: &str) -> Result<SessionOwner, StoreError> {
        self.bounded(
            "session_owner",
            sqlx::query_as::<_, SessionOwner>(
                "SELECT user_id, expires_at FROM sessions WHERE token = $1",
            )
            .bind(token)
            .fetch_optional(&self.db),
        )
        .await?
        .ok_or(StoreError::NotFound)
    }
}
