use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::auth::{
    repo::{CredentialStore, StoreError},
    repo_types::{NewUser, Session, SessionOwner, User, UserSummary},
};

#[derive(Default)]
struct Tables {
    next_id: i64,
    users: Vec<User>,
    sessions: Vec<Session>,
}

/// Mutex-guarded tables standing in for Postgres in tests.
#[derive(Default)]
pub struct MemoryCredentialStore {
    tables: Mutex<Tables>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a fully formed row, bypassing signup.
    pub fn seed_user(&self, mut user: User) -> User {
        let mut t = self.tables.lock().unwrap();
        t.next_id += 1;
        user.id = t.next_id;
        t.users.push(user.clone());
        user
    }

    pub fn sessions_for(&self, user_id: i64) -> Vec<Session> {
        let t = self.tables.lock().unwrap();
        t.sessions.iter().filter(|s| s.user_id == user_id).cloned().collect()
    }

    pub fn session_count(&self) -> usize {
        self.tables.lock().unwrap().sessions.len()
    }
}

fn find_user<'a>(
    t: &'a mut Tables,
    pred: impl Fn(&User) -> bool,
) -> Result<&'a mut User, StoreError> {
    t.users.iter_mut().find(|u| pred(u)).ok_or(StoreError::NotFound)
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError> {
        let mut t = self.tables.lock().unwrap();
        if t.users.iter().any(|u| u.email == user.email) {
            return Err(StoreError::DuplicateEmail);
        }
        t.next_id += 1;
        let row = User {
            id: t.next_id,
            name: user.name,
            email: user.email,
            password_hash: user.password_hash,
            is_activated: false,
            activation_token: user.activation_token,
            created_at: OffsetDateTime::now_utc(),
        };
        t.users.push(row.clone());
        Ok(row)
    }

    async fn user_by_id(&self, id: i64) -> Result<User, StoreError> {
        let mut t = self.tables.lock().unwrap();
        find_user(&mut t, |u| u.id == id).map(|u| u.clone())
    }

    async fn user_by_email(&self, email: &str) -> Result<User, StoreError> {
        let mut t = self.tables.lock().unwrap();
        find_user(&mut t, |u| u.email == email).map(|u| u.clone())
    }

    async fn user_by_activation_token(&self, token: &str) -> Result<User, StoreError> {
        let mut t = self.tables.lock().unwrap();
        find_user(&mut t, |u| u.activation_token == token).map(|u| u.clone())
    }

    async fn update_password_hash(&self, id: i64, password_hash: &str) -> Result<(), StoreError> {
        let mut t = self.tables.lock().unwrap();
        find_user(&mut t, |u| u.id == id)?.password_hash = password_hash.to_string();
        Ok(())
    }

    async fn activate_user(&self, id: i64) -> Result<bool, StoreError> {
        let mut t = self.tables.lock().unwrap();
        let user = find_user(&mut t, |u| u.id == id)?;
        if user.is_activated {
            return Ok(false);
        }
        user.is_activated = true;
        user.activation_token.clear();
        Ok(true)
    }

    async fn delete_user(&self, id: i64) -> Result<(), StoreError> {
        let mut t = self.tables.lock().unwrap();
        let before = t.users.len();
        t.users.retain(|u| u.id != id);
        if t.users.len() == before {
            return Err(StoreError::NotFound);
        }
        t.sessions.retain(|s| s.user_id != id);
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<UserSummary>, StoreError> {
        let t = self.tables.lock().unwrap();
        Ok(t.users.iter().map(UserSummary::from).collect())
    }

    async fn upsert_session(&self, session: &Session) -> Result<(), StoreError> {
        let mut t = self.tables.lock().unwrap();
        t.sessions.retain(|s| s.user_id != session.user_id);
        t.sessions.push(session.clone());
        Ok(())
    }

    async fn delete_session_by_token(&self, token: &str) -> Result<(), StoreError> {
        self.tables.lock().unwrap().sessions.retain(|s| s.token != token);
        Ok(())
    }

    async fn delete_sessions_by_user(&self, user_id: i64) -> Result<u64, StoreError> {
        let mut t = self.tables.lock().unwrap();
        let before = t.sessions.len();
        t.sessions.retain(|s| s.user_id != user_id);
        Ok((before - t.sessions.len()) as u64)
    }

    async fn session_owner(&self, token: &str) -> Result<SessionOwner, StoreError> {
        let t = self.tables.lock().unwrap();
        t.sessions
            .iter()
            .find(|s| s.token == token)
            .map(|s| SessionOwner { user_id: s.user_id, expires_at: s.expires_at })
            .ok_or(StoreError::NotFound)
    }
}

/// Wraps the memory store and stalls after the reads and deletes that a
/// check-then-write flow depends on, so concurrent callers overlap there.
pub struct LaggyStore {
    inner: Arc<MemoryCredentialStore>,
    lag: Duration,
}

impl LaggyStore {
    pub fn new(inner: Arc<MemoryCredentialStore>, lag: Duration) -> Self {
        Self { inner, lag }
    }
}

#[async_trait]
impl CredentialStore for LaggyStore {
    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError> {
        self.inner.insert_user(user).await
    }

    async fn user_by_id(&self, id: i64) -> Result<User, StoreError> {
        self.inner.user_by_id(id).await
    }

    async fn user_by_email(&self, email: &str) -> Result<User, StoreError> {
        self.inner.user_by_email(email).await
    }

    async fn user_by_activation_token(&self, token: &str) -> Result<User, StoreError> {
        let user = self.inner.user_by_activation_token(token).await;
        tokio::time::sleep(self.lag).await;
        user
    }

    async fn update_password_hash(&self, id: i64, password_hash: &str) -> Result<(), StoreError> {
        self.inner.update_password_hash(id, password_hash).await
    }

    async fn activate_user(&self, id: i64) -> Result<bool, StoreError> {
        self.inner.activate_user(id).await
    }

    async fn delete_user(&self, id: i64) -> Result<(), StoreError> {
        self.inner.delete_user(id).await
    }

    async fn list_users(&self) -> Result<Vec<UserSummary>, StoreError> {
        self.inner.list_users().await
    }

    async fn upsert_session(&self, session: &Session) -> Result<(), StoreError> {
        self.inner.upsert_session(session).await
    }

    async fn delete_session_by_token(&self, token: &str) -> Result<(), StoreError> {
        self.inner.delete_session_by_token(token).await
    }

    async fn delete_sessions_by_user(&self, user_id: i64) -> Result<u64, StoreError> {
        let removed = self.inner.delete_sessions_by_user(user_id).await;
        tokio::time::sleep(self.lag).await;
        removed
    }

    async fn session_owner(&self, token: &str) -> Result<SessionOwner, StoreError> {
        self.inner.session_owner(token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            name: "Ana".into(),
            email: email.into(),
            password_hash: "hash".into(),
            activation_token: format!("tok-{email}"),
        }
    }

    #[tokio::test]
    async fn duplicate_email_is_distinguishable() {
        let store = MemoryCredentialStore::new();
        store.insert_user(new_user("ana@x.com")).await.unwrap();
        let err = store.insert_user(new_user("ana@x.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateEmail));
    }

    #[tokio::test]
    async fn email_match_is_case_sensitive() {
        let store = MemoryCredentialStore::new();
        store.insert_user(new_user("ana@x.com")).await.unwrap();
        assert!(store.insert_user(new_user("Ana@x.com")).await.is_ok());
        assert!(matches!(store.user_by_email("ANA@x.com").await, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn upsert_keeps_one_session_per_user() {
        let store = MemoryCredentialStore::new();
        let expires_at = OffsetDateTime::now_utc();
        for token in ["first", "second"] {
            let session = Session { user_id: 7, token: token.into(), expires_at };
            store.upsert_session(&session).await.unwrap();
        }
        let sessions = store.sessions_for(7);
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].token, "second");
        assert!(matches!(store.session_owner("first").await, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn missing_rows_surface_as_not_found() {
        let store = MemoryCredentialStore::new();
        assert!(matches!(store.user_by_id(42).await, Err(StoreError::NotFound)));
        assert!(matches!(store.session_owner("nope").await, Err(StoreError::NotFound)));
        assert!(matches!(store.delete_user(42).await, Err(StoreError::NotFound)));
    }
}
