//! Identity rules: signup with deferred activation, credential checks,
//! one live session per user, password rotation and the operator gate.
//!
//! Every collaborator is injected, so the service holds no global state and
//! is shared across requests behind an `Arc`.

use std::{sync::Arc, time::Duration};

use time::OffsetDateTime;
use tracing::{debug, error, info, instrument, warn};

use crate::auth::{
    error::IdentityError,
    notifier::Notifier,
    password::PasswordHasher,
    policy::OperatorPolicy,
    repo::{CredentialStore, StoreError},
    repo_types::{NewUser, Session, User, UserSummary},
    tokens::TokenIssuer,
    validation::{check_password, not_blank, FieldErrors},
};

const BLANK: &str = "This field cannot be blank";

pub struct IdentityService {
    store: Arc<dyn CredentialStore>,
    notifier: Arc<dyn Notifier>,
    tokens: Arc<dyn TokenIssuer>,
    hasher: PasswordHasher,
    operators: OperatorPolicy,
    session_ttl: time::Duration,
    notify_timeout: Duration,
}

impl IdentityService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        notifier: Arc<dyn Notifier>,
        tokens: Arc<dyn TokenIssuer>,
        hasher: PasswordHasher,
        operators: OperatorPolicy,
    ) -> Self {
        Self {
            store,
            notifier,
            tokens,
            hasher,
            operators,
            session_ttl: time::Duration::hours(12),
            notify_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_session_ttl(mut self, ttl: time::Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    pub fn with_notify_timeout(mut self, timeout: Duration) -> Self {
        self.notify_timeout = timeout;
        self
    }

    /// Creates an unactivated account and mails its activation link.
    ///
    /// A notifier failure removes the freshly inserted row again, so a failed
    /// signup never leaves an account that can't be activated.
    #[instrument(skip(self, password))]
    pub async fn signup(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<User, IdentityError> {
        let mut errors = FieldErrors::new();
        errors.check(not_blank(name), "name", BLANK);
        errors.check(not_blank(email), "email", BLANK);
        check_password(&mut errors, "password", password);
        if !errors.valid() {
            warn!(fields = ?errors.fields().collect::<Vec<_>>(), "signup rejected");
            return Err(IdentityError::Validation(errors));
        }

        let password_hash = self.hasher.hash(password).await.map_err(IdentityError::Internal)?;
        let activation_token = self.tokens.issue();
        let user = self
            .store
            .insert_user(NewUser {
                name: name.to_string(),
                email: email.to_string(),
                password_hash,
                activation_token: activation_token.clone(),
            })
            .await
            .map_err(|e| {
                if matches!(e, StoreError::DuplicateEmail) {
                    warn!("email already registered");
                }
                IdentityError::from(e)
            })?;

        let sent = match tokio::time::timeout(
            self.notify_timeout,
            self.notifier.send_activation(&user.email, &activation_token),
        )
        .await
        {
            Ok(res) => res,
            Err(_) => Err(anyhow::anyhow!("notifier timed out after {:?}", self.notify_timeout)),
        };
        if let Err(e) = sent {
            error!(user_id = user.id, error = %e, "activation notice failed; rolling back signup");
            if let Err(del) = self.store.delete_user(user.id).await {
                error!(user_id = user.id, error = %del, "compensating delete failed");
            }
            return Err(IdentityError::NotifierFailure(e));
        }

        info!(user_id = user.id, "user signed up");
        Ok(user)
    }

    #[instrument(skip_all)]
    pub async fn activate(&self, token: &str) -> Result<(), IdentityError> {
        // Activated rows keep an empty token; never let it match.
        if token.trim().is_empty() {
            return Err(IdentityError::NotFound);
        }
        let user = self.store.user_by_activation_token(token).await?;
        if user.is_activated || !self.store.activate_user(user.id).await? {
            warn!(user_id = user.id, "activation replayed");
            return Err(IdentityError::AlreadyActivated);
        }
        info!(user_id = user.id, "user activated");
        Ok(())
    }

    /// Verifies credentials and issues a session, replacing any prior one.
    #[instrument(skip(self, password))]
    pub async fn authenticate(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, IdentityError> {
        let user = self.store.user_by_email(email).await.map_err(|e| {
            if matches!(e, StoreError::NotFound) {
                warn!("login unknown email");
            }
            IdentityError::from(e)
        })?;

        if !user.is_activated {
            warn!(user_id = user.id, "login before activation");
            return Err(IdentityError::NotActivated);
        }

        let ok = self
            .hasher
            .verify(password, &user.password_hash)
            .await
            .map_err(IdentityError::Internal)?;
        if !ok {
            warn!(user_id = user.id, "login invalid password");
            return Err(IdentityError::InvalidCredentials);
        }

        // The upsert replaces by user, so racing logins still end with one row.
        let replaced = self.store.delete_sessions_by_user(user.id).await?;
        let session = Session {
            user_id: user.id,
            token: self.tokens.issue(),
            expires_at: OffsetDateTime::now_utc() + self.session_ttl,
        };
        self.store.upsert_session(&session).await?;

        info!(user_id = user.id, replaced, "user logged in");
        Ok(session)
    }

    /// Idempotent: unknown or blank tokens succeed without effect.
    #[instrument(skip_all)]
    pub async fn logout(&self, token: &str) -> Result<(), IdentityError> {
        if token.is_empty() {
            return Ok(());
        }
        match self.store.delete_session_by_token(token).await {
            Ok(()) | Err(StoreError::NotFound) => {
                debug!("session closed");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Maps a session token to its user. Expired sessions resolve to `NotFound`.
    #[instrument(skip_all)]
    pub async fn resolve_user(&self, token: &str) -> Result<User, IdentityError> {
        if token.is_empty() {
            return Err(IdentityError::NotFound);
        }
        let owner = self.store.session_owner(token).await?;
        if owner.expires_at <= OffsetDateTime::now_utc() {
            debug!(user_id = owner.user_id, "session expired");
            if let Err(e) = self.store.delete_session_by_token(token).await {
                warn!(error = %e, "failed to drop expired session");
            }
            return Err(IdentityError::NotFound);
        }
        Ok(self.store.user_by_id(owner.user_id).await?)
    }

    #[instrument(skip_all)]
    pub async fn change_password(
        &self,
        token: &str,
        new_password: &str,
    ) -> Result<(), IdentityError> {
        let user = self.resolve_user(token).await.map_err(unauthenticated)?;

        let mut errors = FieldErrors::new();
        check_password(&mut errors, "newPassword", new_password);
        if !errors.valid() {
            warn!(user_id = user.id, "password change rejected");
            return Err(IdentityError::Validation(errors));
        }

        let hash = self.hasher.hash(new_password).await.map_err(IdentityError::Internal)?;
        self.store
            .update_password_hash(user.id, &hash)
            .await
            .map_err(|e| unauthenticated(e.into()))?;
        info!(user_id = user.id, "password changed");
        Ok(())
    }

    /// False, not an error, when the token doesn't resolve.
    pub async fn is_operator(&self, token: &str) -> Result<bool, IdentityError> {
        match self.resolve_user(token).await {
            Ok(user) => Ok(self.operators.allows(&user)),
            Err(IdentityError::NotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn require_operator(&self, token: &str) -> Result<(), IdentityError> {
        if self.is_operator(token).await? {
            Ok(())
        } else {
            warn!("operator action refused");
            Err(IdentityError::Forbidden)
        }
    }

    #[instrument(skip_all)]
    pub async fn list_users(&self, token: &str) -> Result<Vec<UserSummary>, IdentityError> {
        self.require_operator(token).await?;
        Ok(self.store.list_users().await?)
    }

    #[instrument(skip(self, token))]
    pub async fn delete_user(&self, token: &str, id: i64) -> Result<(), IdentityError> {
        self.require_operator(token).await?;
        self.store.delete_user(id).await?;
        info!(user_id = id, "user deleted by operator");
        Ok(())
    }
}

fn unauthenticated(e: IdentityError) -> IdentityError {
    match e {
        IdentityError::NotFound => IdentityError::Unauthenticated,
        other => other,
    }
}
