use std::convert::Infallible;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use axum_extra::extract::cookie::CookieJar;
use tracing::debug;

use super::{cookies::session_token, error::IdentityError, repo_types::User};
use crate::state::AppState;

/// The raw session token presented with the request, if any.
pub struct SessionToken(pub Option<String>);

#[async_trait]
impl FromRequestParts<AppState> for SessionToken {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        Ok(SessionToken(session_token(&jar, &state.config.session.cookie_name)))
    }
}

/// Resolves the session cookie to a user, rejecting with 401 otherwise.
pub struct AuthUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = IdentityError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let SessionToken(token) = SessionToken::from_request_parts(parts, state)
            .await
            .unwrap_or(SessionToken(None));
        let token = token.ok_or(IdentityError::Unauthenticated)?;

        // Which hop failed is never revealed to the client.
        match state.identity.resolve_user(&token).await {
            Ok(user) => Ok(AuthUser(user)),
            Err(IdentityError::NotFound) => {
                debug!("session did not resolve");
                Err(IdentityError::Unauthenticated)
            }
            Err(e) => Err(e),
        }
    }
}
