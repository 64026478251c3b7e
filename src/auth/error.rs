use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

use crate::auth::{repo::StoreError, validation::FieldErrors};

pub const MSG_BAD_CREDENTIALS: &str = "Invalid email or password";
pub const MSG_NOT_ACTIVATED: &str = "Please confirm your registration";
pub const MSG_EMAIL_TAKEN: &str = "Email address is already in use";

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("validation failed")]
    Validation(FieldErrors),
    #[error("email already registered")]
    DuplicateIdentity,
    #[error("not found")]
    NotFound,
    #[error("account not activated")]
    NotActivated,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("account already activated")]
    AlreadyActivated,
    #[error("not authenticated")]
    Unauthenticated,
    #[error("forbidden")]
    Forbidden,
    #[error("activation notification failed: {0}")]
    NotifierFailure(#[source] anyhow::Error),
    #[error("store failure: {0}")]
    StoreFailure(#[source] anyhow::Error),
    #[error("internal error: {0}")]
    Internal(#[source] anyhow::Error),
}

impl From<StoreError> for IdentityError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => IdentityError::NotFound,
            StoreError::DuplicateEmail => IdentityError::DuplicateIdentity,
            other => IdentityError::StoreFailure(other.into()),
        }
    }
}

impl IdentityError {
    /// Collapses login failures so callers never learn which half was wrong.
    pub fn for_login(self) -> Self {
        match self {
            IdentityError::NotFound => IdentityError::InvalidCredentials,
            other => other,
        }
    }
}

fn message(status: StatusCode, msg: &str) -> Response {
    (status, Json(json!({ "error": msg }))).into_response()
}

impl IntoResponse for IdentityError {
    fn into_response(self) -> Response {
        match self {
            IdentityError::Validation(errors) => {
                let body = Json(json!({ "errors": errors }));
                (StatusCode::UNPROCESSABLE_ENTITY, body).into_response()
            }
            IdentityError::DuplicateIdentity => {
                let mut errors = FieldErrors::new();
                errors.add("email", MSG_EMAIL_TAKEN);
                IdentityError::Validation(errors).into_response()
            }
            IdentityError::NotFound => message(StatusCode::NOT_FOUND, "Not found"),
            IdentityError::InvalidCredentials => {
                message(StatusCode::UNAUTHORIZED, MSG_BAD_CREDENTIALS)
            }
            IdentityError::NotActivated => message(StatusCode::FORBIDDEN, MSG_NOT_ACTIVATED),
            IdentityError::AlreadyActivated => {
                message(StatusCode::BAD_REQUEST, "Account already activated")
            }
            IdentityError::Unauthenticated => {
                message(StatusCode::UNAUTHORIZED, "Not authenticated")
            }
            IdentityError::Forbidden => message(StatusCode::FORBIDDEN, "Forbidden"),
            IdentityError::NotifierFailure(e) => {
                error!(error = %e, "activation notification failed");
                message(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
            IdentityError::StoreFailure(e) => {
                error!(error = %e, "store failure");
                message(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
            IdentityError::Internal(e) => {
                error!(error = %e, "internal error");
                message(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        }
    }
}
