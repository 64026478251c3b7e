use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use serde_json::json;
use tracing::instrument;

use crate::{
    auth::{
        cookies::{clear_session_cookie, session_cookie},
        dto::{
            ActivateQuery, ActivatedResponse, ChangePasswordRequest, LoginRequest, LoginResponse,
            PublicUser, SignupRequest,
        },
        error::IdentityError,
        extractors::{AuthUser, SessionToken},
        repo_types::UserSummary,
        validation::{check_password, not_blank, FieldErrors},
    },
    state::AppState,
};

const BLANK: &str = "This field cannot be blank";

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/activate", get(activate))
        .route("/login", post(login))
        .route("/logout", post(logout))
}

pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/account", get(account))
        .route("/account/password", post(change_password))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/users", get(list_users))
        .route("/admin/users/:id", delete(delete_user))
}

#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<AppState>,
    Json(mut payload): Json<SignupRequest>,
) -> Result<(StatusCode, Json<PublicUser>), IdentityError> {
    payload.name = payload.name.trim().to_string();
    payload.email = payload.email.trim().to_string();

    let user = state
        .identity
        .signup(&payload.name, &payload.email, &payload.password)
        .await?;
    Ok((StatusCode::CREATED, Json(PublicUser::from(&user))))
}

#[instrument(skip_all)]
pub async fn activate(
    State(state): State<AppState>,
    Query(q): Query<ActivateQuery>,
) -> Result<Json<ActivatedResponse>, Response> {
    match state.identity.activate(&q.token).await {
        Ok(()) => Ok(Json(ActivatedResponse { activated: true })),
        Err(IdentityError::NotFound | IdentityError::AlreadyActivated) => Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Unable to activate account" })),
        )
            .into_response()),
        Err(e) => Err(e.into_response()),
    }
}

#[instrument(skip(state, jar, payload))]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(mut payload): Json<LoginRequest>,
) -> Result<(CookieJar, Json<LoginResponse>), IdentityError> {
    payload.email = payload.email.trim().to_string();

    let mut errors = FieldErrors::new();
    errors.check(not_blank(&payload.email), "email", BLANK);
    errors.check(not_blank(&payload.password), "password", BLANK);
    if !errors.valid() {
        return Err(IdentityError::Validation(errors));
    }

    let session = state
        .identity
        .authenticate(&payload.email, &payload.password)
        .await
        .map_err(IdentityError::for_login)?;
    let user = state.identity.resolve_user(&session.token).await?;

    let cfg = &state.config.session;
    let jar = jar.add(session_cookie(
        &cfg.cookie_name,
        &session.token,
        session.expires_at,
        cfg.cookie_secure,
    ));
    Ok((
        jar,
        Json(LoginResponse {
            user: PublicUser::from(&user),
            expires_at: session.expires_at,
        }),
    ))
}

#[instrument(skip_all)]
pub async fn logout(
    State(state): State<AppState>,
    SessionToken(token): SessionToken,
    jar: CookieJar,
) -> Result<(CookieJar, StatusCode), IdentityError> {
    if let Some(token) = token {
        state.identity.logout(&token).await?;
    }
    let jar = jar.add(clear_session_cookie(&state.config.session.cookie_name));
    Ok((jar, StatusCode::NO_CONTENT))
}

pub async fn account(AuthUser(user): AuthUser) -> Json<PublicUser> {
    Json(PublicUser::from(&user))
}

#[instrument(skip_all)]
pub async fn change_password(
    State(state): State<AppState>,
    SessionToken(token): SessionToken,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<StatusCode, IdentityError> {
    let token = token.ok_or(IdentityError::Unauthenticated)?;

    let mut errors = FieldErrors::new();
    errors.check(not_blank(&payload.current_password), "currentPassword", BLANK);
    errors.check(
        not_blank(&payload.new_password_confirmation),
        "newPasswordConfirmation",
        BLANK,
    );
    errors.check(
        payload.new_password == payload.new_password_confirmation,
        "newPasswordConfirmation",
        "Passwords do not match",
    );
    if !errors.valid() {
        // Report the strength rule alongside the form errors in one pass.
        check_password(&mut errors, "newPassword", &payload.new_password);
        return Err(IdentityError::Validation(errors));
    }

    state.identity.change_password(&token, &payload.new_password).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip_all)]
pub async fn list_users(
    State(state): State<AppState>,
    SessionToken(token): SessionToken,
) -> Result<Json<Vec<UserSummary>>, IdentityError> {
    let users = state
        .identity
        .list_users(token.as_deref().unwrap_or_default())
        .await?;
    Ok(Json(users))
}

#[instrument(skip(state, token))]
pub async fn delete_user(
    State(state): State<AppState>,
    SessionToken(token): SessionToken,
    Path(id): Path<i64>,
) -> Result<StatusCode, IdentityError> {
    state
        .identity
        .delete_user(token.as_deref().unwrap_or_default(), id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
