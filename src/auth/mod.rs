use crate::state::AppState;
use axum::Router;

pub mod cookies;
mod dto;
pub mod error;
pub mod extractors;
pub mod handlers;
#[cfg(test)]
pub(crate) mod memory;
pub mod notifier;
pub mod password;
pub mod policy;
pub mod repo;
pub mod repo_types;
pub mod services;
pub mod tokens;
pub mod validation;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::auth_routes())
        .merge(handlers::account_routes())
        .merge(handlers::admin_routes())
}
