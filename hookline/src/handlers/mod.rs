//! HTTP routes

pub mod logs;

use axum::{
    routing::{get, post},
    Router,
};

use crate::{health, state::AppState, webhook};

/// Build the service router
///
/// Middleware is applied by [`Server::serve`](crate::server::Server::serve).
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::readiness))
        .route("/logs", get(logs::recent_logs))
        .route("/logs/rotate", post(logs::rotate_logs))
        .route("/webhook", get(webhook::verify).post(webhook::receive))
        .with_state(state)
}
