//! Health check handlers

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};

use crate::state::AppState;

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Service name
    pub service: String,

    /// Version
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Readiness check response
#[derive(Debug, Serialize, Deserialize)]
pub struct ReadinessResponse {
    /// Whether the event log can be read
    pub ready: bool,

    /// Service name
    pub service: String,

    /// Entries currently held by the event log
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entries: Option<usize>,

    /// Failure reason when not ready
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Liveness probe, always 200 while the process is serving
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let response = HealthResponse {
        status: "healthy".to_string(),
        service: state.config().service.name.clone(),
        version: Some(env!("CARGO_PKG_VERSION").to_string()),
    };

    (StatusCode::OK, Json(response))
}

/// Readiness probe
///
/// 503 when the event log cannot be read.
pub async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    let service = state.config().service.name.clone();

    match state.event_log().len().await {
        Ok(entries) => (
            StatusCode::OK,
            Json(ReadinessResponse {
                ready: true,
                service,
                entries: Some(entries),
                message: None,
            }),
        ),
        Err(e) => {
            tracing::warn!("Event log not readable: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ReadinessResponse {
                    ready: false,
                    service,
                    entries: None,
                    message: Some(e.to_string()),
                }),
            )
        }
    }
}
