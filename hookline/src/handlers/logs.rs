//! Event log inspection and maintenance endpoints

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    eventlog::LogEntry,
    state::AppState,
};

/// Query string of `GET /logs`
#[derive(Debug, Default, Deserialize)]
pub struct RecentQuery {
    /// Requested entry count, kept raw so junk falls back to the default
    pub count: Option<String>,
}

/// Query string of `POST /logs/rotate`
#[derive(Debug, Default, Deserialize)]
pub struct RotateQuery {
    /// Entries to keep
    pub keep: Option<String>,
}

/// Body of `GET /logs`
#[derive(Debug, Serialize, Deserialize)]
pub struct LogsResponse {
    pub success: bool,
    pub count: usize,
    pub logs: Vec<LogEntry>,
}

/// Body of `POST /logs/rotate`
#[derive(Debug, Serialize, Deserialize)]
pub struct RotateResponse {
    pub success: bool,
    pub removed: usize,
    pub kept: usize,
}

/// Most recent entries, oldest first
pub async fn recent_logs(
    State(state): State<AppState>,
    Query(query): Query<RecentQuery>,
) -> Result<Json<LogsResponse>> {
    let count = parse_count(query.count.as_deref());
    let logs = state.event_log().recent(count).await?;

    Ok(Json(LogsResponse {
        success: true,
        count: logs.len(),
        logs,
    }))
}

/// Trim the log to its newest `keep` entries
pub async fn rotate_logs(
    State(state): State<AppState>,
    Query(query): Query<RotateQuery>,
) -> Result<Json<RotateResponse>> {
    let keep = parse_keep(query.keep.as_deref(), state.config().event_log.default_keep)?;
    let outcome = state.event_log().rotate(keep).await?;

    Ok(Json(RotateResponse {
        success: true,
        removed: outcome.removed,
        kept: outcome.kept,
    }))
}

/// Positive integer count, or `None` to use the log's default
fn parse_count(raw: Option<&str>) -> Option<usize> {
    raw?.trim()
        .parse::<i64>()
        .ok()
        .filter(|n| *n > 0)
        .and_then(|n| usize::try_from(n).ok())
}

fn parse_keep(raw: Option<&str>, default: usize) -> Result<usize> {
    let raw = match raw.map(str::trim) {
        None | Some("") => return Ok(default),
        Some(raw) => raw,
    };

    match raw.parse::<i64>() {
        Ok(n) if n >= 0 => usize::try_from(n)
            .map_err(|_| Error::BadRequest(format!("keep is out of range: {}", n))),
        Ok(n) => Err(Error::BadRequest(format!(
            "keep must not be negative, got {}",
            n
        ))),
        Err(_) => Err(Error::BadRequest(format!(
            "keep must be a non-negative integer, got {:?}",
            raw
        ))),
    }
}
