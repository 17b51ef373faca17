//! Event log: the public API over an [`EventStore`]
//!
//! `EventLog` is what the webhook intake and the Graph API client hold. It
//! validates entries, echoes a tagged summary through `tracing`, and keeps
//! store failures away from callers that are merely trying to log.

use serde_json::{json, Value};
use std::sync::Arc;

use super::entry::{ErrorDetails, EventKind, LogEntry};
use super::storage::{EventStore, FileEventStore, MemoryEventStore, RotateOutcome};
use crate::config::EventLogConfig;
use crate::error::{Error, Result};

/// Entries returned by [`EventLog::recent`] when no usable count is given
pub const DEFAULT_RECENT_COUNT: usize = 50;

/// Handle to the webhook event log
///
/// Cheap to clone; all clones share the same store.
#[derive(Clone)]
pub struct EventLog {
    store: Arc<dyn EventStore>,
    default_count: usize,
    request_id: Option<Arc<str>>,
}

impl std::fmt::Debug for EventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLog")
            .field("default_count", &self.default_count)
            .field("request_id", &self.request_id)
            .finish_non_exhaustive()
    }
}

impl EventLog {
    /// Create an event log over the given store
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self {
            store,
            default_count: DEFAULT_RECENT_COUNT,
            request_id: None,
        }
    }

    /// Event log backed by a fresh in-memory store
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryEventStore::new()))
    }

    /// Build the event log described by configuration
    ///
    /// Uses a [`FileEventStore`] when a path is configured, memory otherwise.
    pub async fn from_config(config: &EventLogConfig) -> Result<Self> {
        let log = match config.path {
            Some(ref path) => {
                let mut store = FileEventStore::open(path).await?;
                if let Some(ref dir) = config.archive_dir {
                    store = store.with_archive_dir(dir);
                }
                tracing::info!("Webhook event log at {}", path.display());
                Self::new(Arc::new(store))
            }
            None => {
                tracing::warn!("No event log path configured, webhook events kept in memory");
                Self::in_memory()
            }
        };
        Ok(log.with_default_count(config.default_count))
    }

    /// Override the count used when `recent` gets no usable count
    pub fn with_default_count(mut self, count: usize) -> Self {
        self.default_count = count.max(1);
        self
    }

    /// Count used when `recent` gets no usable count
    pub fn default_count(&self) -> usize {
        self.default_count
    }

    /// Handle that stamps `request_id` into the metadata of every entry it appends
    ///
    /// Shares the store with `self`.
    pub fn with_request_id(&self, request_id: impl Into<String>) -> Self {
        Self {
            request_id: Some(Arc::from(request_id.into())),
            ..self.clone()
        }
    }

    /// Correlation id stamped by this handle, if any
    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    /// Append an entry
    ///
    /// Fails only for malformed entries. Store failures are reported through
    /// `tracing` and swallowed.
    pub async fn append(&self, mut entry: LogEntry) -> Result<()> {
        validate(&entry)?;
        if let Some(ref id) = self.request_id {
            stamp_request_id(&mut entry, id);
        }
        emit_summary(&entry);

        if let Err(e) = self.store.append(&entry).await {
            tracing::error!(
                kind = entry.kind.as_str(),
                "Failed to persist webhook log entry: {}",
                e
            );
        }
        Ok(())
    }

    /// Append an untyped JSON entry
    ///
    /// The document needs a recognised `type`; `timestamp` is filled in when
    /// missing.
    pub async fn append_json(&self, value: Value) -> Result<()> {
        let entry = LogEntry::from_value(value)?;
        self.append(entry).await
    }

    /// The last `count` entries, oldest first
    ///
    /// `None` and `Some(0)` fall back to the default count.
    pub async fn recent(&self, count: Option<usize>) -> Result<Vec<LogEntry>> {
        let count = match count {
            Some(n) if n > 0 => n,
            _ => self.default_count,
        };
        self.store.recent(count).await
    }

    /// Keep only the most recent `keep` entries
    pub async fn rotate(&self, keep: usize) -> Result<RotateOutcome> {
        let outcome = self.store.rotate(keep).await?;
        tracing::info!(
            removed = outcome.removed,
            kept = outcome.kept,
            "Rotated webhook event log"
        );
        Ok(outcome)
    }

    /// Number of stored entries
    pub async fn len(&self) -> Result<usize> {
        self.store.len().await
    }

    /// Whether the log holds no entries
    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Record an outbound API request
    pub async fn record_api_call(&self, method: &str, url: &str, payload: Option<Value>) {
        let entry = LogEntry::new(EventKind::ApiCall)
            .with_http(method, url)
            .with_payload(payload.unwrap_or(Value::Null));
        self.append_infallible(entry).await;
    }

    /// Record an API response
    pub async fn record_api_response(&self, method: &str, url: &str, status: u16, body: Value) {
        let entry = LogEntry::new(EventKind::ApiResponse)
            .with_http(method, url)
            .with_payload(body)
            .with_metadata(json!({ "status": status }));
        self.append_infallible(entry).await;
    }

    /// Record a failure
    pub async fn record_error(&self, details: ErrorDetails, metadata: Option<Value>) {
        let mut entry = LogEntry::new(EventKind::Error).with_error(details);
        entry.metadata = metadata;
        self.append_infallible(entry).await;
    }

    // Recorders build well-formed entries themselves
    async fn append_infallible(&self, entry: LogEntry) {
        if let Err(e) = self.append(entry).await {
            tracing::error!("Dropped internally built log entry: {}", e);
        }
    }
}

fn validate(entry: &LogEntry) -> Result<()> {
    if entry.kind == EventKind::Error && entry.error.is_none() {
        return Err(Error::MalformedEntry(
            "`error` entries must carry error details".to_string(),
        ));
    }
    if entry.method.as_deref().is_some_and(str::is_empty) {
        return Err(Error::MalformedEntry("`method` must not be empty".to_string()));
    }
    Ok(())
}

fn stamp_request_id(entry: &mut LogEntry, id: &str) {
    entry.metadata = Some(match entry.metadata.take() {
        Some(Value::Object(mut map)) => {
            map.entry("request_id")
                .or_insert_with(|| Value::String(id.to_string()));
            Value::Object(map)
        }
        Some(other) => json!({ "request_id": id, "value": other }),
        None => json!({ "request_id": id }),
    });
}

fn emit_summary(entry: &LogEntry) {
    let summary = entry.summary();
    match entry.kind {
        EventKind::Error => {
            tracing::error!(target: "hookline::events", kind = entry.kind.as_str(), "{}", summary)
        }
        _ => tracing::info!(target: "hookline::events", kind = entry.kind.as_str(), "{}", summary),
    }
    tracing::debug!(target: "hookline::events", payload = %entry.payload, "{}", entry.kind);
}
