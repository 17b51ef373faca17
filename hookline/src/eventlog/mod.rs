//! Webhook event log
//!
//! Durable, append-only record of integration events (webhook deliveries,
//! Graph API calls and their outcomes) kept for offline debugging, with
//! count-based rotation to bound its size.
//!
//! # Architecture
//!
//! [`EventLog`] is the handle the rest of the service holds. It wraps an
//! injected [`EventStore`]: [`FileEventStore`] in production (JSON Lines),
//! [`MemoryEventStore`] in tests. Each store serializes its own writers, so
//! concurrent appends from the webhook intake, the Graph client and error
//! paths never interleave.
//!
//! Logging must never break business logic: a store that cannot be written
//! is reported through `tracing` and otherwise ignored. Malformed entries, on
//! the other hand, are programming errors and fail the append.

pub mod archive;
pub mod entry;
pub mod logger;
pub mod storage;

pub use entry::{ErrorDetails, EventKind, LogEntry};
pub use logger::{EventLog, DEFAULT_RECENT_COUNT};
pub use storage::{EventStore, FileEventStore, MemoryEventStore, RotateOutcome};
