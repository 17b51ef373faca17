//! Event store trait and backend implementations
//!
//! The `EventStore` trait defines the interface for persisting webhook log
//! entries. Stores are append-only in steady state; `rotate` is the only
//! operation that removes entries, and it always removes the oldest first.
//!
//! # Available Backends
//!
//! - **File** ([`FileEventStore`]): JSON Lines file, one entry per line
//! - **Memory** ([`MemoryEventStore`]): process-local, used by tests and when
//!   no log path is configured

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::entry::LogEntry;
use crate::error::Error;

pub mod file;
pub mod memory;

pub use file::FileEventStore;
pub use memory::MemoryEventStore;

/// Counts reported by a rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotateOutcome {
    /// Entries discarded
    pub removed: usize,
    /// Entries retained
    pub kept: usize,
}

/// Trait for webhook log persistence backends
///
/// Implementations MUST serialize writers so concurrent appends never
/// interleave, and MUST return entries in append order.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Persist one entry at the end of the log
    ///
    /// Returns only once the entry is durable.
    async fn append(&self, entry: &LogEntry) -> Result<(), Error>;

    /// The last `count` entries, oldest first
    async fn recent(&self, count: usize) -> Result<Vec<LogEntry>, Error>;

    /// Drop all but the most recent `keep` entries
    async fn rotate(&self, keep: usize) -> Result<RotateOutcome, Error>;

    /// Number of stored entries
    async fn len(&self) -> Result<usize, Error>;
}

/// Split off the retained suffix of `entries`, returning the rotation counts
pub(crate) fn retain_suffix(entries: &mut Vec<LogEntry>, keep: usize) -> RotateOutcome {
    let removed = entries.len().saturating_sub(keep);
    entries.drain(..removed);
    RotateOutcome {
        removed,
        kept: entries.len(),
    }
}

/// The last `count` items of `entries`
pub(crate) fn tail(entries: &[LogEntry], count: usize) -> Vec<LogEntry> {
    let start = entries.len().saturating_sub(count);
    entries[start..].to_vec()
}
