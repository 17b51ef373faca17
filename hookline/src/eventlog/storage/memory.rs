//! In-memory event store

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{retain_suffix, tail, EventStore, RotateOutcome};
use crate::eventlog::entry::LogEntry;
use crate::error::Error;

/// Process-local event store
///
/// Nothing survives a restart. Useful for tests and for running the service
/// without a configured log path.
#[derive(Debug, Default)]
pub struct MemoryEventStore {
    entries: RwLock<Vec<LogEntry>>,
}

impl MemoryEventStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn append(&self, entry: &LogEntry) -> Result<(), Error> {
        self.entries.write().await.push(entry.clone());
        Ok(())
    }

    async fn recent(&self, count: usize) -> Result<Vec<LogEntry>, Error> {
        Ok(tail(&self.entries.read().await, count))
    }

    async fn rotate(&self, keep: usize) -> Result<RotateOutcome, Error> {
        let mut entries = self.entries.write().await;
        Ok(retain_suffix(&mut entries, keep))
    }

    async fn len(&self) -> Result<usize, Error> {
        Ok(self.entries.read().await.len())
    }
}
