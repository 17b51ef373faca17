//! JSON Lines event store
//!
//! Each entry occupies exactly one line of the log file. Appends write a
//! single line; rotation rewrites the retained suffix to a sibling temp file
//! and renames it over the log, so readers never observe a half-rotated file.
//!
//! Writers are serialized twice: an async mutex orders the tasks sharing one
//! store, and an advisory lock on `<log>.lock` orders separate processes (the
//! CLI rotating a log the server is appending to).

use async_trait::async_trait;
use fs4::fs_std::FileExt;
use serde_json::Value;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;

use super::{tail, EventStore, RotateOutcome};
use crate::eventlog::archive::archive_entries;
use crate::eventlog::entry::LogEntry;
use crate::error::Error;

/// File-backed event store
pub struct FileEventStore {
    path: PathBuf,
    lock_path: PathBuf,
    archive_dir: Option<PathBuf>,
    lock: Mutex<()>,
}

/// Held advisory lock; released when dropped
struct WriterLock {
    _file: std::fs::File,
}

impl FileEventStore {
    /// Create a store writing to `path`
    ///
    /// The file and its parent directories are created on first append.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let lock_path = sibling(&path, ".lock");
        Self {
            path,
            lock_path,
            archive_dir: None,
            lock: Mutex::new(()),
        }
    }

    /// Create a store and prepare its file
    ///
    /// Creates the parent directory and converts a legacy log holding one
    /// top-level JSON array into line format.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, Error> {
        let store = Self::new(path);
        store.ensure_parent().await?;
        store.migrate_legacy_array().await?;
        Ok(store)
    }

    /// Archive entries discarded by rotation into `dir`
    pub fn with_archive_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.archive_dir = Some(dir.into());
        self
    }

    /// Path of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn unwritable(&self, e: std::io::Error) -> Error {
        Error::StoreUnwritable(format!("{}: {}", self.path.display(), e))
    }

    async fn ensure_parent(&self) -> Result<(), Error> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| self.unwritable(e))?;
            }
        }
        Ok(())
    }

    /// Take the cross-process writer lock. Caller holds `self.lock`.
    async fn lock_writers(&self) -> Result<WriterLock, Error> {
        self.ensure_parent().await?;

        let lock_path = self.lock_path.clone();
        let locked = tokio::task::spawn_blocking(move || {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .truncate(false)
                .read(true)
                .write(true)
                .open(&lock_path)?;
            FileExt::lock_exclusive(&file)?;
            Ok::<_, std::io::Error>(file)
        })
        .await
        .map_err(|e| Error::Internal(format!("event log lock task failed: {}", e)))?;

        locked
            .map(|file| WriterLock { _file: file })
            .map_err(|e| self.unwritable(e))
    }

    /// Read every readable entry
    ///
    /// Lines that are torn, not UTF-8 or not a valid entry are skipped with a
    /// warning.
    async fn read_entries(&self) -> Result<Vec<LogEntry>, Error> {
        let contents = match tokio::fs::read(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        for (index, line) in contents.split(|b| *b == b'\n').enumerate() {
            if line.trim_ascii().is_empty() {
                continue;
            }
            match serde_json::from_slice::<LogEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    tracing::warn!(
                        path = %self.path.display(),
                        line = index + 1,
                        "Skipping unreadable event log line: {}",
                        e
                    );
                }
            }
        }
        Ok(entries)
    }

    /// Replace the log with `entries`. Caller holds both locks.
    async fn rewrite(&self, entries: &[LogEntry]) -> Result<(), Error> {
        let mut contents = Vec::new();
        for entry in entries {
            serde_json::to_writer(&mut contents, entry)?;
            contents.push(b'\n');
        }

        let tmp_path = sibling(&self.path, ".tmp");
        let mut file = tokio::fs::File::create(&tmp_path)
            .await
            .map_err(|e| self.unwritable(e))?;
        file.write_all(&contents)
            .await
            .map_err(|e| self.unwritable(e))?;
        file.sync_all().await.map_err(|e| self.unwritable(e))?;
        drop(file);

        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| self.unwritable(e))?;
        Ok(())
    }

    async fn migrate_legacy_array(&self) -> Result<(), Error> {
        let _guard = self.lock.lock().await;
        let _writers = self.lock_writers().await?;

        let contents = match tokio::fs::read(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        if !contents.trim_ascii_start().starts_with(b"[") {
            return Ok(());
        }

        let values: Vec<Value> = serde_json::from_slice(&contents)?;
        let total = values.len();
        let mut entries = Vec::with_capacity(total);
        for value in values {
            match LogEntry::from_value(value) {
                Ok(entry) => entries.push(entry),
                Err(e) => tracing::warn!("Dropping legacy event log record: {}", e),
            }
        }

        self.rewrite(&entries).await?;
        tracing::info!(
            path = %self.path.display(),
            "Migrated {} of {} legacy event log records to line format",
            entries.len(),
            total
        );
        Ok(())
    }
}

/// `path` with `suffix` appended to its file name
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

impl std::fmt::Debug for FileEventStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileEventStore")
            .field("path", &self.path)
            .field("archive_dir", &self.archive_dir)
            .finish()
    }
}

#[async_trait]
impl EventStore for FileEventStore {
    async fn append(&self, entry: &LogEntry) -> Result<(), Error> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');

        let _guard = self.lock.lock().await;
        let _writers = self.lock_writers().await?;

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| self.unwritable(e))?;

        // A crash mid-append can leave a line without its newline
        let len = file.metadata().await.map_err(|e| self.unwritable(e))?.len();
        if len > 0 {
            let mut last = [0u8; 1];
            file.seek(SeekFrom::End(-1))
                .await
                .map_err(|e| self.unwritable(e))?;
            file.read_exact(&mut last)
                .await
                .map_err(|e| self.unwritable(e))?;
            if last[0] != b'\n' {
                line.insert(0, b'\n');
            }
        }

        file.write_all(&line)
            .await
            .map_err(|e| self.unwritable(e))?;
        file.sync_data().await.map_err(|e| self.unwritable(e))?;
        Ok(())
    }

    async fn recent(&self, count: usize) -> Result<Vec<LogEntry>, Error> {
        let _guard = self.lock.lock().await;
        let entries = self.read_entries().await?;
        Ok(tail(&entries, count))
    }

    async fn rotate(&self, keep: usize) -> Result<RotateOutcome, Error> {
        let _guard = self.lock.lock().await;
        let _writers = self.lock_writers().await?;
        let mut entries = self.read_entries().await?;

        let removed = entries.len().saturating_sub(keep);
        if removed == 0 {
            return Ok(RotateOutcome {
                removed: 0,
                kept: entries.len(),
            });
        }

        let retained = entries.split_off(removed);
        if let Some(ref dir) = self.archive_dir {
            archive_entries(&entries, dir).await?;
        }
        self.rewrite(&retained).await?;

        Ok(RotateOutcome {
            removed,
            kept: retained.len(),
        })
    }

    async fn len(&self) -> Result<usize, Error> {
        let _guard = self.lock.lock().await;
        Ok(self.read_entries().await?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eventlog::entry::EventKind;
    use serde_json::json;
    use std::sync::Arc;

    fn entry(n: usize) -> LogEntry {
        LogEntry::new(EventKind::Received).with_payload(json!({ "n": n }))
    }

    #[tokio::test]
    async fn test_append_writes_one_line_per_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileEventStore::new(dir.path().join("nested").join("events.jsonl"));

        store.append(&entry(1)).await.unwrap();
        store.append(&entry(2)).await.unwrap();

        let contents = tokio::fs::read_to_string(store.path()).await.unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in lines {
            let value: Value = serde_json::from_str(line).unwrap();
            assert_eq!(value["type"], "received");
        }
    }

    #[tokio::test]
    async fn test_recent_on_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileEventStore::new(dir.path().join("events.jsonl"));
        assert!(store.recent(10).await.unwrap().is_empty());
        assert_eq!(store.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_rotate_keeps_newest_and_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let store = FileEventStore::new(&path);
        for n in 0..10 {
            store.append(&entry(n)).await.unwrap();
        }

        let outcome = store.rotate(4).await.unwrap();
        assert_eq!(outcome, RotateOutcome { removed: 6, kept: 4 });

        let reopened = FileEventStore::open(&path).await.unwrap();
        let entries = reopened.recent(100).await.unwrap();
        let ns: Vec<u64> = entries
            .iter()
            .map(|e| e.payload["n"].as_u64().unwrap())
            .collect();
        assert_eq!(ns, vec![6, 7, 8, 9]);
    }

    #[tokio::test]
    async fn test_rotate_without_removal_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileEventStore::new(dir.path().join("events.jsonl"));
        store.append(&entry(1)).await.unwrap();
        let before = tokio::fs::read(store.path()).await.unwrap();

        let outcome = store.rotate(5).await.unwrap();
        assert_eq!(outcome, RotateOutcome { removed: 0, kept: 1 });
        assert_eq!(tokio::fs::read(store.path()).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_torn_trailing_line_is_skipped_and_not_merged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let good = serde_json::to_string(&entry(1)).unwrap();
        tokio::fs::write(&path, format!("{}\n{{\"timestamp\":\"2024-", good))
            .await
            .unwrap();

        let store = FileEventStore::new(&path);
        assert_eq!(store.len().await.unwrap(), 1);

        store.append(&entry(2)).await.unwrap();
        let entries = store.recent(10).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].payload["n"], 2);
    }

    #[tokio::test]
    async fn test_open_migrates_legacy_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("webhook-logs.json");
        let legacy = json!([
            {"timestamp": "2024-01-01T00:00:00Z", "type": "verification", "payload": {"mode": "subscribe"}},
            {"timestamp": "2024-01-01T00:00:01Z", "type": "received", "payload": {"object": "instagram"}},
            {"timestamp": "2024-01-01T00:00:02Z", "payload": {}}
        ]);
        tokio::fs::write(&path, serde_json::to_string_pretty(&legacy).unwrap())
            .await
            .unwrap();

        let store = FileEventStore::open(&path).await.unwrap();
        let entries = store.recent(10).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].kind, EventKind::Verification);
        assert_eq!(entries[1].kind, EventKind::Received);

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(contents.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_rotate_archives_discarded_entries() {
        let dir = tempfile::tempdir().unwrap();
        let archive_dir = dir.path().join("archive");
        let store =
            FileEventStore::new(dir.path().join("events.jsonl")).with_archive_dir(&archive_dir);
        for n in 0..5 {
            store.append(&entry(n)).await.unwrap();
        }

        store.rotate(2).await.unwrap();

        let mut files = tokio::fs::read_dir(&archive_dir).await.unwrap();
        let archived = files.next_entry().await.unwrap().unwrap();
        let contents = tokio::fs::read_to_string(archived.path()).await.unwrap();
        assert_eq!(contents.lines().count(), 3);
    }

    #[tokio::test]
    async fn test_concurrent_appends_do_not_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileEventStore::new(dir.path().join("events.jsonl")));

        let appends = (0..50).map(|n| {
            let store = store.clone();
            async move { store.append(&entry(n)).await }
        });
        let results = futures::future::join_all(appends).await;
        assert!(results.iter().all(|r| r.is_ok()));

        let contents = tokio::fs::read_to_string(store.path()).await.unwrap();
        assert_eq!(contents.lines().count(), 50);
        let mut seen: Vec<u64> = store
            .recent(50)
            .await
            .unwrap()
            .iter()
            .map(|e| e.payload["n"].as_u64().unwrap())
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..50).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn test_line_torn_inside_multibyte_character_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");

        let mut contents = serde_json::to_vec(&entry(1)).unwrap();
        contents.push(b'\n');
        let emoji = serde_json::to_vec(
            &LogEntry::new(EventKind::Received).with_payload(json!({ "text": "hi 😀" })),
        )
        .unwrap();
        let cut = emoji.windows(4).position(|w| w == "😀".as_bytes()).unwrap() + 2;
        contents.extend_from_slice(&emoji[..cut]);
        tokio::fs::write(&path, &contents).await.unwrap();

        let store = FileEventStore::new(&path);
        assert_eq!(store.len().await.unwrap(), 1);

        store.append(&entry(2)).await.unwrap();
        let entries = store.recent(10).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].payload["n"], 2);

        assert_eq!(store.rotate(1).await.unwrap(), RotateOutcome { removed: 1, kept: 1 });
        assert_eq!(store.recent(10).await.unwrap()[0].payload["n"], 2);
    }

    #[tokio::test]
    async fn test_rotate_1500_down_to_1000_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let store = FileEventStore::new(&path);

        let originals: Vec<LogEntry> = (0..1500).map(entry).collect();
        for e in &originals {
            store.append(e).await.unwrap();
        }

        let outcome = store.rotate(1000).await.unwrap();
        assert_eq!(outcome, RotateOutcome { removed: 500, kept: 1000 });

        let reopened = FileEventStore::open(&path).await.unwrap();
        assert_eq!(reopened.recent(1000).await.unwrap(), originals[500..].to_vec());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_rotate_from_second_handle_keeps_concurrent_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let server = Arc::new(FileEventStore::new(&path));
        let cli = FileEventStore::new(&path);

        for n in 0..600 {
            server.append(&entry(n)).await.unwrap();
        }

        let writer = {
            let server = server.clone();
            tokio::spawn(async move {
                for n in 0..200 {
                    let processed =
                        LogEntry::new(EventKind::Processed).with_payload(json!({ "n": n }));
                    server.append(&processed).await.unwrap();
                }
            })
        };
        let outcome = cli.rotate(300).await.unwrap();
        writer.await.unwrap();

        assert_eq!(outcome.kept, 300);
        let entries = server.recent(usize::MAX).await.unwrap();
        let processed = entries
            .iter()
            .filter(|e| e.kind == EventKind::Processed)
            .count();
        assert_eq!(processed, 200);
        assert_eq!(entries.len(), 800 - outcome.removed);
    }
}
