//! Archive files for entries dropped by rotation
//!
//! A batch is named after the span it covers,
//! `webhook_events_<oldest>_<newest>.jsonl`, with `-1`, `-2`, ... appended
//! when a file of that name already exists. Existing archives are never
//! overwritten.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

use super::entry::LogEntry;
use crate::error::Error;

const STAMP: &str = "%Y%m%dT%H%M%S%.3fZ";

/// Write `entries` as JSON Lines into a new file under `dir`
///
/// Returns `None` for an empty batch, otherwise the path written.
pub async fn archive_entries(entries: &[LogEntry], dir: &Path) -> Result<Option<PathBuf>, Error> {
    let (Some(oldest), Some(newest)) = (entries.first(), entries.last()) else {
        return Ok(None);
    };

    let mut body = Vec::new();
    for entry in entries {
        serde_json::to_writer(&mut body, entry)?;
        body.push(b'\n');
    }

    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| archive_error(dir, e))?;

    let stem = format!(
        "webhook_events_{}_{}",
        oldest.timestamp.format(STAMP),
        newest.timestamp.format(STAMP)
    );
    let (path, mut file) = create_unique(dir, &stem).await?;

    file.write_all(&body)
        .await
        .map_err(|e| archive_error(&path, e))?;
    file.sync_all().await.map_err(|e| archive_error(&path, e))?;

    tracing::info!(
        entries = entries.len(),
        path = %path.display(),
        "Archived rotated webhook log entries"
    );
    Ok(Some(path))
}

async fn create_unique(dir: &Path, stem: &str) -> Result<(PathBuf, File), Error> {
    let mut attempt = 0u32;
    loop {
        let name = match attempt {
            0 => format!("{}.jsonl", stem),
            n => format!("{}-{}.jsonl", stem, n),
        };
        let path = dir.join(name);
        match OpenOptions::new().write(true).create_new(true).open(&path).await {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => attempt += 1,
            Err(e) => return Err(archive_error(&path, e)),
        }
    }
}

fn archive_error(path: &Path, e: std::io::Error) -> Error {
    Error::StoreUnwritable(format!("archive {}: {}", path.display(), e))
}
