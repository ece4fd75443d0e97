//! Bounded history of completed downloads.
//!
//! A JSON array file holding the 50 most recent entries, newest first.
//! Appends are read-modify-write of the whole file, serialized across all
//! workers by a mutex. A missing or corrupt file reads as an empty log.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::core::error::AppResult;

/// Entries kept after every append.
pub const MAX_ENTRIES: usize = 50;

/// Durable record of one completed task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub task_id: String,
    pub url: String,
    pub title: String,
    /// "video", "audio" or "playlist"
    #[serde(rename = "type")]
    pub media_kind: String,
    pub filename: String,
    pub completed_at: DateTime<Utc>,
    /// File size in bytes; absent for playlists
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Item count; playlists only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<u32>,
}

/// File-backed history log with serialized writes.
#[derive(Debug)]
pub struct HistoryLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl HistoryLog {
    /// Creates a log backed by the given file. The file is created lazily on
    /// the first append.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads all entries, newest first. Missing or unreadable files and
    /// malformed JSON all read as an empty log.
    pub async fn load(&self) -> Vec<HistoryEntry> {
        let _guard = self.lock.lock().await;
        self.load_unlocked()
    }

    /// Prepends an entry and truncates the log to `MAX_ENTRIES`.
    ///
    /// Write failures propagate; the caller decides how loudly to complain.
    pub async fn append(&self, entry: HistoryEntry) -> AppResult<()> {
        let _guard = self.lock.lock().await;
        let mut entries = self.load_unlocked();
        entries.insert(0, entry);
        entries.truncate(MAX_ENTRIES);
        self.persist(&entries)
    }

    /// Persists an empty log.
    pub async fn clear(&self) -> AppResult<()> {
        let _guard = self.lock.lock().await;
        self.persist(&[])
    }

    fn load_unlocked(&self) -> Vec<HistoryEntry> {
        match std::fs::read(&self.path) {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(entries) => entries,
                Err(e) => {
                    log::warn!("History file {} is corrupt ({}), starting empty", self.path.display(), e);
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        }
    }

    fn persist(&self, entries: &[HistoryEntry]) -> AppResult<()> {
        let json = serde_json::to_vec_pretty(entries)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}
