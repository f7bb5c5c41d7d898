//! Write-Ahead Log
//!
//! Crash-resilience for writes that span the relational and vector stores.
//! Append-only newline-delimited JSON; every append is fsynced. Two record
//! kinds: a full entry and a tombstone marking an entry as committed. A
//! legacy top-level JSON-array format is still readable.
//!
//! Recovery contract: replaying the surviving entries against the stores is
//! idempotent because ids are stable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum WalError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, WalError>;

// ============================================================================
// RECORDS
// ============================================================================

/// Journal operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalOperation {
    Store,
    Delete,
    Update,
}

/// A journaled write that has not been proven durable yet
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalEntry {
    /// Entry id; the facade uses the fact id so replays stay idempotent
    pub id: String,
    /// Milliseconds since the epoch
    pub timestamp: i64,
    pub operation: WalOperation,
    /// Operation payload, opaque to the log
    pub data: serde_json::Value,
}

impl WalEntry {
    pub fn new(id: impl Into<String>, operation: WalOperation, data: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            timestamp: Utc::now().timestamp_millis(),
            operation,
            data,
        }
    }

    pub fn timestamp_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Tombstone<'a> {
    op: &'a str,
    id: &'a str,
}

/// Entries newer than this are replayed on recovery; older ones are assumed
/// to belong to an abandoned process and are dropped by `prune_stale`.
pub const DEFAULT_MAX_ENTRY_AGE: Duration = Duration::from_secs(5 * 60);

// ============================================================================
// WRITE-AHEAD LOG
// ============================================================================

/// Append-only NDJSON journal
pub struct WriteAheadLog {
    path: PathBuf,
}

impl WriteAheadLog {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a full entry and fsync
    pub fn append(&self, entry: &WalEntry) -> Result<()> {
        let line = serde_json::to_string(entry)?;
        self.append_line(&line)
    }

    /// Append a tombstone for a committed entry and fsync
    pub fn append_remove(&self, id: &str) -> Result<()> {
        let line = serde_json::to_string(&Tombstone { op: "remove", id })?;
        self.append_line(&line)
    }

    fn append_line(&self, line: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        file.sync_all()?;
        Ok(())
    }

    /// All not-yet-committed entries, in append order. Tombstoned ids are
    /// excluded; unparseable lines are logged and skipped.
    pub fn read_all(&self) -> Result<Vec<WalEntry>> {
        if !self.path.exists() {
            return Ok(vec![]);
        }

        let mut raw = String::new();
        File::open(&self.path)?.read_to_string(&mut raw)?;
        let trimmed = raw.trim_start();

        // Legacy format: the whole file is one JSON array of entries
        if trimmed.starts_with('[') {
            let entries: Vec<WalEntry> = match serde_json::from_str(trimmed) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::info!("Unreadable legacy journal, treating as empty: {}", e);
                    vec![]
                }
            };
            return Ok(entries);
        }

        let mut entries: Vec<WalEntry> = Vec::new();
        let mut removed: HashSet<String> = HashSet::new();

        for line in raw.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let value: serde_json::Value = match serde_json::from_str(line) {
                Ok(v) => v,
                Err(e) => {
                    tracing::info!("Skipping corrupt journal line: {}", e);
                    continue;
                }
            };

            if value.get("op").and_then(|v| v.as_str()) == Some("remove") {
                if let Some(id) = value.get("id").and_then(|v| v.as_str()) {
                    removed.insert(id.to_string());
                }
                continue;
            }

            match serde_json::from_value::<WalEntry>(value) {
                Ok(entry) => entries.push(entry),
                Err(e) => tracing::info!("Skipping malformed journal entry: {}", e),
            }
        }

        entries.retain(|e| !removed.contains(&e.id));
        Ok(entries)
    }

    /// Uncommitted entries no older than `max_age`
    pub fn valid_entries(&self, max_age: Duration) -> Result<Vec<WalEntry>> {
        let cutoff = Utc::now().timestamp_millis() - max_age.as_millis() as i64;
        Ok(self
            .read_all()?
            .into_iter()
            .filter(|e| e.timestamp >= cutoff)
            .collect())
    }

    /// Rewrite the log keeping only valid entries; delete the file when
    /// nothing remains.
    pub fn prune_stale(&self, max_age: Duration) -> Result<usize> {
        let valid = self.valid_entries(max_age)?;
        if valid.is_empty() {
            self.clear()?;
            return Ok(0);
        }

        let mut buffer = String::new();
        for entry in &valid {
            buffer.push_str(&serde_json::to_string(entry)?);
            buffer.push('\n');
        }

        let tmp = self.path.with_extension("tmp");
        {
            let mut file = File::create(&tmp)?;
            file.write_all(buffer.as_bytes())?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp, &self.path)?;
        Ok(valid.len())
    }

    /// Remove the journal file entirely
    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.read_all()?.is_empty())
    }
}

// ============================================================================
// TESTS
// ============================================================================
