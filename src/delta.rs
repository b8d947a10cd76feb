//! Append-only JSON-lines delta log.
//!
//! One JSON object per line, `\n` terminated, fsync'd on every append.
//! The delta file is the durability point for single-record writes: once
//! `append` returns, the line is on disk and survives a crash.
//!
//! # Formats
//!
//! Keyed streams write tagged entries:
//!
//! ```text
//! {"kind":"upsert","record":{...}}
//! {"kind":"tombstone","id":123,"updated_at":1700000000000}
//! ```
//!
//! Recovery also accepts the legacy record-shaped format where a deletion
//! is a full record carrying the `__DELETED__` sentinel in its title/name
//! field, so deltas written by older deployments replay cleanly.
//! Append-only streams (history, link clicks) have no tombstones and use
//! plain record-per-line in both directions.
//!
//! # Recovery tolerance
//!
//! An unparsable final line is a torn write from a crash and is dropped
//! silently. An unparsable line anywhere earlier indicates corruption and
//! is skipped with a warning; recovery continues.

use crate::error::Result;
use crate::model::Keyed;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// One logical change in a keyed stream's delta log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeltaEntry<T> {
    /// Insert or replace the record with this ID.
    Upsert { record: T },
    /// Remove the record with this ID from the merged view.
    Tombstone { id: i64, updated_at: i64 },
}

/// Handle on one stream's delta file.
#[derive(Debug)]
pub struct DeltaLog {
    path: PathBuf,
}

impl DeltaLog {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one JSON line and fsync before returning.
    ///
    /// The caller holds the engine's exclusive lock for the duration, so
    /// lines can never interleave.
    pub fn append<S: Serialize>(&self, value: &S) -> Result<()> {
        let mut line = serde_json::to_vec(value)?;
        line.push(b'\n');

        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)?;
        file.write_all(&line)?;
        file.sync_all()?;
        Ok(())
    }

    /// Delete the delta file. Missing file is not an error.
    pub fn remove(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Replay a keyed stream's delta file into memory.
    ///
    /// Tries the tagged format first, then the legacy record shape.
    pub fn load_entries<T>(&self) -> Result<Vec<DeltaEntry<T>>>
    where
        T: Keyed + DeserializeOwned,
    {
        load_lines(&self.path, |line| {
            if let Ok(entry) = serde_json::from_str::<DeltaEntry<T>>(line) {
                return Ok(entry);
            }
            let record: T = serde_json::from_str(line)?;
            Ok(if record.is_tombstone() {
                DeltaEntry::Tombstone {
                    id: record.id(),
                    updated_at: record.updated_at(),
                }
            } else {
                DeltaEntry::Upsert { record }
            })
        })
    }

    /// Replay an append-only stream's delta file into memory.
    pub fn load_records<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        load_lines(&self.path, |line| serde_json::from_str::<T>(line))
    }
}

/// Parse a delta file line by line with the crash-tolerance rules.
fn load_lines<T, F>(path: &Path, mut parse: F) -> Result<Vec<T>>
where
    F: FnMut(&str) -> serde_json::Result<T>,
{
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let lines: Vec<&[u8]> = data
        .split(|b| *b == b'\n')
        .filter(|line| !line.is_empty())
        .collect();
    let last = lines.len().saturating_sub(1);

    let mut out = Vec::with_capacity(lines.len());
    for (idx, raw) in lines.iter().enumerate() {
        // Invalid UTF-8 is treated the same as invalid JSON
        let parsed = std::str::from_utf8(raw)
            .ok()
            .and_then(|line| parse(line).ok());
        match parsed {
            Some(value) => out.push(value),
            None if idx == last => {
                debug!(
                    file = %path.display(),
                    "dropping torn trailing delta line"
                );
            }
            None => {
                warn!(
                    file = %path.display(),
                    line = idx + 1,
                    "skipping corrupt delta line"
                );
            }
        }
    }
    Ok(out)
}

/// Fsync a delta file if it exists. Used by the periodic flush pass.
pub fn fsync_existing(path: &Path) -> std::io::Result<()> {
    match OpenOptions::new().read(true).write(true).open(path) {
        Ok(file) => file.sync_all(),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Bookmark, HistoryEntry, TOMBSTONE_SENTINEL};
    use tempfile::tempdir;

    fn bookmark(id: i64, title: &str) -> Bookmark {
        Bookmark {
            id,
            url: format!("https://example.com/{id}"),
            title: title.into(),
            updated_at: 1_700_000_000_000,
            ..Default::default()
        }
    }

    #[test]
    fn test_append_then_load_tagged() {
        let dir = tempdir().unwrap();
        let log = DeltaLog::new(dir.path().join("bookmarks.delta.json"));

        log.append(&DeltaEntry::Upsert {
            record: bookmark(1, "one"),
        })
        .unwrap();
        log.append(&DeltaEntry::<Bookmark>::Tombstone {
            id: 1,
            updated_at: 2,
        })
        .unwrap();

        let entries = log.load_entries::<Bookmark>().unwrap();
        assert_eq!(entries.len(), 2);
        assert!(matches!(&entries[0], DeltaEntry::Upsert { record } if record.id == 1));
        assert!(matches!(&entries[1], DeltaEntry::Tombstone { id: 1, .. }));
    }

    #[test]
    fn test_load_legacy_sentinel_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bookmarks.delta.json");
        // Lines as an older deployment would have written them
        let legacy = format!(
            "{}\n{}\n",
            serde_json::to_string(&bookmark(7, "kept")).unwrap(),
            serde_json::to_string(&bookmark(7, TOMBSTONE_SENTINEL)).unwrap(),
        );
        fs::write(&path, legacy).unwrap();

        let entries = DeltaLog::new(&path).load_entries::<Bookmark>().unwrap();
        assert_eq!(entries.len(), 2);
        assert!(matches!(&entries[0], DeltaEntry::Upsert { record } if record.title == "kept"));
        assert!(matches!(&entries[1], DeltaEntry::Tombstone { id: 7, .. }));
    }

    #[test]
    fn test_torn_trailing_line_dropped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("history.delta.json");
        let good = serde_json::to_string(&HistoryEntry {
            url: "https://example.com".into(),
            visit_count: 1,
            last_visit_time: 10,
            ..Default::default()
        })
        .unwrap();
        fs::write(&path, format!("{good}\n{{\"url\":\"https://tr")).unwrap();

        let records = DeltaLog::new(&path).load_records::<HistoryEntry>().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].url, "https://example.com");
    }

    #[test]
    fn test_corrupt_interior_line_skipped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bookmarks.delta.json");
        let first = serde_json::to_string(&bookmark(1, "first")).unwrap();
        let third = serde_json::to_string(&bookmark(3, "third")).unwrap();
        fs::write(&path, format!("{first}\nnot json at all\n{third}\n")).unwrap();

        let entries = DeltaLog::new(&path).load_entries::<Bookmark>().unwrap();
        assert_eq!(entries.len(), 2);
        assert!(matches!(&entries[1], DeltaEntry::Upsert { record } if record.id == 3));
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let log = DeltaLog::new(dir.path().join("absent.delta.json"));
        assert!(log.load_records::<HistoryEntry>().unwrap().is_empty());
        // remove() on a missing file is fine too
        log.remove().unwrap();
    }
}
