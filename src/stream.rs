//! Per-stream stores
//!
//! A stream store binds one base file, one delta file and the in-memory
//! delta buffer, and owns the merge semantics:
//!
//! - **Keyed** streams (bookmarks, sessions) materialize a map from the
//!   base, then replay the delta buffer in insertion order: upserts
//!   overwrite by ID, tombstones remove, last writer wins.
//! - **Append-only** streams (history, link clicks) are `base ++ delta`
//!   with no deduplication.
//!
//! None of these methods lock anything; the engine serializes callers
//! with its reader/writer lock and calls in here while holding it.

use crate::base::{read_base, write_base, Columnar};
use crate::clock::{now_ms, IdAlloc};
use crate::delta::{DeltaEntry, DeltaLog};
use crate::error::Result;
use crate::model::{AppendOnly, Keyed};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Store for a mutable keyed stream.
pub struct KeyedStream<T> {
    base_path: PathBuf,
    log: DeltaLog,
    buffer: Vec<DeltaEntry<T>>,
    pending: usize,
}

impl<T> KeyedStream<T>
where
    T: Columnar + Keyed + Clone + Serialize + DeserializeOwned,
{
    /// Open the stream inside `dir`, replaying any existing delta file.
    pub fn open(dir: &Path) -> Result<Self> {
        let base_path = dir.join(format!("{}.parquet", T::STREAM));
        let log = DeltaLog::new(dir.join(format!("{}.delta.json", T::STREAM)));
        let buffer = log.load_entries::<T>()?;
        let pending = buffer.len();
        if pending > 0 {
            info!(stream = T::STREAM, entries = pending, "recovered delta entries");
        }
        Ok(Self {
            base_path,
            log,
            buffer,
            pending,
        })
    }

    /// Delta entries accumulated since the last compaction.
    pub fn pending(&self) -> usize {
        self.pending
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn delta_path(&self) -> &Path {
        self.log.path()
    }

    /// The merged view: base overlaid by the delta buffer.
    pub fn read(&self) -> Result<Vec<T>> {
        Ok(self.merged_map()?.into_values().collect())
    }

    /// Whether a record with this ID exists in the merged view.
    pub fn contains(&self, id: i64) -> Result<bool> {
        Ok(self.merged_map()?.contains_key(&id))
    }

    fn merged_map(&self) -> Result<HashMap<i64, T>> {
        let mut map = HashMap::new();
        for record in read_base::<T>(&self.base_path)? {
            map.insert(record.id(), record);
        }
        for entry in &self.buffer {
            match entry {
                DeltaEntry::Upsert { record } => {
                    map.insert(record.id(), record.clone());
                }
                DeltaEntry::Tombstone { id, .. } => {
                    map.remove(id);
                }
            }
        }
        Ok(map)
    }

    /// Insert a record. Assigns an ID when the caller passed zero and
    /// stamps both timestamps. Returns the record as stored.
    pub fn add(&mut self, mut record: T, ids: &IdAlloc) -> Result<T> {
        if record.id() == 0 {
            record.set_id(ids.next());
        }
        let now = now_ms();
        record.set_created_at(now);
        record.set_updated_at(now);
        self.push(DeltaEntry::Upsert {
            record: record.clone(),
        })?;
        Ok(record)
    }

    /// Record a new version of an existing record.
    ///
    /// `updated_at` is stamped; `created_at` is taken from the current
    /// merged view when the ID is present there. Existence is not
    /// verified; an update of an absent ID simply becomes an insert.
    pub fn update(&mut self, mut record: T) -> Result<T> {
        record.set_updated_at(now_ms());
        if let Some(existing) = self.merged_map()?.get(&record.id()) {
            record.set_created_at(existing.created_at());
        }
        self.push(DeltaEntry::Upsert {
            record: record.clone(),
        })?;
        Ok(record)
    }

    /// Append a tombstone for this ID.
    pub fn delete(&mut self, id: i64) -> Result<()> {
        self.push(DeltaEntry::Tombstone {
            id,
            updated_at: now_ms(),
        })
    }

    /// Replace the whole stream: fresh base, delta dropped.
    pub fn replace(&mut self, rows: &[T]) -> Result<()> {
        write_base(&self.base_path, rows)?;
        // The base already holds `rows`; the buffer resets even if the
        // delta file cannot be deleted.
        let removed = self.log.remove();
        self.buffer.clear();
        self.pending = 0;
        removed
    }

    /// Rewrite the base from the merged view and truncate the delta.
    ///
    /// If the base rewrite fails, the delta file and buffer are left
    /// untouched, so the next read still sees the full change set. Once
    /// the rewrite succeeds the buffer resets unconditionally; the base
    /// already reflects it, and a delta file that could not be deleted
    /// replays idempotently over the new base on the next open.
    pub fn compact(&mut self) -> Result<()> {
        let rows = self.read()?;
        write_base(&self.base_path, &rows)?;
        let removed = self.log.remove();
        self.buffer.clear();
        self.pending = 0;
        removed?;
        debug!(stream = T::STREAM, records = rows.len(), "compacted stream");
        Ok(())
    }

    fn push(&mut self, entry: DeltaEntry<T>) -> Result<()> {
        // File first: the append is the durability point, the buffer
        // must never get ahead of the disk.
        self.log.append(&entry)?;
        self.buffer.push(entry);
        self.pending += 1;
        Ok(())
    }
}

/// Store for an append-only stream.
pub struct AppendStream<T> {
    base_path: PathBuf,
    log: DeltaLog,
    buffer: Vec<T>,
    pending: usize,
}

impl<T> AppendStream<T>
where
    T: Columnar + AppendOnly + Clone + Serialize + DeserializeOwned,
{
    /// Open the stream inside `dir`, replaying any existing delta file.
    pub fn open(dir: &Path) -> Result<Self> {
        let base_path = dir.join(format!("{}.parquet", T::STREAM));
        let log = DeltaLog::new(dir.join(format!("{}.delta.json", T::STREAM)));
        let buffer = log.load_records::<T>()?;
        let pending = buffer.len();
        if pending > 0 {
            info!(stream = T::STREAM, entries = pending, "recovered delta entries");
        }
        Ok(Self {
            base_path,
            log,
            buffer,
            pending,
        })
    }

    pub fn pending(&self) -> usize {
        self.pending
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn delta_path(&self) -> &Path {
        self.log.path()
    }

    /// `base ++ delta`, in that order, duplicates preserved.
    pub fn read(&self) -> Result<Vec<T>> {
        let mut rows = read_base::<T>(&self.base_path)?;
        rows.extend(self.buffer.iter().cloned());
        Ok(rows)
    }

    /// Append a batch, stamping IDs and creation times where unset.
    /// Returns the records as stored.
    pub fn append(&mut self, batch: Vec<T>, ids: &IdAlloc) -> Result<Vec<T>> {
        let now = now_ms();
        let mut stored = Vec::with_capacity(batch.len());
        for mut record in batch {
            record.stamp(ids, now);
            self.log.append(&record)?;
            self.buffer.push(record.clone());
            self.pending += 1;
            stored.push(record);
        }
        Ok(stored)
    }

    /// Replace the whole stream: fresh base, delta dropped.
    pub fn replace(&mut self, rows: &[T]) -> Result<()> {
        write_base(&self.base_path, rows)?;
        // The base already holds `rows`; the buffer resets even if the
        // delta file cannot be deleted.
        let removed = self.log.remove();
        self.buffer.clear();
        self.pending = 0;
        removed
    }

    /// Fold the delta into the base and truncate it.
    ///
    /// If the base rewrite fails, the delta file and buffer are left
    /// untouched. Once it succeeds the buffer resets unconditionally,
    /// matching what is on disk, and any failure to delete the delta
    /// file is surfaced afterward.
    pub fn compact(&mut self) -> Result<()> {
        let rows = self.read()?;
        write_base(&self.base_path, &rows)?;
        let removed = self.log.remove();
        self.buffer.clear();
        self.pending = 0;
        removed?;
        debug!(stream = T::STREAM, records = rows.len(), "compacted stream");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Bookmark, LinkClick};
    use tempfile::tempdir;

    fn bookmark(url: &str, title: &str) -> Bookmark {
        Bookmark {
            url: url.into(),
            title: title.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_last_writer_wins() {
        let dir = tempdir().unwrap();
        let ids = IdAlloc::new();
        let mut stream = KeyedStream::<Bookmark>::open(dir.path()).unwrap();

        let stored = stream
            .add(bookmark("https://example.com", "first"), &ids)
            .unwrap();
        let mut second = stored.clone();
        second.title = "second".into();
        stream.update(second).unwrap();

        let rows = stream.read().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].title, "second");
        assert_eq!(rows[0].created_at, stored.created_at);
    }

    #[test]
    fn test_tombstone_removes_from_merged_view() {
        let dir = tempdir().unwrap();
        let ids = IdAlloc::new();
        let mut stream = KeyedStream::<Bookmark>::open(dir.path()).unwrap();

        let keep = stream.add(bookmark("https://a.example", "a"), &ids).unwrap();
        let gone = stream.add(bookmark("https://b.example", "b"), &ids).unwrap();
        stream.delete(gone.id).unwrap();

        let rows = stream.read().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, keep.id);
        assert!(stream.contains(keep.id).unwrap());
        assert!(!stream.contains(gone.id).unwrap());
    }

    #[test]
    fn test_compact_preserves_merged_view() {
        let dir = tempdir().unwrap();
        let ids = IdAlloc::new();
        let mut stream = KeyedStream::<Bookmark>::open(dir.path()).unwrap();

        let a = stream.add(bookmark("https://a.example", "a"), &ids).unwrap();
        let b = stream.add(bookmark("https://b.example", "b"), &ids).unwrap();
        stream.delete(a.id).unwrap();

        let mut before = stream.read().unwrap();
        stream.compact().unwrap();
        let mut after = stream.read().unwrap();

        before.sort_by_key(|r| r.id);
        after.sort_by_key(|r| r.id);
        assert_eq!(before, after);
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].id, b.id);
        assert_eq!(stream.pending(), 0);
        assert!(!stream.delta_path().exists());
        assert!(stream.base_path().exists());
    }

    #[test]
    fn test_update_of_absent_id_is_insert() {
        let dir = tempdir().unwrap();
        let mut stream = KeyedStream::<Bookmark>::open(dir.path()).unwrap();

        let mut record = bookmark("https://example.com", "ghost");
        record.id = 42;
        stream.update(record).unwrap();

        let rows = stream.read().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, 42);
    }

    #[test]
    fn test_append_stream_keeps_duplicates_and_order() {
        let dir = tempdir().unwrap();
        let ids = IdAlloc::new();
        let mut stream = AppendStream::<LinkClick>::open(dir.path()).unwrap();

        let click = LinkClick {
            destination_url: "https://example.com".into(),
            ..Default::default()
        };
        stream.append(vec![click.clone(), click.clone()], &ids).unwrap();
        stream.compact().unwrap();
        stream.append(vec![click], &ids).unwrap();

        let rows = stream.read().unwrap();
        assert_eq!(rows.len(), 3);
        // all three got distinct ids from the allocator
        let mut seen: Vec<i64> = rows.iter().map(|c| c.id).collect();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn test_replace_drops_delta() {
        let dir = tempdir().unwrap();
        let ids = IdAlloc::new();
        let mut stream = KeyedStream::<Bookmark>::open(dir.path()).unwrap();

        stream.add(bookmark("https://old.example", "old"), &ids).unwrap();
        assert!(stream.delta_path().exists());

        let fresh = vec![Bookmark {
            id: 100,
            url: "https://new.example".into(),
            title: "new".into(),
            ..Default::default()
        }];
        stream.replace(&fresh).unwrap();

        assert!(!stream.delta_path().exists());
        assert_eq!(stream.pending(), 0);
        let rows = stream.read().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, 100);
    }
}
