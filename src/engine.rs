//! The storage engine
//!
//! One engine instance owns a data directory and its four streams
//! (`bookmarks`, `sessions`, `history`, `link_clicks`), all behind a
//! single reader/writer lock. Reads take the lock shared; every
//! mutation, compaction and fsync pass takes it exclusive, so mutations
//! within a stream are linearizable and file I/O never races.
//!
//! Compaction runs synchronously on the mutating thread as soon as a
//! stream's delta counter reaches the threshold. The write lock is
//! already held, so the rewrite cannot race other writers and cannot
//! outlive the engine.
//!
//! A background ticker fsyncs the four delta files every
//! `fsync_interval` as a safety net; each append already fsyncs before
//! acknowledging. `close()` stops the ticker and runs one final pass.

use crate::clock::IdAlloc;
use crate::delta::fsync_existing;
use crate::error::{Result, StoreError};
use crate::model::{Bookmark, HistoryEntry, LinkClick, Session};
use crate::stream::{AppendStream, KeyedStream};
use crossbeam_channel::{bounded, select, tick, Sender};
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Compact a stream once this many delta entries have accumulated.
pub const DEFAULT_COMPACT_THRESHOLD: usize = 100;

/// How often the background ticker fsyncs the delta files.
pub const DEFAULT_FSYNC_INTERVAL: Duration = Duration::from_secs(30);

/// Engine construction parameters.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory holding the eight base/delta files. Created if absent.
    pub data_dir: PathBuf,
    /// Per-stream delta entry count that triggers compaction.
    pub compact_threshold: usize,
    /// Period of the background fsync ticker.
    pub fsync_interval: Duration,
}

impl EngineConfig {
    pub fn new<P: Into<PathBuf>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.into(),
            compact_threshold: DEFAULT_COMPACT_THRESHOLD,
            fsync_interval: DEFAULT_FSYNC_INTERVAL,
        }
    }
}

/// One of the four streams, for targeted maintenance operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Bookmarks,
    Sessions,
    History,
    LinkClicks,
}

impl StreamKind {
    pub const ALL: [StreamKind; 4] = [
        StreamKind::Bookmarks,
        StreamKind::Sessions,
        StreamKind::History,
        StreamKind::LinkClicks,
    ];

    pub fn name(self) -> &'static str {
        match self {
            StreamKind::Bookmarks => "bookmarks",
            StreamKind::Sessions => "sessions",
            StreamKind::History => "history",
            StreamKind::LinkClicks => "link_clicks",
        }
    }
}

/// Per-stream size figures for the maintenance CLI and tests.
#[derive(Debug, Clone)]
pub struct StreamStats {
    pub stream: &'static str,
    /// Records in the merged view (keyed) or the full log (append-only).
    pub records: usize,
    /// Delta entries accumulated since the last compaction.
    pub pending_delta: usize,
    pub base_bytes: u64,
    pub delta_bytes: u64,
}

/// Snapshot of all four streams.
#[derive(Debug, Clone)]
pub struct EngineStats {
    pub streams: Vec<StreamStats>,
}

struct State {
    closed: bool,
    bookmarks: KeyedStream<Bookmark>,
    sessions: KeyedStream<Session>,
    history: AppendStream<HistoryEntry>,
    link_clicks: AppendStream<LinkClick>,
}

/// The delta+columnar storage engine.
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
pub struct Engine {
    state: Arc<RwLock<State>>,
    ids: IdAlloc,
    data_dir: PathBuf,
    delta_paths: Vec<PathBuf>,
    compact_threshold: usize,
    stop_tx: Sender<()>,
    flusher: Mutex<Option<JoinHandle<()>>>,
}

impl Engine {
    /// Open (or create) the data directory and recover all four streams.
    pub fn open(config: EngineConfig) -> Result<Self> {
        fs::create_dir_all(&config.data_dir)?;

        let bookmarks = KeyedStream::<Bookmark>::open(&config.data_dir)?;
        let sessions = KeyedStream::<Session>::open(&config.data_dir)?;
        let history = AppendStream::<HistoryEntry>::open(&config.data_dir)?;
        let link_clicks = AppendStream::<LinkClick>::open(&config.data_dir)?;

        let delta_paths = vec![
            bookmarks.delta_path().to_path_buf(),
            sessions.delta_path().to_path_buf(),
            history.delta_path().to_path_buf(),
            link_clicks.delta_path().to_path_buf(),
        ];

        info!(dir = %config.data_dir.display(), "opened storage engine");

        let state = Arc::new(RwLock::new(State {
            closed: false,
            bookmarks,
            sessions,
            history,
            link_clicks,
        }));

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let flusher = spawn_flusher(
            Arc::clone(&state),
            delta_paths.clone(),
            config.fsync_interval,
            stop_rx,
        )?;

        Ok(Self {
            state,
            ids: IdAlloc::new(),
            data_dir: config.data_dir,
            delta_paths,
            compact_threshold: config.compact_threshold,
            stop_tx,
            flusher: Mutex::new(Some(flusher)),
        })
    }

    /// Open with default thresholds.
    pub fn open_dir<P: Into<PathBuf>>(data_dir: P) -> Result<Self> {
        Self::open(EngineConfig::new(data_dir))
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Stop the fsync ticker and flush every delta file. Idempotent;
    /// all later operations fail with [`StoreError::Closed`].
    pub fn close(&self) -> Result<()> {
        {
            let mut st = self.state.write();
            if st.closed {
                return Ok(());
            }
            st.closed = true;
        }
        let _ = self.stop_tx.send(());
        if let Some(handle) = self.flusher.lock().take() {
            let _ = handle.join();
        }
        flush_delta_files(&self.delta_paths);
        info!("storage engine closed");
        Ok(())
    }

    // ---- bookmarks -----------------------------------------------------

    pub fn read_bookmarks(&self) -> Result<Vec<Bookmark>> {
        self.read_state()?.bookmarks.read()
    }

    pub fn contains_bookmark(&self, id: i64) -> Result<bool> {
        self.read_state()?.bookmarks.contains(id)
    }

    pub fn add_bookmark(&self, record: Bookmark) -> Result<Bookmark> {
        let mut st = self.write_state()?;
        let stored = st.bookmarks.add(record, &self.ids)?;
        if st.bookmarks.pending() >= self.compact_threshold {
            st.bookmarks.compact()?;
        }
        Ok(stored)
    }

    pub fn update_bookmark(&self, record: Bookmark) -> Result<Bookmark> {
        let mut st = self.write_state()?;
        let stored = st.bookmarks.update(record)?;
        if st.bookmarks.pending() >= self.compact_threshold {
            st.bookmarks.compact()?;
        }
        Ok(stored)
    }

    pub fn delete_bookmark(&self, id: i64) -> Result<()> {
        let mut st = self.write_state()?;
        st.bookmarks.delete(id)?;
        if st.bookmarks.pending() >= self.compact_threshold {
            st.bookmarks.compact()?;
        }
        Ok(())
    }

    /// Replace the whole bookmark stream (imports, bulk overwrite).
    pub fn replace_bookmarks(&self, records: &[Bookmark]) -> Result<()> {
        self.write_state()?.bookmarks.replace(records)
    }

    // ---- sessions ------------------------------------------------------

    pub fn read_sessions(&self) -> Result<Vec<Session>> {
        self.read_state()?.sessions.read()
    }

    pub fn contains_session(&self, id: i64) -> Result<bool> {
        self.read_state()?.sessions.contains(id)
    }

    pub fn add_session(&self, record: Session) -> Result<Session> {
        let mut st = self.write_state()?;
        let stored = st.sessions.add(record, &self.ids)?;
        if st.sessions.pending() >= self.compact_threshold {
            st.sessions.compact()?;
        }
        Ok(stored)
    }

    pub fn update_session(&self, record: Session) -> Result<Session> {
        let mut st = self.write_state()?;
        let stored = st.sessions.update(record)?;
        if st.sessions.pending() >= self.compact_threshold {
            st.sessions.compact()?;
        }
        Ok(stored)
    }

    pub fn delete_session(&self, id: i64) -> Result<()> {
        let mut st = self.write_state()?;
        st.sessions.delete(id)?;
        if st.sessions.pending() >= self.compact_threshold {
            st.sessions.compact()?;
        }
        Ok(())
    }

    pub fn replace_sessions(&self, records: &[Session]) -> Result<()> {
        self.write_state()?.sessions.replace(records)
    }

    // ---- history -------------------------------------------------------

    pub fn read_history(&self) -> Result<Vec<HistoryEntry>> {
        self.read_state()?.history.read()
    }

    /// Append a history batch. No deduplication; the caller's sync path
    /// owns URL-level merging.
    pub fn append_history(&self, batch: Vec<HistoryEntry>) -> Result<Vec<HistoryEntry>> {
        let mut st = self.write_state()?;
        let stored = st.history.append(batch, &self.ids)?;
        if st.history.pending() >= self.compact_threshold {
            st.history.compact()?;
        }
        Ok(stored)
    }

    pub fn replace_history(&self, records: &[HistoryEntry]) -> Result<()> {
        self.write_state()?.history.replace(records)
    }

    // ---- link clicks ---------------------------------------------------

    pub fn read_link_clicks(&self) -> Result<Vec<LinkClick>> {
        self.read_state()?.link_clicks.read()
    }

    pub fn append_link_clicks(&self, batch: Vec<LinkClick>) -> Result<Vec<LinkClick>> {
        let mut st = self.write_state()?;
        let stored = st.link_clicks.append(batch, &self.ids)?;
        if st.link_clicks.pending() >= self.compact_threshold {
            st.link_clicks.compact()?;
        }
        Ok(stored)
    }

    pub fn replace_link_clicks(&self, records: &[LinkClick]) -> Result<()> {
        self.write_state()?.link_clicks.replace(records)
    }

    // ---- maintenance ---------------------------------------------------

    /// Force a compaction of one stream, regardless of its delta count.
    pub fn compact(&self, kind: StreamKind) -> Result<()> {
        let mut st = self.write_state()?;
        match kind {
            StreamKind::Bookmarks => st.bookmarks.compact(),
            StreamKind::Sessions => st.sessions.compact(),
            StreamKind::History => st.history.compact(),
            StreamKind::LinkClicks => st.link_clicks.compact(),
        }
    }

    /// Force a compaction of all four streams.
    pub fn compact_all(&self) -> Result<()> {
        let mut st = self.write_state()?;
        st.bookmarks.compact()?;
        st.sessions.compact()?;
        st.history.compact()?;
        st.link_clicks.compact()?;
        Ok(())
    }

    /// Record counts and on-disk sizes for every stream.
    pub fn stats(&self) -> Result<EngineStats> {
        let st = self.read_state()?;
        Ok(EngineStats {
            streams: vec![
                StreamStats {
                    stream: "bookmarks",
                    records: st.bookmarks.read()?.len(),
                    pending_delta: st.bookmarks.pending(),
                    base_bytes: file_size(st.bookmarks.base_path()),
                    delta_bytes: file_size(st.bookmarks.delta_path()),
                },
                StreamStats {
                    stream: "sessions",
                    records: st.sessions.read()?.len(),
                    pending_delta: st.sessions.pending(),
                    base_bytes: file_size(st.sessions.base_path()),
                    delta_bytes: file_size(st.sessions.delta_path()),
                },
                StreamStats {
                    stream: "history",
                    records: st.history.read()?.len(),
                    pending_delta: st.history.pending(),
                    base_bytes: file_size(st.history.base_path()),
                    delta_bytes: file_size(st.history.delta_path()),
                },
                StreamStats {
                    stream: "link_clicks",
                    records: st.link_clicks.read()?.len(),
                    pending_delta: st.link_clicks.pending(),
                    base_bytes: file_size(st.link_clicks.base_path()),
                    delta_bytes: file_size(st.link_clicks.delta_path()),
                },
            ],
        })
    }

    fn read_state(&self) -> Result<RwLockReadGuard<'_, State>> {
        let st = self.state.read();
        if st.closed {
            return Err(StoreError::Closed);
        }
        Ok(st)
    }

    fn write_state(&self) -> Result<RwLockWriteGuard<'_, State>> {
        let st = self.state.write();
        if st.closed {
            return Err(StoreError::Closed);
        }
        Ok(st)
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Spawn the periodic fsync ticker.
fn spawn_flusher(
    state: Arc<RwLock<State>>,
    paths: Vec<PathBuf>,
    interval: Duration,
    stop_rx: crossbeam_channel::Receiver<()>,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("linkvault-fsync".to_string())
        .spawn(move || {
            let ticker = tick(interval);
            loop {
                select! {
                    recv(ticker) -> _ => {
                        let st = state.write();
                        if st.closed {
                            break;
                        }
                        flush_delta_files(&paths);
                    }
                    recv(stop_rx) -> _ => break,
                }
            }
            debug!("fsync ticker stopped");
        })
}

/// Fsync every existing delta file; failures are logged, not fatal.
fn flush_delta_files(paths: &[PathBuf]) {
    for path in paths {
        if let Err(e) = fsync_existing(path) {
            warn!(file = %path.display(), error = %e, "delta fsync failed");
        }
    }
}

fn file_size(path: &Path) -> u64 {
    fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}
