//! linkvault - Bookmark and browsing-history store
//!
//! A single-process storage engine for four record streams (bookmarks,
//! sessions, browsing history, link clicks), built for durable, crash-safe
//! single-record writes on top of a columnar bulk-replace base format.
//!
//! # Features
//!
//! - **Hybrid persistence**: each stream pairs a Parquet base file
//!   (snapshot as of the last compaction) with an append-only JSON-lines
//!   delta log, merged on read.
//!
//! - **Durable acks**: a mutation returns only after its delta line is
//!   written and fsync'd; a crash at any later instant preserves it.
//!
//! - **Crash recovery**: reopening a directory replays the delta files
//!   line by line, tolerating a torn trailing write.
//!
//! - **Inline compaction**: when a stream accumulates enough delta
//!   entries the base is rewritten from the merged view and the delta
//!   truncated, invisibly to readers.
//!
//! # Architecture
//!
//! ```text
//!                          ┌─────────────────────┐
//!                          │       Engine        │
//!                          │  RwLock, fsync tick │
//!                          └──────────┬──────────┘
//!            ┌────────────┬───────────┴┬─────────────┐
//!            ▼            ▼            ▼             ▼
//!      ┌──────────┐ ┌──────────┐ ┌──────────┐ ┌────────────┐
//!      │bookmarks │ │ sessions │ │ history  │ │link_clicks │
//!      │ (keyed)  │ │ (keyed)  │ │ (append) │ │  (append)  │
//!      └────┬─────┘ └────┬─────┘ └────┬─────┘ └─────┬──────┘
//!           │            │            │             │
//!      base+delta   base+delta   base+delta    base+delta
//!      .parquet     .parquet     .parquet      .parquet
//!      .delta.json  .delta.json  .delta.json   .delta.json
//! ```
//!
//! Reads take the engine lock shared and materialize `base ++ delta`
//! (keyed streams overlay by ID with tombstones; append streams
//! concatenate). Writes take it exclusive, append one fsync'd JSON line,
//! and compact inline past the threshold.
//!
//! # Example
//!
//! ```no_run
//! use linkvault::{Bookmark, Engine};
//!
//! let engine = Engine::open_dir("./data")?;
//! let stored = engine.add_bookmark(Bookmark {
//!     url: "https://example.com".into(),
//!     title: "Example".into(),
//!     tags: vec!["docs".into()],
//!     ..Default::default()
//! })?;
//! assert_ne!(stored.id, 0);
//! engine.close()?;
//! # Ok::<(), linkvault::StoreError>(())
//! ```

pub mod base;
pub mod clock;
pub mod delta;
pub mod engine;
pub mod error;
pub mod history;
pub mod model;
pub mod stream;

pub use engine::{Engine, EngineConfig, EngineStats, StreamKind, StreamStats};
pub use error::{CodecError, Result, StoreError};
pub use model::{Bookmark, HistoryEntry, LinkClick, Session, Tab};
