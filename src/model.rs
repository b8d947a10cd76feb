//! Record types for the four streams, plus the traits the stream stores
//! program against.
//!
//! All IDs are 64-bit signed integers. Timestamps are UTC millisecond
//! epochs on the wire and on disk. Embedded arrays (`tags`, `tabs`) are
//! flattened to JSON strings inside the columnar base files, so the
//! structs here keep them as native Rust collections and the codec does
//! the flattening.

use crate::clock::IdAlloc;
use serde::{Deserialize, Serialize};

/// Sentinel marking a keyed delta entry as a deletion in the legacy
/// record-shaped format (`title` for bookmarks, `name` for sessions).
pub const TOMBSTONE_SENTINEL: &str = "__DELETED__";

/// A saved bookmark. Keyed by `id`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Bookmark {
    pub id: i64,
    pub url: String,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// One browser tab captured inside a session snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tab {
    pub url: String,
    pub title: String,
    pub active: bool,
    pub index: i64,
    #[serde(rename = "favIconUrl")]
    pub fav_icon_url: String,
    pub pinned: bool,
}

/// A saved browser session (a named set of tabs). Keyed by `id`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Session {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub tabs: Vec<Tab>,
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

/// One browsing-history row. Logically keyed by `url` in the caller's
/// sync path; the engine stores it as an append-only log and allows
/// duplicates on disk.
///
/// `source_url`, `source_title` and `link_text` are populated only by the
/// link-click enrichment join; they never reach the history base file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryEntry {
    pub url: String,
    pub title: String,
    pub visit_count: i32,
    pub last_visit_time: i64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub source_url: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub source_title: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub link_text: String,
}

/// One captured link click. Append-only; no logical key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkClick {
    pub id: i64,
    pub destination_url: String,
    pub destination_title: String,
    pub source_url: String,
    pub source_title: String,
    pub link_text: String,
    /// external_link, internal_link or form_submit
    pub click_type: String,
    pub domain: String,
    pub is_new_tab: bool,
    pub timestamp: i64,
    pub created_at: i64,
}

/// Contract for mutable keyed records (bookmarks, sessions).
///
/// The stream store uses these accessors to upsert by ID, stamp
/// timestamps, and recognize legacy sentinel tombstones during recovery.
pub trait Keyed {
    fn id(&self) -> i64;
    fn set_id(&mut self, id: i64);
    fn created_at(&self) -> i64;
    fn set_created_at(&mut self, ts_ms: i64);
    fn updated_at(&self) -> i64;
    fn set_updated_at(&mut self, ts_ms: i64);
    /// True when this record is a legacy record-shaped tombstone.
    fn is_tombstone(&self) -> bool;
}

impl Keyed for Bookmark {
    fn id(&self) -> i64 {
        self.id
    }
    fn set_id(&mut self, id: i64) {
        self.id = id;
    }
    fn created_at(&self) -> i64 {
        self.created_at
    }
    fn set_created_at(&mut self, ts_ms: i64) {
        self.created_at = ts_ms;
    }
    fn updated_at(&self) -> i64 {
        self.updated_at
    }
    fn set_updated_at(&mut self, ts_ms: i64) {
        self.updated_at = ts_ms;
    }
    fn is_tombstone(&self) -> bool {
        self.title == TOMBSTONE_SENTINEL
    }
}

impl Keyed for Session {
    fn id(&self) -> i64 {
        self.id
    }
    fn set_id(&mut self, id: i64) {
        self.id = id;
    }
    fn created_at(&self) -> i64 {
        self.created_at
    }
    fn set_created_at(&mut self, ts_ms: i64) {
        self.created_at = ts_ms;
    }
    fn updated_at(&self) -> i64 {
        self.updated_at
    }
    fn set_updated_at(&mut self, ts_ms: i64) {
        self.updated_at = ts_ms;
    }
    fn is_tombstone(&self) -> bool {
        self.name == TOMBSTONE_SENTINEL
    }
}

/// Contract for append-only records (history, link clicks).
///
/// `stamp` fills engine-populated fields before the record is appended:
/// a fresh ID when the caller passed zero, and the creation timestamp
/// when unset. Types without those fields leave it a no-op.
pub trait AppendOnly {
    fn stamp(&mut self, ids: &IdAlloc, now_ms: i64);
}

impl AppendOnly for HistoryEntry {
    fn stamp(&mut self, _ids: &IdAlloc, _now_ms: i64) {}
}

impl AppendOnly for LinkClick {
    fn stamp(&mut self, ids: &IdAlloc, now_ms: i64) {
        if self.id == 0 {
            self.id = ids.next();
        }
        if self.created_at == 0 {
            self.created_at = now_ms;
        }
    }
}
