//! Caller-level history operations
//!
//! The engine stores history as a raw append log and performs no
//! URL-level deduplication. The two operations that need the logical
//! "one row per URL" view live here, on top of the engine's public
//! read/replace contract:
//!
//! - `sync` merges an incoming batch by URL (newer `last_visit_time`
//!   wins) and hands the merged set back as a bulk replace.
//! - `enriched` joins history rows with their most recent link click by
//!   destination URL, copying the click's source fields onto entries
//!   visited on the same UTC calendar day.

use crate::engine::Engine;
use crate::error::Result;
use crate::model::{HistoryEntry, LinkClick};
use chrono::{DateTime, NaiveDate};
use std::collections::HashMap;
use tracing::warn;

/// Merge `incoming` into the stored history by URL and persist the result.
///
/// An incoming entry replaces the stored one only when its
/// `last_visit_time` is strictly newer; unknown URLs are inserted.
/// Returns how many entries were inserted or replaced.
///
/// Callers are expected to serialize syncs among themselves: the
/// read-merge-replace sequence takes the engine lock twice, so two
/// interleaved syncs could drop each other's batch.
pub fn sync(engine: &Engine, incoming: Vec<HistoryEntry>) -> Result<usize> {
    let existing = engine.read_history()?;

    let mut by_url: HashMap<String, HistoryEntry> = HashMap::new();
    for entry in existing {
        by_url.insert(entry.url.clone(), entry);
    }

    let mut synced = 0;
    for entry in incoming {
        match by_url.get(&entry.url) {
            Some(current) if entry.last_visit_time <= current.last_visit_time => {}
            _ => {
                by_url.insert(entry.url.clone(), entry);
                synced += 1;
            }
        }
    }

    let merged: Vec<HistoryEntry> = by_url.into_values().collect();
    engine.replace_history(&merged)?;
    Ok(synced)
}

/// Read history and enrich it with link-click provenance.
///
/// If the link-click read fails, the unenriched history is returned.
pub fn enriched(engine: &Engine) -> Result<Vec<HistoryEntry>> {
    let history = engine.read_history()?;
    match engine.read_link_clicks() {
        Ok(clicks) => Ok(enrich(history, &clicks)),
        Err(e) => {
            warn!(error = %e, "link-click read failed, returning unenriched history");
            Ok(history)
        }
    }
}

/// Join history entries with the most recent click per destination URL.
///
/// A click contributes its `source_url`, `source_title` and `link_text`
/// to an entry only when both timestamps fall on the same UTC calendar
/// day.
pub fn enrich(history: Vec<HistoryEntry>, clicks: &[LinkClick]) -> Vec<HistoryEntry> {
    let mut newest: HashMap<&str, &LinkClick> = HashMap::new();
    for click in clicks {
        match newest.get(click.destination_url.as_str()) {
            Some(current) if click.timestamp <= current.timestamp => {}
            _ => {
                newest.insert(click.destination_url.as_str(), click);
            }
        }
    }

    history
        .into_iter()
        .map(|mut entry| {
            if let Some(click) = newest.get(entry.url.as_str()) {
                if same_utc_day(click.timestamp, entry.last_visit_time) {
                    entry.source_url = click.source_url.clone();
                    entry.source_title = click.source_title.clone();
                    entry.link_text = click.link_text.clone();
                }
            }
            entry
        })
        .collect()
}

fn utc_day(ts_ms: i64) -> Option<NaiveDate> {
    DateTime::from_timestamp_millis(ts_ms).map(|dt| dt.date_naive())
}

fn same_utc_day(a_ms: i64, b_ms: i64) -> bool {
    match (utc_day(a_ms), utc_day(b_ms)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}
