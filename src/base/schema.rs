//! Arrow schemas for the base files
//!
//! Single source of truth for the column layout of each stream. Column
//! order is part of the on-disk contract; embedded arrays (`tags`,
//! `tabs`) are JSON-encoded strings because the base format is flat.

use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use std::sync::Arc;

fn ts_ms() -> DataType {
    DataType::Timestamp(TimeUnit::Millisecond, None)
}

/// Bookmark base schema (7 columns).
pub fn bookmark_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("url", DataType::Utf8, false),
        Field::new("title", DataType::Utf8, false),
        Field::new("description", DataType::Utf8, false),
        Field::new("tags", DataType::Utf8, false),
        Field::new("created_at", ts_ms(), false),
        Field::new("updated_at", ts_ms(), false),
    ]))
}

/// Session base schema (7 columns).
pub fn session_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("name", DataType::Utf8, false),
        Field::new("description", DataType::Utf8, false),
        Field::new("tabs", DataType::Utf8, false),
        Field::new("is_active", DataType::Boolean, false),
        Field::new("created_at", ts_ms(), false),
        Field::new("updated_at", ts_ms(), false),
    ]))
}

/// History base schema (4 columns).
pub fn history_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("url", DataType::Utf8, false),
        Field::new("title", DataType::Utf8, false),
        Field::new("visit_count", DataType::Int32, false),
        Field::new("last_visit_time", ts_ms(), false),
    ]))
}

/// Link-click base schema (11 columns).
pub fn link_click_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("destination_url", DataType::Utf8, false),
        Field::new("destination_title", DataType::Utf8, false),
        Field::new("source_url", DataType::Utf8, false),
        Field::new("source_title", DataType::Utf8, false),
        Field::new("link_text", DataType::Utf8, false),
        Field::new("click_type", DataType::Utf8, false),
        Field::new("domain", DataType::Utf8, false),
        Field::new("is_new_tab", DataType::Boolean, false),
        Field::new("timestamp", ts_ms(), false),
        Field::new("created_at", ts_ms(), false),
    ]))
}
