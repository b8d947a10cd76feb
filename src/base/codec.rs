//! Record <-> Parquet conversion for the base files
//!
//! Writes a whole stream as one RecordBatch with ZSTD compression, then
//! atomically replaces the previous base (write to a sibling temp file,
//! rename over the target, fsync the directory). Readers that find no
//! base file treat the stream as empty.

use crate::base::schema::{bookmark_schema, history_schema, link_click_schema, session_schema};
use crate::error::{CodecError, Result};
use crate::model::{Bookmark, HistoryEntry, LinkClick, Session};
use arrow::array::{
    ArrayRef, BooleanArray, BooleanBuilder, Int32Array, Int32Builder, Int64Array, Int64Builder,
    StringArray, StringBuilder, TimestampMillisecondArray, TimestampMillisecondBuilder,
};
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::WriterProperties;
use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;

/// ZSTD compression level for base files
const ZSTD_LEVEL: i32 = 3;

/// A record type with a columnar base representation.
pub trait Columnar: Sized {
    /// Stream name; also the base/delta file stem (`<STREAM>.parquet`).
    const STREAM: &'static str;

    fn schema() -> SchemaRef;
    fn to_batch(rows: &[Self]) -> std::result::Result<RecordBatch, CodecError>;
    fn from_batch(batch: &RecordBatch) -> std::result::Result<Vec<Self>, CodecError>;
}

/// Write `rows` as a fresh base file, atomically replacing any previous one.
pub fn write_base<T: Columnar>(path: &Path, rows: &[T]) -> Result<()> {
    let batch = T::to_batch(rows)?;
    let props = writer_properties()?;

    let tmp = path.with_extension("parquet.tmp");
    let file = File::create(&tmp)?;
    let mut writer =
        ArrowWriter::try_new(file, T::schema(), Some(props)).map_err(CodecError::Parquet)?;
    writer.write(&batch).map_err(CodecError::Parquet)?;
    let file = writer.into_inner().map_err(CodecError::Parquet)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&tmp, path)?;
    sync_parent_dir(path);
    Ok(())
}

/// Read the whole base file. A missing file is an empty stream.
pub fn read_base<T: Columnar>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(path)?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)
        .map_err(CodecError::Parquet)?
        .build()
        .map_err(CodecError::Parquet)?;

    let mut rows = Vec::new();
    for batch in reader {
        let batch = batch.map_err(CodecError::Arrow)?;
        rows.extend(T::from_batch(&batch)?);
    }
    Ok(rows)
}

fn writer_properties() -> std::result::Result<WriterProperties, CodecError> {
    let level = ZstdLevel::try_new(ZSTD_LEVEL)?;
    Ok(WriterProperties::builder()
        .set_compression(Compression::ZSTD(level))
        .build())
}

/// Make the rename durable where the platform allows it.
#[cfg(unix)]
fn sync_parent_dir(path: &Path) {
    if let Some(parent) = path.parent() {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) {}

/// Downcast one column, reporting a schema mismatch on failure.
fn col<'a, A: 'static>(
    batch: &'a RecordBatch,
    idx: usize,
    name: &str,
    stream: &'static str,
) -> std::result::Result<&'a A, CodecError> {
    batch
        .columns()
        .get(idx)
        .and_then(|array| array.as_any().downcast_ref::<A>())
        .ok_or_else(|| CodecError::Schema {
            file: format!("{stream}.parquet"),
            reason: format!("column {idx} ({name}) missing or mistyped"),
        })
}

fn expect_columns(
    batch: &RecordBatch,
    want: usize,
    stream: &'static str,
) -> std::result::Result<(), CodecError> {
    if batch.num_columns() != want {
        return Err(CodecError::Schema {
            file: format!("{stream}.parquet"),
            reason: format!("expected {want} columns, found {}", batch.num_columns()),
        });
    }
    Ok(())
}

impl Columnar for Bookmark {
    const STREAM: &'static str = "bookmarks";

    fn schema() -> SchemaRef {
        bookmark_schema()
    }

    fn to_batch(rows: &[Self]) -> std::result::Result<RecordBatch, CodecError> {
        let mut b_id = Int64Builder::new();
        let mut b_url = StringBuilder::new();
        let mut b_title = StringBuilder::new();
        let mut b_description = StringBuilder::new();
        let mut b_tags = StringBuilder::new();
        let mut b_created = TimestampMillisecondBuilder::new();
        let mut b_updated = TimestampMillisecondBuilder::new();

        for row in rows {
            b_id.append_value(row.id);
            b_url.append_value(&row.url);
            b_title.append_value(&row.title);
            b_description.append_value(&row.description);
            b_tags.append_value(serde_json::to_string(&row.tags).unwrap_or_default());
            b_created.append_value(row.created_at);
            b_updated.append_value(row.updated_at);
        }

        let columns: Vec<ArrayRef> = vec![
            Arc::new(b_id.finish()),
            Arc::new(b_url.finish()),
            Arc::new(b_title.finish()),
            Arc::new(b_description.finish()),
            Arc::new(b_tags.finish()),
            Arc::new(b_created.finish()),
            Arc::new(b_updated.finish()),
        ];
        Ok(RecordBatch::try_new(Self::schema(), columns)?)
    }

    fn from_batch(batch: &RecordBatch) -> std::result::Result<Vec<Self>, CodecError> {
        expect_columns(batch, 7, Self::STREAM)?;
        let ids: &Int64Array = col(batch, 0, "id", Self::STREAM)?;
        let urls: &StringArray = col(batch, 1, "url", Self::STREAM)?;
        let titles: &StringArray = col(batch, 2, "title", Self::STREAM)?;
        let descriptions: &StringArray = col(batch, 3, "description", Self::STREAM)?;
        let tags: &StringArray = col(batch, 4, "tags", Self::STREAM)?;
        let created: &TimestampMillisecondArray = col(batch, 5, "created_at", Self::STREAM)?;
        let updated: &TimestampMillisecondArray = col(batch, 6, "updated_at", Self::STREAM)?;

        let mut rows = Vec::with_capacity(batch.num_rows());
        for i in 0..batch.num_rows() {
            rows.push(Bookmark {
                id: ids.value(i),
                url: urls.value(i).to_string(),
                title: titles.value(i).to_string(),
                description: descriptions.value(i).to_string(),
                tags: serde_json::from_str(tags.value(i)).unwrap_or_default(),
                created_at: created.value(i),
                updated_at: updated.value(i),
            });
        }
        Ok(rows)
    }
}

impl Columnar for Session {
    const STREAM: &'static str = "sessions";

    fn schema() -> SchemaRef {
        session_schema()
    }

    fn to_batch(rows: &[Self]) -> std::result::Result<RecordBatch, CodecError> {
        let mut b_id = Int64Builder::new();
        let mut b_name = StringBuilder::new();
        let mut b_description = StringBuilder::new();
        let mut b_tabs = StringBuilder::new();
        let mut b_active = BooleanBuilder::new();
        let mut b_created = TimestampMillisecondBuilder::new();
        let mut b_updated = TimestampMillisecondBuilder::new();

        for row in rows {
            b_id.append_value(row.id);
            b_name.append_value(&row.name);
            b_description.append_value(&row.description);
            b_tabs.append_value(serde_json::to_string(&row.tabs).unwrap_or_default());
            b_active.append_value(row.is_active);
            b_created.append_value(row.created_at);
            b_updated.append_value(row.updated_at);
        }

        let columns: Vec<ArrayRef> = vec![
            Arc::new(b_id.finish()),
            Arc::new(b_name.finish()),
            Arc::new(b_description.finish()),
            Arc::new(b_tabs.finish()),
            Arc::new(b_active.finish()),
            Arc::new(b_created.finish()),
            Arc::new(b_updated.finish()),
        ];
        Ok(RecordBatch::try_new(Self::schema(), columns)?)
    }

    fn from_batch(batch: &RecordBatch) -> std::result::Result<Vec<Self>, CodecError> {
        expect_columns(batch, 7, Self::STREAM)?;
        let ids: &Int64Array = col(batch, 0, "id", Self::STREAM)?;
        let names: &StringArray = col(batch, 1, "name", Self::STREAM)?;
        let descriptions: &StringArray = col(batch, 2, "description", Self::STREAM)?;
        let tabs: &StringArray = col(batch, 3, "tabs", Self::STREAM)?;
        let active: &BooleanArray = col(batch, 4, "is_active", Self::STREAM)?;
        let created: &TimestampMillisecondArray = col(batch, 5, "created_at", Self::STREAM)?;
        let updated: &TimestampMillisecondArray = col(batch, 6, "updated_at", Self::STREAM)?;

        let mut rows = Vec::with_capacity(batch.num_rows());
        for i in 0..batch.num_rows() {
            rows.push(Session {
                id: ids.value(i),
                name: names.value(i).to_string(),
                description: descriptions.value(i).to_string(),
                tabs: serde_json::from_str(tabs.value(i)).unwrap_or_default(),
                is_active: active.value(i),
                created_at: created.value(i),
                updated_at: updated.value(i),
            });
        }
        Ok(rows)
    }
}

impl Columnar for HistoryEntry {
    const STREAM: &'static str = "history";

    fn schema() -> SchemaRef {
        history_schema()
    }

    fn to_batch(rows: &[Self]) -> std::result::Result<RecordBatch, CodecError> {
        let mut b_url = StringBuilder::new();
        let mut b_title = StringBuilder::new();
        let mut b_visits = Int32Builder::new();
        let mut b_last_visit = TimestampMillisecondBuilder::new();

        for row in rows {
            b_url.append_value(&row.url);
            b_title.append_value(&row.title);
            b_visits.append_value(row.visit_count);
            b_last_visit.append_value(row.last_visit_time);
        }

        let columns: Vec<ArrayRef> = vec![
            Arc::new(b_url.finish()),
            Arc::new(b_title.finish()),
            Arc::new(b_visits.finish()),
            Arc::new(b_last_visit.finish()),
        ];
        Ok(RecordBatch::try_new(Self::schema(), columns)?)
    }

    fn from_batch(batch: &RecordBatch) -> std::result::Result<Vec<Self>, CodecError> {
        expect_columns(batch, 4, Self::STREAM)?;
        let urls: &StringArray = col(batch, 0, "url", Self::STREAM)?;
        let titles: &StringArray = col(batch, 1, "title", Self::STREAM)?;
        let visits: &Int32Array = col(batch, 2, "visit_count", Self::STREAM)?;
        let last_visit: &TimestampMillisecondArray =
            col(batch, 3, "last_visit_time", Self::STREAM)?;

        let mut rows = Vec::with_capacity(batch.num_rows());
        for i in 0..batch.num_rows() {
            rows.push(HistoryEntry {
                url: urls.value(i).to_string(),
                title: titles.value(i).to_string(),
                visit_count: visits.value(i),
                last_visit_time: last_visit.value(i),
                ..Default::default()
            });
        }
        Ok(rows)
    }
}

impl Columnar for LinkClick {
    const STREAM: &'static str = "link_clicks";

    fn schema() -> SchemaRef {
        link_click_schema()
    }

    fn to_batch(rows: &[Self]) -> std::result::Result<RecordBatch, CodecError> {
        let mut b_id = Int64Builder::new();
        let mut b_dest_url = StringBuilder::new();
        let mut b_dest_title = StringBuilder::new();
        let mut b_src_url = StringBuilder::new();
        let mut b_src_title = StringBuilder::new();
        let mut b_link_text = StringBuilder::new();
        let mut b_click_type = StringBuilder::new();
        let mut b_domain = StringBuilder::new();
        let mut b_new_tab = BooleanBuilder::new();
        let mut b_timestamp = TimestampMillisecondBuilder::new();
        let mut b_created = TimestampMillisecondBuilder::new();

        for row in rows {
            b_id.append_value(row.id);
            b_dest_url.append_value(&row.destination_url);
            b_dest_title.append_value(&row.destination_title);
            b_src_url.append_value(&row.source_url);
            b_src_title.append_value(&row.source_title);
            b_link_text.append_value(&row.link_text);
            b_click_type.append_value(&row.click_type);
            b_domain.append_value(&row.domain);
            b_new_tab.append_value(row.is_new_tab);
            b_timestamp.append_value(row.timestamp);
            b_created.append_value(row.created_at);
        }

        let columns: Vec<ArrayRef> = vec![
            Arc::new(b_id.finish()),
            Arc::new(b_dest_url.finish()),
            Arc::new(b_dest_title.finish()),
            Arc::new(b_src_url.finish()),
            Arc::new(b_src_title.finish()),
            Arc::new(b_link_text.finish()),
            Arc::new(b_click_type.finish()),
            Arc::new(b_domain.finish()),
            Arc::new(b_new_tab.finish()),
            Arc::new(b_timestamp.finish()),
            Arc::new(b_created.finish()),
        ];
        Ok(RecordBatch::try_new(Self::schema(), columns)?)
    }

    fn from_batch(batch: &RecordBatch) -> std::result::Result<Vec<Self>, CodecError> {
        expect_columns(batch, 11, Self::STREAM)?;
        let ids: &Int64Array = col(batch, 0, "id", Self::STREAM)?;
        let dest_urls: &StringArray = col(batch, 1, "destination_url", Self::STREAM)?;
        let dest_titles: &StringArray = col(batch, 2, "destination_title", Self::STREAM)?;
        let src_urls: &StringArray = col(batch, 3, "source_url", Self::STREAM)?;
        let src_titles: &StringArray = col(batch, 4, "source_title", Self::STREAM)?;
        let link_texts: &StringArray = col(batch, 5, "link_text", Self::STREAM)?;
        let click_types: &StringArray = col(batch, 6, "click_type", Self::STREAM)?;
        let domains: &StringArray = col(batch, 7, "domain", Self::STREAM)?;
        let new_tabs: &BooleanArray = col(batch, 8, "is_new_tab", Self::STREAM)?;
        let timestamps: &TimestampMillisecondArray = col(batch, 9, "timestamp", Self::STREAM)?;
        let created: &TimestampMillisecondArray = col(batch, 10, "created_at", Self::STREAM)?;

        let mut rows = Vec::with_capacity(batch.num_rows());
        for i in 0..batch.num_rows() {
            rows.push(LinkClick {
                id: ids.value(i),
                destination_url: dest_urls.value(i).to_string(),
                destination_title: dest_titles.value(i).to_string(),
                source_url: src_urls.value(i).to_string(),
                source_title: src_titles.value(i).to_string(),
                link_text: link_texts.value(i).to_string(),
                click_type: click_types.value(i).to_string(),
                domain: domains.value(i).to_string(),
                is_new_tab: new_tabs.value(i),
                timestamp: timestamps.value(i),
                created_at: created.value(i),
            });
        }
        Ok(rows)
    }
}
