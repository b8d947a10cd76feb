//! Error types for linkvault
//!
//! This module defines the error hierarchy for the storage engine:
//! - I/O failures from the filesystem (delta appends, fsync, rename)
//! - Base-file codec failures (Parquet/Arrow parse or schema mismatch)
//! - Delta-line serialization failures
//! - Lifecycle errors (operations on a closed engine)
//!
//! Design philosophy:
//! - Use thiserror for structured error types in library code
//! - I/O errors propagate unchanged; the engine never retries
//! - A corrupt delta line is a warning during recovery, never an error

use thiserror::Error;

/// Top-level error type for the linkvault storage engine
#[derive(Error, Debug)]
pub enum StoreError {
    /// I/O errors (open, write, fsync, rename)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Base-file codec errors
    #[error("base file error: {0}")]
    Codec(#[from] CodecError),

    /// Delta-line (de)serialization errors
    #[error("delta serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// A keyed record the caller expected to exist is absent.
    ///
    /// The engine itself never verifies existence on update/delete;
    /// this variant is for the caller layer's pre-write checks.
    #[error("{stream} record {id} not found")]
    NotFound { stream: &'static str, id: i64 },

    /// Operation invoked after `close()`
    #[error("engine is closed")]
    Closed,
}

/// Base-file parse or schema failures.
///
/// Fatal for the `read()` call that hit them; the engine remains usable.
#[derive(Error, Debug)]
pub enum CodecError {
    /// Parquet-level failure
    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// Arrow-level failure (batch construction, invalid arrays)
    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// The base file decoded, but its columns don't match the stream schema
    #[error("schema mismatch in {file}: {reason}")]
    Schema { file: String, reason: String },
}

/// Result type alias for StoreError
pub type Result<T> = std::result::Result<T, StoreError>;
