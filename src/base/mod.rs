//! Columnar base files
//!
//! Each stream's base file is a Parquet snapshot of the stream as of the
//! last compaction, replaced whole on every rewrite.
//!
//! # Module Structure
//!
//! - `schema`: the four Arrow schemas (one per stream)
//! - `codec`: record <-> RecordBatch conversion, atomic file replace

pub mod codec;
pub mod schema;

pub use codec::{read_base, write_base, Columnar};
