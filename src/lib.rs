//! Streaming product extraction and document-store sync.
//!
//! - Extraction: a Parquet dump is read batch by batch, mapped onto three
//!   logical fields, normalized, deduplicated by product code, and written to
//!   a CSV file (optionally gzip/zstd compressed).
//! - Upload: the CSV is pushed in chunks to a keyed document store with
//!   bounded exponential backoff.
//! - Lookup: point reads against the store for manual verification.
//!
//! Data shape:
//! - `RawValue` cells (`Null | Text | Number | List`) grouped in `RowBatch`es
//! - `NormalizedRecord` rows in `ColumnMapping` order
#![cfg_attr(docsrs, feature(doc_cfg))]
//
pub mod config;
pub mod extract;
mod io;
pub mod logging;
pub mod lookup;
pub mod normalize;
pub mod schema;
pub mod source;
pub mod store;
pub mod upload;

pub use crate::config::Config;
pub use crate::extract::{
    extract, extract_parquet, run_extraction, DedupIndex, ExtractReport, ExtractSummary,
    NormalizedRecord, RecordSink, RunState, StreamingExtractor,
};
pub use crate::io::{reader_from_path, writer_to_path, Compression};
pub use crate::lookup::{lookup_product, lookup_products, LookupOutcome, StoredProduct};
pub use crate::normalize::{normalize, recover_text, RawValue};
pub use crate::schema::{resolve_columns, ColumnMapping, LogicalField};
pub use crate::source::{BatchSource, MemorySource, ParquetSource, RawRow, RowBatch};
pub use crate::store::{verify_connection, DocumentStore, MemoryStore, RealtimeDb, ServiceAccount};
pub use crate::upload::{
    run_upload, upload_from_reader, ProductDoc, UploadBatch, UploadOptions, UploadSummary,
};

use std::path::PathBuf;
use thiserror::Error;

/// Error type returned by this crate; binaries wrap it in `anyhow`.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("{what} not found: {}", path.display())]
    MissingFile { what: &'static str, path: PathBuf },
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Store returned {status} for {path}: {body}")]
    StoreStatus {
        path: String,
        status: u16,
        body: String,
    },
    #[error("Connection verification failed: {0}")]
    Connection(String),
    #[error("Failed to upload chunk {chunk} after {attempts} attempts: {source}")]
    RetriesExhausted {
        chunk: usize,
        attempts: u32,
        #[source]
        source: Box<IngestError>,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] csv_async::Error),
    #[error(transparent)]
    Parquet(#[from] parquet::errors::ParquetError),
    #[error(transparent)]
    Arrow(#[from] arrow_schema::ArrowError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, IngestError>;

/// Byte count rendered as megabytes with two decimals.
pub fn format_megabytes(bytes: u64) -> String {
    format!("{:.2} MB", bytes as f64 / (1024.0 * 1024.0))
}
