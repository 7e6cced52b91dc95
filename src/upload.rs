//! Chunked upload of the extracted CSV into the document store.

use crate::config::Config;
use crate::io::reader_from_path;
use crate::store::DocumentStore;
use crate::{IngestError, Result};
use csv_async::{AsyncReaderBuilder, StringRecord};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncRead;
use tracing::{debug, error, info, warn};

pub const PRODUCTS_PATH: &str = "products";

/// Characters the store rejects inside a key.
pub const FORBIDDEN_KEY_CHARS: [char; 6] = ['.', '$', '#', '[', ']', '/'];

/// Stored shape of one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDoc {
    pub code: String,
    pub name: String,
    pub ingredients: String,
}

/// Identifier -> document for one chunk, sent as a single partial update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct UploadBatch {
    docs: BTreeMap<String, ProductDoc>,
}

impl UploadBatch {
    pub fn insert(&mut self, doc: ProductDoc) {
        self.docs.insert(doc.code.clone(), doc);
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

#[derive(Debug, Clone)]
pub struct UploadOptions {
    pub chunk_size: usize,
    /// Total attempts per chunk, at least one.
    pub max_retries: u32,
    pub collection: String,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            chunk_size: crate::config::DEFAULT_CHUNK_SIZE,
            max_retries: crate::config::DEFAULT_MAX_RETRIES,
            collection: PRODUCTS_PATH.to_string(),
        }
    }
}

impl From<&Config> for UploadOptions {
    fn from(config: &Config) -> Self {
        Self {
            chunk_size: config.chunk_size,
            max_retries: config.max_retries,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadSummary {
    pub chunks: usize,
    pub uploaded: u64,
    pub total_rows: u64,
    pub skipped: u64,
}

/// A key the store will accept: non-blank with no forbidden characters.
pub fn is_valid_key(code: &str) -> bool {
    !code.is_empty() && !code.contains(&FORBIDDEN_KEY_CHARS[..])
}

/// Data rows in the CSV at `path` (header excluded).
pub async fn count_rows(path: &Path) -> Result<u64> {
    let mut rdr = AsyncReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .buffer_capacity(1 << 20)
        .create_reader(reader_from_path(path).await?);
    let mut record = StringRecord::new();
    let mut rows = 0u64;
    while rdr.read_record(&mut record).await? {
        rows += 1;
    }
    Ok(rows)
}

/// Upload the CSV at `csv_path` chunk by chunk.
pub async fn run_upload<S>(store: &S, csv_path: &Path, options: &UploadOptions) -> Result<UploadSummary>
where
    S: DocumentStore + ?Sized,
{
    let total_rows = count_rows(csv_path).await?;
    info!(total_rows, "Found {} products to upload", total_rows);
    let reader = reader_from_path(csv_path).await?;
    upload_from_reader(store, reader, total_rows, options).await
}

struct UploadColumns {
    code: usize,
    name: Option<usize>,
    ingredients: Option<usize>,
}

impl UploadColumns {
    fn from_headers(headers: &StringRecord) -> Result<Self> {
        let find = |name: &str| headers.iter().position(|h| h == name);
        let code = find("code").ok_or_else(|| {
            IngestError::Config("CSV file has no 'code' column".to_string())
        })?;
        Ok(Self {
            code,
            name: find("product_name"),
            ingredients: find("ingredients_text"),
        })
    }

    /// Build a document from one row; `None` when the key is unusable.
    fn doc(&self, record: &StringRecord) -> Option<ProductDoc> {
        let code = record.get(self.code).unwrap_or_default().trim();
        if code.is_empty() {
            return None;
        }
        if !is_valid_key(code) {
            warn!(code, "Skipping product whose code is not a valid store key");
            return None;
        }
        let field = |idx: Option<usize>| {
            idx.and_then(|i| record.get(i))
                .unwrap_or_default()
                .to_string()
        };
        Some(ProductDoc {
            code: code.to_string(),
            name: field(self.name),
            ingredients: field(self.ingredients),
        })
    }
}

/// Upload CSV rows from `reader`; `total_rows` only feeds progress output.
pub async fn upload_from_reader<S, R>(
    store: &S,
    reader: R,
    total_rows: u64,
    options: &UploadOptions,
) -> Result<UploadSummary>
where
    S: DocumentStore + ?Sized,
    R: AsyncRead + Unpin + Send,
{
    let mut rdr = AsyncReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .buffer_capacity(1 << 20)
        .create_reader(reader);
    let columns = UploadColumns::from_headers(&rdr.headers().await?.clone())?;
    let chunk_size = options.chunk_size.max(1);

    let mut summary = UploadSummary {
        total_rows,
        ..Default::default()
    };
    let mut record = StringRecord::new();
    let mut exhausted = false;

    while !exhausted {
        let mut batch = UploadBatch::default();
        let mut rows_in_chunk = 0usize;
        while rows_in_chunk < chunk_size {
            if !rdr.read_record(&mut record).await? {
                exhausted = true;
                break;
            }
            rows_in_chunk += 1;
            match columns.doc(&record) {
                Some(doc) => batch.insert(doc),
                None => summary.skipped += 1,
            }
        }
        if rows_in_chunk == 0 {
            break;
        }

        let chunk = summary.chunks + 1;
        info!(chunk, rows = rows_in_chunk, "Processing chunk {}...", chunk);
        if batch.is_empty() {
            debug!(chunk, "Chunk has no uploadable rows");
            summary.chunks = chunk;
            continue;
        }

        submit_with_retry(store, &options.collection, &batch.to_value()?, chunk, options.max_retries)
            .await?;
        summary.chunks = chunk;
        summary.uploaded += batch.len() as u64;
        let percent = if summary.total_rows > 0 {
            summary.uploaded as f64 / summary.total_rows as f64 * 100.0
        } else {
            100.0
        };
        info!(
            uploaded = summary.uploaded,
            total = summary.total_rows,
            "Uploaded {} products (Total: {}/{}, {:.2}%)",
            batch.len(),
            summary.uploaded,
            summary.total_rows,
            percent
        );
    }

    Ok(summary)
}

/// Submit one chunk, waiting `2^attempt` seconds between failed attempts.
async fn submit_with_retry<S>(
    store: &S,
    collection: &str,
    batch: &Value,
    chunk: usize,
    max_retries: u32,
) -> Result<()>
where
    S: DocumentStore + ?Sized,
{
    let attempts = max_retries.max(1);
    let mut attempt = 0u32;
    loop {
        match store.update(collection, batch).await {
            Ok(()) => return Ok(()),
            Err(err) if attempt + 1 < attempts => {
                let wait = Duration::from_secs(2u64.pow(attempt));
                warn!(
                    chunk,
                    attempt = attempt + 1,
                    error = %err,
                    "Upload failed, retrying in {} seconds... ({})",
                    wait.as_secs(),
                    err
                );
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
            Err(err) => {
                error!(chunk, attempts, error = %err, "Failed to upload chunk after {} attempts", attempts);
                return Err(IngestError::RetriesExhausted {
                    chunk,
                    attempts,
                    source: Box::new(err),
                });
            }
        }
    }
}
