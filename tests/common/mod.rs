#![allow(dead_code)]

use async_trait::async_trait;
use csv_async::{AsyncReaderBuilder, StringRecord};
use food_ingest::{reader_from_path, DocumentStore, IngestError, MemoryStore, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

/// Header plus every data row of a (possibly compressed) CSV.
pub async fn read_csv(path: &Path) -> anyhow::Result<(Vec<String>, Vec<Vec<String>>)> {
    let mut rdr = AsyncReaderBuilder::new()
        .has_headers(true)
        .create_reader(reader_from_path(path).await?);
    let headers = rdr.headers().await?.iter().map(str::to_string).collect();
    let mut rows = Vec::new();
    let mut record = StringRecord::new();
    while rdr.read_record(&mut record).await? {
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok((headers, rows))
}

/// CSV text with `rows` products keyed `P000000`, `P000001`, ...
pub fn product_csv(rows: usize) -> String {
    let mut out = String::from("code,ingredients_text,product_name\n");
    for i in 0..rows {
        out.push_str(&format!("P{i:06},water,Product {i}\n"));
    }
    out
}

/// Store that records every update attempt and can be told to fail some.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    /// Size of the payload of every `update` call, failed ones included.
    attempts: Mutex<Vec<usize>>,
    /// Remaining forced failures keyed by 1-based chunk number.
    failures: Mutex<HashMap<usize, u32>>,
    completed: Mutex<usize>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `times` attempts at chunk `chunk`.
    pub fn fail_chunk(self, chunk: usize, times: u32) -> Self {
        self.failures.lock().unwrap().insert(chunk, times);
        self
    }

    pub fn attempts(&self) -> Vec<usize> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl DocumentStore for FlakyStore {
    async fn update(&self, path: &str, value: &Value) -> Result<()> {
        let size = value.as_object().map_or(0, |m| m.len());
        self.attempts.lock().unwrap().push(size);

        let chunk = *self.completed.lock().unwrap() + 1;
        {
            let mut failures = self.failures.lock().unwrap();
            if let Some(left) = failures.get_mut(&chunk) {
                if *left > 0 {
                    *left -= 1;
                    return Err(IngestError::StoreStatus {
                        path: path.to_string(),
                        status: 503,
                        body: "unavailable".to_string(),
                    });
                }
            }
        }

        self.inner.update(path, value).await?;
        *self.completed.lock().unwrap() += 1;
        Ok(())
    }

    async fn set(&self, path: &str, value: &Value) -> Result<()> {
        self.inner.set(path, value).await
    }

    async fn get(&self, path: &str) -> Result<Option<Value>> {
        self.inner.get(path).await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.inner.delete(path).await
    }
}
