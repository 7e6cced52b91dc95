//! Streaming extraction: resolve columns once, then normalize and
//! deduplicate rows batch by batch, writing each kept record immediately.

use crate::io::writer_to_path;
use crate::normalize::normalize;
use crate::schema::{resolve_columns, ColumnMapping, LogicalField};
use crate::source::{BatchSource, ParquetSource, RawRow, RowBatch, RowBatchStream};
use crate::{IngestError, Result};
use csv_async::{AsyncWriter, AsyncWriterBuilder};
use futures::StreamExt;
use std::collections::HashSet;
use std::future::Future;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{error, info, warn};

pub const DEFAULT_BATCH_SIZE: usize = 10_000;

/// Identifiers accepted so far in one run. Only ever grows.
#[derive(Debug, Default, Clone)]
pub struct DedupIndex {
    seen: HashSet<String>,
}

impl DedupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.seen.contains(identifier)
    }

    /// Returns false when the identifier was already present.
    pub fn insert(&mut self, identifier: String) -> bool {
        self.seen.insert(identifier)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// One kept row, values in mapping order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedRecord {
    values: Vec<(LogicalField, String)>,
}

impl NormalizedRecord {
    pub fn get(&self, field: LogicalField) -> Option<&str> {
        self.values
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, v)| v.as_str())
    }

    pub fn identifier(&self) -> &str {
        self.get(LogicalField::Identifier).unwrap_or_default()
    }

    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Init,
    Streaming,
    Done,
    Failed,
}

/// Cumulative counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    pub batches: u64,
    pub rows_seen: u64,
    pub kept: u64,
    pub missing_identifier: u64,
    pub duplicates: u64,
}

/// Append-only CSV output with the header fixed by the mapping.
pub struct RecordSink<W: AsyncWrite + Unpin> {
    writer: AsyncWriter<W>,
    written: u64,
}

impl<W> RecordSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    /// Wrap `inner` and write the header row.
    pub async fn create(inner: W, mapping: &ColumnMapping) -> Result<Self> {
        let mut writer = AsyncWriterBuilder::new().create_writer(inner);
        writer.write_record(mapping.header()).await?;
        Ok(Self { writer, written: 0 })
    }

    pub async fn write(&mut self, record: &NormalizedRecord) -> Result<()> {
        self.writer.write_record(record.values()).await?;
        self.written += 1;
        Ok(())
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    /// Flush, shut the underlying writer down, and hand it back.
    pub async fn finish(self) -> Result<W> {
        let mut inner = self.writer.into_inner().await.map_err(IngestError::Io)?;
        inner.shutdown().await?;
        Ok(inner)
    }
}

/// Applies the mapping, the normalizer, and first-seen-wins dedup to rows.
pub struct StreamingExtractor<'a> {
    mapping: &'a ColumnMapping,
    index: &'a mut DedupIndex,
    summary: ExtractSummary,
}

impl<'a> StreamingExtractor<'a> {
    pub fn new(mapping: &'a ColumnMapping, index: &'a mut DedupIndex) -> Self {
        Self {
            mapping,
            index,
            summary: ExtractSummary::default(),
        }
    }

    pub fn summary(&self) -> &ExtractSummary {
        &self.summary
    }

    /// Decide one row. Every row counts as seen; only new, non-empty
    /// identifiers produce a record.
    pub fn accept_row(&mut self, row: RawRow<'_>) -> Option<NormalizedRecord> {
        self.summary.rows_seen += 1;

        let cell = self
            .mapping
            .source_for(LogicalField::Identifier)
            .and_then(|col| row.get(col))
            .filter(|v| v.is_present());
        let Some(cell) = cell else {
            self.summary.missing_identifier += 1;
            return None;
        };

        let identifier = normalize(cell);
        if identifier.is_empty() {
            self.summary.missing_identifier += 1;
            return None;
        }
        if self.index.contains(&identifier) {
            self.summary.duplicates += 1;
            return None;
        }
        self.index.insert(identifier.clone());

        let mut identifier = Some(identifier);
        let values = self
            .mapping
            .iter()
            .map(|(field, col)| {
                let text = match field {
                    LogicalField::Identifier => identifier.take().unwrap_or_default(),
                    _ => row.get(col).map(normalize).unwrap_or_default(),
                };
                (field, text)
            })
            .collect();
        self.summary.kept += 1;
        Some(NormalizedRecord { values })
    }

    pub async fn process_batch<W>(&mut self, batch: &RowBatch, sink: &mut RecordSink<W>) -> Result<()>
    where
        W: AsyncWrite + Unpin + Send,
    {
        for row in batch.rows() {
            if let Some(record) = self.accept_row(row) {
                sink.write(&record).await?;
            }
        }
        self.summary.batches += 1;
        info!(
            batch = self.summary.batches,
            rows = self.summary.rows_seen,
            kept = self.summary.kept,
            "Processed {} rows, kept {} unique items",
            self.summary.rows_seen,
            self.summary.kept
        );
        Ok(())
    }

    /// Drain `batches` in order into `sink`.
    pub async fn run<W>(&mut self, mut batches: RowBatchStream, sink: &mut RecordSink<W>) -> Result<()>
    where
        W: AsyncWrite + Unpin + Send,
    {
        while let Some(batch) = batches.next().await {
            self.process_batch(&batch?, sink).await?;
        }
        Ok(())
    }
}

/// Stream `source` into `writer` using a caller-owned dedup index.
pub async fn extract<S, W>(
    source: S,
    writer: W,
    index: &mut DedupIndex,
    batch_size: usize,
) -> Result<ExtractSummary>
where
    S: BatchSource,
    W: AsyncWrite + Unpin + Send,
{
    let mut report = ExtractReport::new();
    let open = move || async move { Ok(writer) };
    stream_into(source, open, batch_size, index, &mut report).await?;
    Ok(report.summary)
}

/// Outcome of a full run. Never carries a panic; failures keep their cause.
#[derive(Debug)]
pub struct ExtractReport {
    pub state: RunState,
    pub mapping: ColumnMapping,
    pub summary: ExtractSummary,
    pub error: Option<IngestError>,
    pub elapsed: Duration,
}

impl ExtractReport {
    fn new() -> Self {
        Self {
            state: RunState::Init,
            mapping: ColumnMapping::default(),
            summary: ExtractSummary::default(),
            error: None,
            elapsed: Duration::ZERO,
        }
    }

    pub fn is_success(&self) -> bool {
        self.state == RunState::Done
    }

    pub fn rows_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.summary.rows_seen as f64 / secs
        } else {
            0.0
        }
    }

    fn fail(&mut self, err: IngestError) {
        error!(error = ?err, state = ?self.state, "Error processing the source file: {}", err);
        self.state = RunState::Failed;
        self.error = Some(err);
    }
}

/// Run one extraction from an already-open source to `output`.
pub async fn run_extraction<S: BatchSource>(
    source: S,
    output: &Path,
    batch_size: usize,
) -> ExtractReport {
    let started = Instant::now();
    let mut report = ExtractReport::new();
    let mut index = DedupIndex::new();
    let open = || writer_to_path(output);
    match stream_into(source, open, batch_size, &mut index, &mut report).await {
        Ok(()) => report.state = RunState::Done,
        Err(err) => report.fail(err),
    }
    report.elapsed = started.elapsed();
    report
}

/// Open a Parquet file and run one extraction from it.
pub async fn extract_parquet(source: &Path, output: &Path, batch_size: usize) -> ExtractReport {
    info!(path = %source.display(), "Starting to process {}...", source.display());
    match ParquetSource::open(source).await {
        Ok(parquet) => {
            info!(rows = parquet.row_count(), "Source opened");
            run_extraction(parquet, output, batch_size).await
        }
        Err(err) => {
            let mut report = ExtractReport::new();
            report.fail(err);
            report
        }
    }
}

/// Resolve the mapping, open the sink, and drain the source. `report`
/// tracks the state and counters as the run progresses.
async fn stream_into<S, W, F, Fut>(
    source: S,
    open_writer: F,
    batch_size: usize,
    index: &mut DedupIndex,
    report: &mut ExtractReport,
) -> Result<()>
where
    S: BatchSource,
    W: AsyncWrite + Unpin + Send,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<W>>,
{
    let mapping = resolve_columns(&source.column_names());
    report.mapping = mapping.clone();
    info!(
        columns = ?mapping.source_columns(),
        header = ?mapping.header(),
        "Reading columns {:?}, saved as {:?}",
        mapping.source_columns(),
        mapping.header()
    );
    if mapping.source_for(LogicalField::Identifier).is_none() {
        warn!("No identifier column found; every row will be skipped");
    }

    let batches = source.into_batches(&mapping.source_columns(), batch_size)?;
    let mut sink = RecordSink::create(open_writer().await?, &mapping).await?;
    report.state = RunState::Streaming;

    let mut extractor = StreamingExtractor::new(&mapping, index);
    let outcome = extractor.run(batches, &mut sink).await;
    report.summary = extractor.summary().clone();
    outcome?;
    sink.finish().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::RawValue;

    fn batch(columns: &[&str], rows: Vec<Vec<RawValue>>) -> RowBatch {
        let mut b = RowBatch::new(columns.iter().map(|c| c.to_string()).collect());
        for r in rows {
            b.push_row(r);
        }
        b
    }

    #[tokio::test]
    async fn sink_writes_header_and_hands_back_writer() {
        let mapping = resolve_columns(&["code", "product_name"]);
        let mut sink = RecordSink::create(Vec::new(), &mapping).await.unwrap();
        let record = NormalizedRecord {
            values: vec![
                (LogicalField::Identifier, "1".to_string()),
                (LogicalField::DisplayName, "Tea, green".to_string()),
            ],
        };
        sink.write(&record).await.unwrap();
        assert_eq!(sink.written(), 1);

        let bytes = sink.finish().await.unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "code,product_name\n1,\"Tea, green\"\n"
        );
    }

    #[test]
    fn first_occurrence_wins() {
        let b = batch(
            &["code", "product_name"],
            vec![
                vec!["1".into(), "first".into()],
                vec!["1".into(), "second".into()],
                vec!["2".into(), RawValue::Null],
            ],
        );
        let mapping = resolve_columns(b.columns());
        let mut index = DedupIndex::new();
        let mut ex = StreamingExtractor::new(&mapping, &mut index);
        let kept: Vec<_> = b.rows().filter_map(|r| ex.accept_row(r)).collect();

        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].get(LogicalField::DisplayName), Some("first"));
        assert_eq!(kept[1].get(LogicalField::DisplayName), Some(""));
        assert_eq!(ex.summary().duplicates, 1);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn null_identifier_counts_as_seen_but_not_kept() {
        let b = batch(
            &["code"],
            vec![
                vec![RawValue::Null],
                vec![RawValue::List(vec![RawValue::Null])],
                vec![RawValue::List(vec![])],
                vec!["".into()],
                vec!["7".into()],
            ],
        );
        let mapping = resolve_columns(b.columns());
        let mut index = DedupIndex::new();
        let mut ex = StreamingExtractor::new(&mapping, &mut index);
        let kept = b.rows().filter_map(|r| ex.accept_row(r)).count();

        assert_eq!(kept, 1);
        assert_eq!(ex.summary().rows_seen, 5);
        assert_eq!(ex.summary().missing_identifier, 4);
    }

    #[test]
    fn unmapped_identifier_skips_everything() {
        let b = batch(&["product_name"], vec![vec!["x".into()], vec!["y".into()]]);
        let mapping = resolve_columns(b.columns());
        let mut index = DedupIndex::new();
        let mut ex = StreamingExtractor::new(&mapping, &mut index);
        assert_eq!(b.rows().filter_map(|r| ex.accept_row(r)).count(), 0);
        assert_eq!(ex.summary().rows_seen, 2);
    }

    #[test]
    fn identifier_is_normalized_before_dedup() {
        let b = batch(
            &["_id", "ingredients_text_en"],
            vec![
                vec![RawValue::from(vec!["42"]), "{'lang': 'en', 'text': 'salt'}".into()],
                vec!["42".into(), "pepper".into()],
            ],
        );
        let mapping = resolve_columns(b.columns());
        let mut index = DedupIndex::new();
        let mut ex = StreamingExtractor::new(&mapping, &mut index);
        let kept: Vec<_> = b.rows().filter_map(|r| ex.accept_row(r)).collect();

        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].identifier(), "42");
        assert_eq!(kept[0].values().collect::<Vec<_>>(), vec!["42", "salt"]);
    }
}
