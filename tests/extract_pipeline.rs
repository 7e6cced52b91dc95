mod common;

use arrow_array::builder::{ListBuilder, StringBuilder};
use arrow_array::{ArrayRef, RecordBatch};
use common::read_csv;
use food_ingest::source::RowBatchStream;
use food_ingest::{
    extract, extract_parquet, run_extraction, BatchSource, DedupIndex, IngestError, MemorySource,
    RawValue, RowBatch, RunState,
};
use futures::stream::{self, StreamExt};
use parquet::arrow::ArrowWriter;
use std::path::Path;
use std::sync::Arc;

fn sample_source() -> MemorySource {
    MemorySource::new(["code", "brands", "product_name", "ingredients_text"])
        .with_row(vec![
            "3017620422003".into(),
            "Ferrero".into(),
            RawValue::from(vec!["Nutella"]),
            "{'lang': 'en', 'text': 'sugar, palm oil, hazelnuts'}".into(),
        ])
        .with_row(vec![
            RawValue::Null,
            "Nobody".into(),
            "No code".into(),
            "water".into(),
        ])
        .with_row(vec![
            "3017620422003".into(),
            "Ferrero".into(),
            "Nutella again".into(),
            "ignored".into(),
        ])
        .with_row(vec![
            RawValue::from(vec!["737628064502"]),
            RawValue::Null,
            RawValue::List(vec![]),
            r#"{"lang": "en", "text": "rice noodles"}"#.into(),
        ])
}

/// Yields one good batch, then a read error.
struct TruncatedSource;

impl BatchSource for TruncatedSource {
    fn column_names(&self) -> Vec<String> {
        vec!["code".to_string(), "product_name".to_string()]
    }

    fn into_batches(
        self,
        columns: &[String],
        _batch_size: usize,
    ) -> food_ingest::Result<RowBatchStream> {
        let mut first = RowBatch::new(columns.to_vec());
        first.push_row(vec!["1".into(), "Tea".into()]);
        first.push_row(vec!["1".into(), "Tea again".into()]);
        first.push_row(vec!["2".into(), RawValue::Null]);
        let failure = IngestError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "truncated row group",
        ));
        Ok(stream::iter(vec![Ok(first), Err(failure)]).boxed())
    }
}

/// Writes a small dump with a list-valued, locale-suffixed name column.
fn write_parquet_fixture(path: &Path) -> anyhow::Result<()> {
    let mut codes = StringBuilder::new();
    let mut names = ListBuilder::new(StringBuilder::new());
    let mut ingredients = StringBuilder::new();

    let rows: [(Option<&str>, &[&str], Option<&str>); 5] = [
        (Some("1"), &["Oat drink"], Some("{'lang': 'en', 'text': \"oats, water\"}")),
        (None, &["Orphan"], Some("salt")),
        (Some("2"), &[], None),
        (Some("1"), &["Duplicate"], Some("other")),
        (Some("3"), &["{'lang': 'main', 'text': 'Rye bread'}"], Some("rye flour")),
    ];
    for (code, name, ingr) in rows {
        codes.append_option(code);
        for n in name {
            names.values().append_value(n);
        }
        names.append(true);
        ingredients.append_option(ingr);
    }

    let batch = RecordBatch::try_from_iter(vec![
        ("_id", Arc::new(codes.finish()) as ArrayRef),
        ("product_name_en", Arc::new(names.finish()) as ArrayRef),
        ("ingredients_text", Arc::new(ingredients.finish()) as ArrayRef),
    ])?;
    let mut writer = ArrowWriter::try_new(std::fs::File::create(path)?, batch.schema(), None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

#[tokio::test]
async fn extracts_normalized_unique_rows() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let out = dir.path().join("food_extracted.csv");

    let report = run_extraction(sample_source(), &out, 2).await;
    assert_eq!(report.state, RunState::Done);
    assert_eq!(report.summary.rows_seen, 4);
    assert_eq!(report.summary.kept, 2);
    assert_eq!(report.summary.duplicates, 1);
    assert_eq!(report.summary.missing_identifier, 1);
    assert_eq!(report.summary.batches, 2);

    let (headers, rows) = read_csv(&out).await?;
    assert_eq!(headers, vec!["code", "ingredients_text", "product_name"]);
    assert_eq!(
        rows,
        vec![
            vec!["3017620422003", "sugar, palm oil, hazelnuts", "Nutella"],
            vec!["737628064502", "rice noodles", ""],
        ]
    );
    Ok(())
}

#[tokio::test]
async fn extracts_from_parquet_with_fallback_columns() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let src = dir.path().join("food.parquet");
    let out = dir.path().join("food_extracted.csv");
    write_parquet_fixture(&src)?;

    let report = extract_parquet(&src, &out, 2).await;
    assert!(report.is_success(), "{:?}", report.error);
    assert_eq!(report.summary.rows_seen, 5);
    assert_eq!(report.summary.kept, 3);

    let (headers, rows) = read_csv(&out).await?;
    assert_eq!(headers, vec!["code", "ingredients_text", "product_name"]);
    assert_eq!(
        rows,
        vec![
            vec!["1", "oats, water", "Oat drink"],
            vec!["2", "", ""],
            vec!["3", "rye flour", "Rye bread"],
        ]
    );
    Ok(())
}

#[tokio::test]
async fn compressed_output_reads_back() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let out = dir.path().join("food_extracted.csv.gz");

    let report = run_extraction(sample_source(), &out, 100).await;
    assert!(report.is_success());

    let (_, rows) = read_csv(&out).await?;
    assert_eq!(rows.len(), 2);
    Ok(())
}

#[tokio::test]
async fn reruns_are_independent_unless_index_is_shared() -> anyhow::Result<()> {
    let mut first = Vec::new();
    let mut second = Vec::new();
    let mut shared = DedupIndex::new();

    let a = extract(sample_source(), &mut first, &mut shared, 10).await?;
    let b = extract(sample_source(), &mut second, &mut shared, 10).await?;
    assert_eq!(a.kept, 2);
    assert_eq!(b.kept, 0);
    assert_eq!(b.duplicates, 3);

    let dir = tempfile::tempdir()?;
    let one = run_extraction(sample_source(), &dir.path().join("a.csv"), 10).await;
    let two = run_extraction(sample_source(), &dir.path().join("b.csv"), 10).await;
    assert_eq!(one.summary, two.summary);
    assert_eq!(
        std::fs::read(dir.path().join("a.csv"))?,
        std::fs::read(dir.path().join("b.csv"))?
    );
    Ok(())
}

#[tokio::test]
async fn missing_source_fails_without_output() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out.csv");

    let report = extract_parquet(&dir.path().join("absent.parquet"), &out, 10).await;
    assert_eq!(report.state, RunState::Failed);
    assert!(report.error.is_some());
    assert!(!out.exists());
}

#[tokio::test]
async fn read_error_mid_run_keeps_progress() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let out = dir.path().join("partial.csv");

    let report = run_extraction(TruncatedSource, &out, 3).await;
    assert_eq!(report.state, RunState::Failed);
    assert!(matches!(report.error, Some(IngestError::Io(_))));
    assert_eq!(report.summary.batches, 1);
    assert_eq!(report.summary.rows_seen, 3);
    assert_eq!(report.summary.kept, 2);
    assert_eq!(report.summary.duplicates, 1);
    Ok(())
}
