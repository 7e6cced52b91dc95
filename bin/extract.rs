use clap::{Arg, Command};
use food_ingest::config::require_file;
use food_ingest::logging::{init_logging, LogConfig};
use food_ingest::{extract_parquet, format_megabytes, Config};
use std::path::PathBuf;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let matches = Command::new("extract")
        .about("Extract code, name and ingredients from a Parquet dump into a deduplicated CSV")
        .arg(
            Arg::new("source")
                .long("source")
                .help("Parquet file to read (overrides SOURCE_FILE)")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("output")
                .long("output")
                .help("CSV to write; .gz/.zst extensions compress (overrides CSV_FILE)")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .get_matches();

    init_logging(&LogConfig::from_env()?)?;
    let mut config = Config::from_env()?;
    if let Some(p) = matches.get_one::<PathBuf>("source") {
        config.source_path = p.clone();
    }
    if let Some(p) = matches.get_one::<PathBuf>("output") {
        config.csv_path = p.clone();
    }

    if let Err(e) = require_file(&config.source_path, "Source file") {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
    let source_size = std::fs::metadata(&config.source_path)?.len();
    println!("Input file size: {}", format_megabytes(source_size));

    let report = extract_parquet(&config.source_path, &config.csv_path, config.batch_size).await;
    if let Some(err) = &report.error {
        eprintln!("Extraction failed: {err}");
        std::process::exit(1);
    }

    let output_size = std::fs::metadata(&config.csv_path)?.len();
    let s = &report.summary;
    println!(
        "source={} output={} ({})",
        config.source_path.display(),
        config.csv_path.display(),
        format_megabytes(output_size)
    );
    println!(
        "rows={} kept={} duplicates={} missing_code={} batches={}",
        s.rows_seen, s.kept, s.duplicates, s.missing_identifier, s.batches
    );
    println!(
        "elapsed={:.1}s rows/sec={:.0}",
        report.elapsed.as_secs_f64(),
        report.rows_per_sec()
    );
    Ok(())
}
