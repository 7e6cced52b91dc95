use clap::{Arg, ArgAction, Command};
use food_ingest::config::require_file;
use food_ingest::logging::{init_logging, LogConfig};
use food_ingest::store::verify_connection;
use food_ingest::{
    format_megabytes, run_upload, Config, DocumentStore, MemoryStore, RealtimeDb,
    ServiceAccount, UploadOptions,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let matches = Command::new("upload")
        .about("Upload the extracted CSV to the document store in chunks")
        .arg(
            Arg::new("dry-run")
                .long("dry-run")
                .help("Write into an in-memory store instead of the remote database")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    init_logging(&LogConfig::from_env()?)?;
    let config = Config::from_env()?;

    if let Err(e) = run(&config, matches.get_flag("dry-run")).await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    println!("Script completed successfully!");
    Ok(())
}

async fn run(config: &Config, dry_run: bool) -> anyhow::Result<()> {
    require_file(&config.csv_path, "CSV file")?;

    if dry_run {
        let store = MemoryStore::new();
        upload_to(&store, config).await?;
        println!("Dry run stored {} products", store.child_count("products"));
        return Ok(());
    }

    let account = ServiceAccount::from_file(&config.credentials_path).await?;
    println!("Using service account {} ({})", account.client_email, account.project_id);
    let store = RealtimeDb::from_config(config)?;
    verify_connection(&store).await?;
    upload_to(&store, config).await
}

async fn upload_to<S: DocumentStore>(store: &S, config: &Config) -> anyhow::Result<()> {
    let size = std::fs::metadata(&config.csv_path)?.len();
    println!("CSV file size: {}", format_megabytes(size));

    let summary = run_upload(store, &config.csv_path, &UploadOptions::from(config)).await?;
    println!(
        "Upload completed: {} products in {} chunks ({} rows skipped)",
        summary.uploaded, summary.chunks, summary.skipped
    );
    Ok(())
}
