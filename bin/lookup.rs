use clap::{Arg, ArgAction, Command};
use food_ingest::logging::{init_logging, LogConfig};
use food_ingest::lookup::SAMPLE_CODES;
use food_ingest::{lookup_products, Config, RealtimeDb};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let matches = Command::new("lookup")
        .about("Look up products in the document store by barcode")
        .arg(
            Arg::new("codes")
                .help("Barcodes to look up (defaults to a built-in sample)")
                .action(ArgAction::Append),
        )
        .get_matches();

    init_logging(&LogConfig::from_env()?)?;
    let config = Config::from_env()?;
    let codes: Vec<String> = match matches.get_many::<String>("codes") {
        Some(values) => values.cloned().collect(),
        None => SAMPLE_CODES.iter().map(|c| c.to_string()).collect(),
    };

    let store = RealtimeDb::from_config(&config)?;
    for outcome in lookup_products(&store, codes.as_slice()).await {
        println!("{outcome}");
        println!("{}", "-".repeat(50));
    }
    Ok(())
}
