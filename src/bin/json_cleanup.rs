use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use entry_sweep::{ContentstackClient, Environment, JsonCleanup, StackConfig, SweepSettings};
use serde_json::Value;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Normalize an exported entry into backup format, expanding references inline.
#[derive(Parser, Debug)]
#[command(name = "json-cleanup", version)]
struct Args {
    /// JSON file to clean
    input_file: PathBuf,

    /// Environment used to fetch referenced entries
    environment: Environment,

    /// Output file (defaults to `<input>-cleaned.json`)
    output_file: Option<PathBuf>,
}

fn default_output(input: &Path) -> PathBuf {
    let stem = input.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();
    input.with_file_name(format!("{}-cleaned.json", stem))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("entry_sweep=info,json_cleanup=info")))
        .init();

    dotenvy::dotenv().ok();
    let args = Args::parse();

    let raw = std::fs::read_to_string(&args.input_file)
        .with_context(|| format!("Input file not found: {}", args.input_file.display()))?;
    let input: Value = serde_json::from_str(&raw).context("Input is not valid JSON")?;

    let settings = SweepSettings::load()?;
    let config = StackConfig::from_env(args.environment)?.with_settings(&settings);
    let client = Arc::new(ContentstackClient::new(&config)?);

    let mut cleanup = JsonCleanup::with_store(client);
    let cleaned = cleanup.clean(&input).await;

    let output = args.output_file.unwrap_or_else(|| default_output(&args.input_file));
    std::fs::write(&output, serde_json::to_string_pretty(&cleaned)?)?;

    info!("Cleaned JSON written to {} ({} entries fetched)", output.display(), cleanup.fetch_count());
    Ok(())
}
