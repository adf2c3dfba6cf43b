use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use entry_sweep::toolkit::creation::CreationError;
use entry_sweep::{ContentstackClient, EntryCreator, Environment, StackConfig, SweepSettings};
use serde_json::{json, Value};
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Create entries from a backup document, rolling back on failure.
#[derive(Parser, Debug)]
#[command(name = "entry-create", version)]
struct Args {
    /// Backup-format document (`{"entry": {...}}`)
    input_file: PathBuf,

    /// Target environment (dev, USBC, USBD, CABC, CABD)
    environment: Environment,

    /// Content type of the root entry (defaults to the configured content type)
    content_type_uid: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("entry_sweep=info,entry_create=info")))
        .init();

    dotenvy::dotenv().ok();
    let args = Args::parse();

    let raw = std::fs::read_to_string(&args.input_file)
        .with_context(|| format!("Input file not found: {}", args.input_file.display()))?;
    let document: Value = serde_json::from_str(&raw).context("Input is not valid JSON")?;

    let settings = SweepSettings::load()?;
    let config = StackConfig::from_env(args.environment)?.with_settings(&settings);
    let client = Arc::new(ContentstackClient::new(&config)?);

    let content_type_uid = args
        .content_type_uid
        .clone()
        .unwrap_or_else(|| settings.default_content_type.clone());
    let mut creator = EntryCreator::new(client, settings.migration_tag.clone(), settings.entry_reuse_enabled)
        .with_duplicate_page_id_retry(settings.handle_duplicate_page_id);

    match creator.create_document(&document, &content_type_uid).await {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&json!({ "success": true, "result": result }))?);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            error!("Content creation failed: {}", e);
            let rollback = match &e {
                CreationError::RolledBack { report, .. } => Some(report),
                _ => None,
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "success": false,
                    "error": e.to_string(),
                    "rollback": rollback,
                }))?
            );
            Ok(ExitCode::FAILURE)
        }
    }
}
