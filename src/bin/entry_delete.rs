use std::io::{self, BufRead, Write};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use entry_sweep::toolkit::deletion::{DeletionManager, DeletionOptions};
use entry_sweep::{ContentstackClient, Environment, StackConfig, SweepSettings};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Recursively delete an entry and every nested entry nothing else references.
#[derive(Parser, Debug)]
#[command(name = "entry-delete", version)]
struct Args {
    /// UID of the entry to delete
    entry_uid: String,

    /// Target environment (dev, USBC, USBD, CABC, CABD)
    environment: Environment,

    /// Content type of the entry (defaults to the configured content type)
    content_type_uid: Option<String>,

    /// Show what would be deleted without deleting anything
    #[arg(long)]
    dry_run: bool,
}

fn confirm_deletion(args: &Args) -> io::Result<bool> {
    let mut stderr = io::stderr();
    writeln!(stderr, "WARNING: this will permanently delete {} and its nested entries in {}.", args.entry_uid, args.environment)?;
    write!(stderr, "Type DELETE to continue: ")?;
    stderr.flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(answer.trim() == "DELETE")
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("entry_sweep=info,entry_delete=info")))
        .init();

    dotenvy::dotenv().ok();
    let args = Args::parse();

    let settings = SweepSettings::load()?;
    let config = StackConfig::from_env(args.environment)?.with_settings(&settings);
    let client = Arc::new(ContentstackClient::new(&config)?);

    if !args.dry_run && !confirm_deletion(&args)? {
        info!("Deletion cancelled");
        return Ok(ExitCode::FAILURE);
    }

    let options = DeletionOptions::from_settings(&settings, args.environment.suffix(), args.dry_run);
    let manager = DeletionManager::new(client, options);
    let summary = manager
        .delete_entry_recursively(&args.entry_uid, args.content_type_uid.as_deref())
        .await;

    println!("{}", serde_json::to_string_pretty(&summary)?);

    if summary.success {
        Ok(ExitCode::SUCCESS)
    } else {
        error!("Deletion failed: {}", summary.error.as_deref().unwrap_or("unknown error"));
        Ok(ExitCode::FAILURE)
    }
}
