//! # Offline Queue Resync
//!
//! Pushes queued sales to the backend from the command line, e.g. from a
//! cron job on a shop's back-office machine or after a long outage.
//!
//! ## Usage
//! ```bash
//! # Use the platform config file and database
//! cargo run -p soko-checkout --bin soko-resync
//!
//! # Explicit config, or just report the queue length
//! cargo run -p soko-checkout --bin soko-resync -- --config ./checkout.toml
//! cargo run -p soko-checkout --bin soko-resync -- --status
//! ```
//!
//! Exit code is non-zero if sales are still queued after the pass.

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use soko_checkout::{
    CheckoutConfig, CheckoutResult, HttpBackend, NoOpEmitter, OfflineQueue, SyncReport,
};
use soko_db::{Database, DbConfig};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,soko=debug,sqlx=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn print_help() {
    println!("Soko POS offline queue resync");
    println!();
    println!("Usage: soko-resync [OPTIONS]");
    println!();
    println!("Options:");
    println!("  -c, --config <PATH>  Config file (default: platform config dir)");
    println!("  -s, --status         Only print how many sales are queued");
    println!("  -h, --help           Show this help message");
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let args: Vec<String> = env::args().collect();

    let mut config_path: Option<PathBuf> = None;
    let mut status_only = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--status" | "-s" => status_only = true,
            "--help" | "-h" => {
                print_help();
                return ExitCode::SUCCESS;
            }
            other => warn!(argument = other, "Ignoring unknown argument"),
        }
        i += 1;
    }

    match run(config_path, status_only).await {
        Ok(0) => ExitCode::SUCCESS,
        Ok(_) => ExitCode::from(2),
        Err(e) => {
            error!(error = %e, "Resync failed");
            ExitCode::FAILURE
        }
    }
}

/// Returns the number of sales still queued.
async fn run(config_path: Option<PathBuf>, status_only: bool) -> CheckoutResult<usize> {
    let config = CheckoutConfig::load(config_path)?;

    let db_path = config.database_path();
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let db = Database::new(DbConfig::new(&db_path)).await?;

    let backend = Arc::new(HttpBackend::from_config(&config)?);
    let queue = OfflineQueue::new(db, backend, config.business.id.clone(), Arc::new(NoOpEmitter));

    if status_only {
        let pending = queue.pending_count().await?;
        println!("{pending} sale(s) waiting to sync");
        return Ok(pending);
    }

    info!(backend = %config.backend.base_url, database = %db_path.display(), "Starting resync");
    match queue.sync_pending().await? {
        SyncReport::Finished(summary) => {
            println!(
                "Synced {} sale(s), {} still queued",
                summary.synced, summary.remaining
            );
            if let Some(id) = summary.failed_id {
                println!("First failure: {id}");
            }
            Ok(summary.remaining)
        }
        SyncReport::AlreadyRunning => {
            println!("Another resync is already running");
            queue.pending_count().await
        }
    }
}
