//! threadfold - Incremental mail sync into markdown thread documents
//!
//! This is the command-line entry point. All sync logic lives in the
//! `mail` crate.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{error, info, warn};
use mail::{AccountOutcome, ImapConnector, LabelOutcome, SyncConfig, SyncEngine, SyncOptions, SyncReport};

#[derive(Parser)]
#[command(name = "threadfold")]
#[command(about = "Sync mail folders into per-thread markdown documents")]
#[command(version)]
struct Cli {
    /// Config file (defaults to ~/.config/threadfold/threadfold.json)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch new mail and merge it into thread documents
    Sync {
        /// Ignore cursors, re-fetch the lookback window and remove orphans
        #[arg(long)]
        full: bool,

        /// Only sync this account
        #[arg(long, value_name = "NAME")]
        account: Option<String>,
    },

    /// Sync repeatedly, pausing between runs
    Watch {
        /// Seconds between runs
        #[arg(long, default_value = "300")]
        interval: u64,

        /// Only sync this account
        #[arg(long, value_name = "NAME")]
        account: Option<String>,
    },

    /// List the remote folders of an account
    Folders {
        #[arg(value_name = "ACCOUNT")]
        account: String,
    },

    /// Copy existing documents into collaborator stores
    Route,

    /// Regenerate manifest.toml from the document store
    Manifest,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => SyncConfig::from_file(path)?,
        None => {
            if let Err(e) = config::init() {
                error!("Failed to initialize config directory: {}", e);
            }
            SyncConfig::load().with_context(|| {
                format!(
                    "Failed to load config; create {}",
                    SyncConfig::default_path()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| mail::config::CONFIG_FILE.to_string())
                )
            })?
        }
    };

    let connector = ImapConnector::new();
    let engine = SyncEngine::new(&config, &connector);

    match cli.command {
        Commands::Sync { full, account } => {
            let report = engine.run_once(&SyncOptions { full, account })?;
            print_report(&report);
        }
        Commands::Watch { interval, account } => {
            let options = SyncOptions {
                full: false,
                account,
            };
            let shutdown = Arc::new(AtomicBool::new(false));
            let flag = Arc::clone(&shutdown);
            ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed))
                .context("Failed to install Ctrl-C handler")?;

            while !shutdown.load(Ordering::Relaxed) {
                match engine.run_once(&options) {
                    Ok(report) => print_report(&report),
                    Err(e) => error!("Sync run failed: {:#}", e),
                }
                info!("Next run in {}s", interval);
                sleep_unless(&shutdown, Duration::from_secs(interval));
            }
            info!("Interrupted, stopping between runs");
        }
        Commands::Folders { account } => {
            for folder in engine.list_folders(&account)? {
                println!("{}", folder);
            }
        }
        Commands::Route => {
            let report = engine.apply_routes()?;
            println!("{} document(s) copied, {} skipped", report.copied, report.skipped);
        }
        Commands::Manifest => {
            let manifest = engine.rebuild_manifest()?;
            println!(
                "{} thread(s) written to {}",
                manifest.threads.len(),
                config.manifest_file().display()
            );
        }
    }

    Ok(())
}

/// Sleep for `total`, waking early once `shutdown` is set
fn sleep_unless(shutdown: &AtomicBool, total: Duration) {
    let deadline = Instant::now() + total;
    while !shutdown.load(Ordering::Relaxed) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        std::thread::sleep((deadline - now).min(Duration::from_millis(250)));
    }
}

fn print_report(report: &SyncReport) {
    for account in &report.accounts {
        match &account.outcome {
            AccountOutcome::Synced => println!("{}", account.name),
            AccountOutcome::Failed(reason) => {
                warn!("Account {} skipped: {}", account.name, reason);
                println!("{}: failed ({})", account.name, reason);
                continue;
            }
        }
        for label in &account.labels {
            match &label.outcome {
                LabelOutcome::Synced { fetched, merged, .. } => {
                    println!("  {}: {} fetched, {} new", label.label, fetched, merged)
                }
                LabelOutcome::FolderMissing => println!("  {}: not found", label.label),
                LabelOutcome::Failed(reason) => println!("  {}: failed ({})", label.label, reason),
            }
        }
    }
    if !report.orphans_removed.is_empty() {
        println!("{} orphan(s) removed", report.orphans_removed.len());
    }
}
