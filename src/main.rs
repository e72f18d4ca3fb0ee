//! sharedbox-sync main entry point
//!
//! This is the command-line interface for mirroring shared boxes and users
//! from the admin API into the local database.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use sharedbox_sync::config::{load_config_with_hash, Config, LoggingConfig};
use sharedbox_sync::crawler::{
    run_pipeline, ApiRateLimiter, Pipeline, PipelineReport, PipelineSettings,
};
use sharedbox_sync::gateway::{load_access_token, AdminApiClient};
use sharedbox_sync::sink::ItemSinkSettings;
use sharedbox_sync::storage::{open_storage, Collection, SqliteStore};
use sharedbox_sync::users::{sync_users, UserSyncReport};
use sharedbox_sync::Operation;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// sharedbox-sync: mirrors the shared box tree into SQLite
///
/// Crawls the shared box hierarchy with a bounded, rate-limited worker pool
/// and upserts every discovered box. Per-node failures are written to the
/// error log and never abort the run.
#[derive(Parser, Debug)]
#[command(name = "sharedbox-sync")]
#[command(version = "1.0.0")]
#[command(about = "Mirrors admin API shared boxes and users into SQLite", long_about = None)]
struct Cli {
    /// Path to TOML configuration file (defaults apply when omitted)
    #[arg(short, long, value_name = "CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Shared box commands
    Sharedbox {
        #[command(subcommand)]
        action: SharedBoxAction,
    },
    /// User commands
    User {
        #[command(subcommand)]
        action: UserAction,
    },
}

#[derive(Subcommand, Debug)]
enum SharedBoxAction {
    /// Upsert shared boxes tagged with the parent they were found under
    Sync(CrawlArgs),
    /// Upsert shared boxes into the item-only table
    Import(CrawlArgs),
}

#[derive(Subcommand, Debug)]
enum UserAction {
    /// Upsert every user of the tenant
    Sync,
}

#[derive(Args, Debug)]
struct CrawlArgs {
    /// Node to start from; the empty string lists the top level
    #[arg(long, default_value = "")]
    node: String,

    /// Descend into every discovered shared box
    #[arg(short, long)]
    recursive: bool,
}

impl Command {
    fn operation(&self) -> Operation {
        match self {
            Self::Sharedbox {
                action: SharedBoxAction::Sync(_),
            } => Operation::SharedBoxSync,
            Self::Sharedbox {
                action: SharedBoxAction::Import(_),
            } => Operation::SharedBoxImport,
            Self::User {
                action: UserAction::Sync,
            } => Operation::UserSync,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load and validate configuration
    let (config, config_hash) = match &cli.config {
        Some(path) => {
            let (config, hash) = load_config_with_hash(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
            (config, Some(hash))
        }
        None => (Config::default(), None),
    };

    setup_logging(cli.verbose, cli.quiet, &config.logging);

    match (&cli.config, &config_hash) {
        (Some(path), Some(hash)) => tracing::info!(
            "Configuration loaded from {} (hash: {})",
            path.display(),
            hash
        ),
        _ => tracing::info!("No configuration file given, using defaults"),
    }

    let session_id = Uuid::new_v4().to_string();
    let operation = cli.command.operation();
    let span = tracing::info_span!("session", id = %session_id, op = %operation);

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(
            async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Interrupt received, draining pipeline");
                    cancel.cancel();
                }
            }
            .instrument(span.clone()),
        );
    }

    let result = run_command(cli.command, &config, &session_id, cancel)
        .instrument(span)
        .await;

    if let Err(e) = &result {
        tracing::error!("{} failed: {}", operation, e);
    }
    result.with_context(|| format!("{} failed", operation))
}

/// Sets up the logging/tracing subscriber based on verbosity level
///
/// Events go to stdout and are appended to `<directory>/debug-<date>.log`.
fn setup_logging(verbose: u8, quiet: bool, logging: &LoggingConfig) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sharedbox_sync=info,warn"),
            1 => EnvFilter::new("sharedbox_sync=debug,info"),
            2 => EnvFilter::new("sharedbox_sync=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    let file_layer = match open_log_file(Path::new(&logging.directory)) {
        Ok(file) => Some(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        ),
        Err(e) => {
            eprintln!(
                "Warning: file logging disabled, cannot open log in {}: {}",
                logging.directory, e
            );
            None
        }
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false),
        )
        .with(file_layer)
        .init();
}

fn open_log_file(directory: &Path) -> std::io::Result<std::fs::File> {
    std::fs::create_dir_all(directory)?;
    let name = format!("debug-{}.log", chrono::Local::now().format("%Y-%m-%d"));
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(directory.join(name))
}

/// Performs fatal setup, then runs the selected operation
async fn run_command(
    command: Command,
    config: &Config,
    session_id: &str,
    cancel: CancellationToken,
) -> sharedbox_sync::Result<()> {
    let operation = command.operation();

    let token = load_access_token(Path::new(&config.api.token_path))?;
    let client = AdminApiClient::new(&config.api, token)?;
    let store = open_storage(Path::new(&config.storage.database_path))?;
    tracing::debug!(path = %config.storage.database_path, "Opened database");

    match command {
        Command::Sharedbox { action } => {
            let (args, collection) = match action {
                SharedBoxAction::Sync(args) => (args, Collection::SharedBoxes),
                SharedBoxAction::Import(args) => (args, Collection::Items),
            };
            handle_crawl(client, store, collection, args, config, operation, session_id, cancel)
                .await
        }
        Command::User {
            action: UserAction::Sync,
        } => handle_user_sync(&client, &store, config).await,
    }
}

/// Handles `sharedbox sync` and `sharedbox import`
#[allow(clippy::too_many_arguments)]
async fn handle_crawl(
    client: AdminApiClient,
    store: SqliteStore,
    collection: Collection,
    args: CrawlArgs,
    config: &Config,
    operation: Operation,
    session_id: &str,
    cancel: CancellationToken,
) -> sharedbox_sync::Result<()> {
    let error_list_key = operation.error_list_key(session_id);
    tracing::info!(
        node = %args.node,
        recursive = args.recursive,
        table = collection.table_name(),
        "Starting shared box crawl"
    );

    let pipeline = Pipeline {
        gateway: Arc::new(client),
        limiter: ApiRateLimiter::new(config.crawler.requests_per_second),
        item_store: Arc::new(store.item_store(collection)),
        error_log: Arc::new(store.clone()),
        settings: PipelineSettings::from_config(config, args.recursive, error_list_key.clone()),
    };

    let report = run_pipeline(pipeline, args.node, cancel.clone()).await?;

    print_crawl_report(operation, &report, &error_list_key, cancel.is_cancelled());
    Ok(())
}

/// Handles `user sync`
async fn handle_user_sync(
    client: &AdminApiClient,
    store: &SqliteStore,
    config: &Config,
) -> sharedbox_sync::Result<()> {
    let settings = ItemSinkSettings::from(&config.item_sink).batch;
    let report = sync_users(client, store, &settings).await?;

    print_user_report(&report);
    Ok(())
}

fn print_crawl_report(
    operation: Operation,
    report: &PipelineReport,
    error_list_key: &str,
    cancelled: bool,
) {
    let outcome = if cancelled { "Interrupted" } else { "Complete" };
    println!("\n=== {} {} ===\n", operation, outcome);

    println!("Crawl:");
    println!("  Nodes fetched: {}", report.crawl.jobs);
    println!("  Boxes discovered: {}", report.crawl.edges);
    println!("  Node errors: {}", report.crawl.node_errors);
    if cancelled {
        println!("  Jobs left unprocessed: {}", report.crawl.outstanding_jobs);
    }

    println!("\nStorage:");
    println!("  Inserted: {}", report.items.upserts.inserted);
    println!("  Replaced: {}", report.items.upserts.replaced);
    println!("  Failed batches: {}", report.items.failed_batches);

    println!("\nErrors:");
    println!("  Logged: {}", report.errors.appended);
    println!("  Dropped: {}", report.dropped_errors);
    println!("  Error list: {}", error_list_key);
}

fn print_user_report(report: &UserSyncReport) {
    println!("\n=== {} Complete ===\n", Operation::UserSync);
    println!("  Users listed: {}", report.listed);
    println!("  Inserted: {}", report.upserts.inserted);
    println!("  Replaced: {}", report.upserts.replaced);
    println!("  Skipped (no user_seq): {}", report.skipped);
}
