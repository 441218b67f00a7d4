//! Ferrotype main entry point
//!
//! This is the command-line interface for the Ferrotype ingestion pipeline.

use anyhow::Context;
use clap::Parser;
use ferrotype::config::{load_config_with_hash, Config};
use ferrotype::health::HealthTracker;
use ferrotype::metrics::Metrics;
use ferrotype::pipeline::Orchestrator;
use ferrotype::publish::{NullPublisher, Publisher, TelegramPublisher};
use ferrotype::server::{serve, AppState};
use ferrotype::storage::{SqliteStore, Store};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing_subscriber::EnvFilter;

/// Ferrotype: a photo-blog ingestion pipeline
///
/// Ferrotype scrapes a photo-blog listing, stores new posts in SQLite,
/// downloads their images with retry, and publishes them to a channel.
/// A checkpoint guarantees repeated runs never re-send a post.
#[derive(Parser, Debug)]
#[command(name = "ferrotype")]
#[command(version = "1.0.0")]
#[command(about = "A photo-blog ingestion pipeline", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Run one ingestion cycle and exit (default mode)
    #[arg(long, conflicts_with = "schedule")]
    run_once: bool,

    /// Run cycles on a schedule, serving HTTP endpoints between them
    #[arg(
        long,
        value_name = "HOURS",
        num_args = 0..=1,
        default_missing_value = "12"
    )]
    schedule: Option<u64>,

    /// Serve the HTTP endpoints without running any cycles
    #[arg(long, conflicts_with_all = ["run_once", "schedule"])]
    serve: bool,

    /// Retry media download and publish for stored unpublished posts
    #[arg(long, conflicts_with_all = ["run_once", "schedule", "serve"])]
    reprocess: bool,

    /// Print the current checkpoint and exit
    #[arg(long)]
    checkpoint: bool,

    /// Clear the checkpoint so the next cycle re-scans the full listing
    #[arg(long)]
    reset_checkpoint: bool,

    /// Delete all stored posts and the checkpoint (requires --yes)
    #[arg(long)]
    purge: bool,

    /// Confirm a destructive operation
    #[arg(long)]
    yes: bool,

    /// Cap the number of posts processed per cycle (smoke runs)
    #[arg(long, value_name = "N")]
    test_posts: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) =
        load_config_with_hash(&cli.config).context("Failed to load configuration")?;
    tracing::info!("Configuration loaded (hash: {})", config_hash);

    // Operator commands run against the store and exit
    if cli.checkpoint {
        return handle_checkpoint(&config);
    }
    if cli.reset_checkpoint {
        return handle_reset_checkpoint(&config);
    }
    if cli.purge {
        return handle_purge(&config, cli.yes);
    }

    let store = Arc::new(Mutex::new(
        SqliteStore::new(Path::new(&config.storage.database_path))
            .context("Failed to open database")?,
    ));
    let metrics = Arc::new(Metrics::new());
    let health = Arc::new(HealthTracker::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Flip the shutdown flag on Ctrl-C; cycles stop between items
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });

    if cli.serve {
        return handle_serve(&config, &config_hash, store, metrics, health).await;
    }

    let publisher = build_publisher(&config)?;
    let orchestrator = Orchestrator::new(
        config.clone(),
        Arc::clone(&store),
        publisher,
        Arc::clone(&metrics),
        Arc::clone(&health),
        shutdown_rx,
        cli.test_posts,
    )?;

    if cli.reprocess {
        let outcome = orchestrator.reprocess(100).await?;
        tracing::info!(
            "Reprocess finished: {} attempted, {} published, {} failed",
            outcome.discovered,
            outcome.published,
            outcome.failed
        );
        return Ok(());
    }

    if cli.run_once {
        return run_single_cycle(&orchestrator).await;
    }

    if let Some(hours) = cli.schedule {
        let addr = config
            .server
            .bind
            .parse()
            .context("Invalid server bind address")?;
        let state = AppState {
            store,
            metrics,
            health,
            health_config: config.health.clone(),
            config_hash,
        };
        tokio::spawn(async move {
            if let Err(e) = serve(addr, state).await {
                tracing::error!("HTTP server failed: {}", e);
            }
        });

        orchestrator
            .run_scheduled(Duration::from_secs(hours * 3600))
            .await;
        return Ok(());
    }

    // No mode flag behaves like --run-once
    run_single_cycle(&orchestrator).await
}

/// Runs one cycle; a fatal cycle error becomes a nonzero exit
async fn run_single_cycle(orchestrator: &Orchestrator) -> anyhow::Result<()> {
    match orchestrator.try_run_cycle().await? {
        Some(outcome) => {
            tracing::info!(
                "Done: {} discovered, {} published, {} failed, checkpoint at {:?}",
                outcome.discovered,
                outcome.published,
                outcome.failed,
                outcome.checkpoint
            );
            Ok(())
        }
        None => anyhow::bail!("A cycle was already in flight"),
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("ferrotype=info,warn"),
            1 => EnvFilter::new("ferrotype=debug,info"),
            2 => EnvFilter::new("ferrotype=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Builds the configured publisher, defaulting to the null publisher
fn build_publisher(config: &Config) -> anyhow::Result<Arc<dyn Publisher>> {
    match &config.publisher.telegram {
        Some(telegram) => {
            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(config.source.request_timeout_secs))
                .build()
                .context("Failed to build publisher HTTP client")?;
            tracing::info!("Publishing to Telegram chat {}", telegram.chat_id);
            Ok(Arc::new(TelegramPublisher::new(client, telegram)))
        }
        None => {
            tracing::info!("No publisher configured; posts will be stored only");
            Ok(Arc::new(NullPublisher))
        }
    }
}

/// Handles --checkpoint: prints the current checkpoint
fn handle_checkpoint(config: &Config) -> anyhow::Result<()> {
    let store = SqliteStore::new(Path::new(&config.storage.database_path))?;
    let checkpoint = store.load_checkpoint()?;

    if checkpoint.is_unset() {
        println!("Checkpoint: <unset> (next cycle scans the full listing)");
    } else {
        println!("Checkpoint: {}", checkpoint.last_item_id);
        if let Some(updated_at) = &checkpoint.updated_at {
            println!("Updated:    {}", updated_at);
        }
    }
    Ok(())
}

/// Handles --reset-checkpoint
fn handle_reset_checkpoint(config: &Config) -> anyhow::Result<()> {
    let mut store = SqliteStore::new(Path::new(&config.storage.database_path))?;
    store.reset_checkpoint()?;
    println!("Checkpoint cleared; stored posts still deduplicate re-scanned items");
    Ok(())
}

/// Handles --purge, refusing without --yes
fn handle_purge(config: &Config, confirmed: bool) -> anyhow::Result<()> {
    if !confirmed {
        anyhow::bail!("--purge deletes all stored posts; re-run with --yes to confirm");
    }
    let mut store = SqliteStore::new(Path::new(&config.storage.database_path))?;
    let count = store.count_items()?;
    store.purge()?;
    println!("Purged {} posts and the checkpoint", count);
    Ok(())
}

/// Handles --serve: endpoints only, no cycles
async fn handle_serve(
    config: &Config,
    config_hash: &str,
    store: Arc<Mutex<SqliteStore>>,
    metrics: Arc<Metrics>,
    health: Arc<HealthTracker>,
) -> anyhow::Result<()> {
    let addr = config
        .server
        .bind
        .parse()
        .context("Invalid server bind address")?;
    let state = AppState {
        store,
        metrics,
        health,
        health_config: config.health.clone(),
        config_hash: config_hash.to_string(),
    };
    serve(addr, state).await.context("HTTP server failed")
}
