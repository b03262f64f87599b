//! Driftnet main entry point
//!
//! This is the command-line interface for the Driftnet crawl orchestrator.

use anyhow::{Context, Result};
use clap::Parser;
use driftnet::config::{load_config_with_hash, Config};
use driftnet::crawler::IdentityRotator;
use driftnet::output::{load_statistics, print_statistics};
use driftnet::source::{HttpProbe, SourceRegistry};
use driftnet::JobQueue;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Driftnet: a liveness-aware crawl orchestrator
///
/// Driftnet keeps a registry of sources, validates that they are reachable,
/// and drives a pool of browser workers that extract text, images or video
/// from every active source through a retrying job queue.
#[derive(Parser, Debug)]
#[command(name = "driftnet")]
#[command(version)]
#[command(about = "A liveness-aware crawl orchestrator", long_about = None)]
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

    /// Purge the durable queue before starting
    #[arg(long)]
    fresh: bool,

    /// Validate config and show the sources without crawling
    #[arg(long, conflicts_with_all = ["validate", "stats"])]
    dry_run: bool,

    /// Run one validation sweep, print each source's status and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats"])]
    validate: bool,

    /// Show queue statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "validate"])]
    stats: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);

    if cli.dry_run {
        handle_dry_run(&config);
        Ok(())
    } else if cli.validate {
        handle_validate(&config).await
    } else if cli.stats {
        handle_stats(&config)
    } else {
        handle_run(config, cli.fresh).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("driftnet=info,warn"),
            1 => EnvFilter::new("driftnet=debug,info"),
            2 => EnvFilter::new("driftnet=trace,debug"),
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

/// Handles the --dry-run mode: prints the effective configuration
fn handle_dry_run(config: &Config) {
    println!("=== Driftnet Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Max concurrent scrapes: {}", config.crawler.max_concurrent_scrapes);
    println!("  Request delay: {}ms", config.crawler.request_delay);
    println!("  Schedule interval: {}s", config.crawler.schedule_interval);
    println!("  Poll interval: {}ms", config.crawler.poll_interval);
    println!("  Navigation timeout: {}ms", config.crawler.navigation_timeout);
    println!(
        "  Viewport: {}x{}",
        config.crawler.viewport.width, config.crawler.viewport.height
    );
    println!("  User agents: {}", config.crawler.user_agents.len());

    println!("\nQueue:");
    match &config.queue.database_path {
        Some(path) => println!("  Database: {}", path),
        None => println!("  Database: (in memory)"),
    }
    println!("  Max attempts: {}", config.queue.max_attempts);
    println!("  Initial backoff: {}ms", config.queue.initial_backoff);

    println!("\nRegistry:");
    println!("  Sweep interval: {}s", config.registry.sweep_interval);
    println!("  Probe timeout: {}ms", config.registry.probe_timeout);

    println!("\nSources ({}):", config.sources.len());
    for source in &config.sources {
        let active = source.active.unwrap_or(true);
        println!(
            "  - {} [{}] {}{}",
            source.id,
            source.content_type,
            source.url,
            if active { "" } else { " (inactive)" }
        );
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the --validate mode: one sweep, then a status line per source
async fn handle_validate(config: &Config) -> Result<()> {
    let identity = IdentityRotator::new(config.crawler.user_agents.clone());
    let probe = HttpProbe::new(config.registry.probe_timeout(), identity.next_identity())?;
    let registry = SourceRegistry::new(Arc::new(probe), &config.registry);
    registry.load(&config.sources)?;

    let report = registry.validate_sweep().await;

    println!("=== Source Validation ===\n");
    for source in registry.sources() {
        let status = if source.active { "alive" } else { "dead" };
        match &source.last_error {
            Some(error) if !source.active => {
                println!("  {:<6} {} ({}): {}", status, source.id, source.url, error)
            }
            _ => println!("  {:<6} {} ({})", status, source.id, source.url),
        }
    }
    println!(
        "\n{} probed, {} alive, {} dead",
        report.probed, report.alive, report.dead
    );

    Ok(())
}

/// Handles the --stats mode: shows queue statistics from the database
fn handle_stats(config: &Config) -> Result<()> {
    let path = config
        .queue
        .database_path
        .as_deref()
        .context("--stats needs [queue] database-path to be set")?;

    println!("Database: {}\n", path);

    let queue = JobQueue::open(Path::new(path))?;
    let stats = load_statistics(&queue)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the main run
async fn handle_run(config: Config, fresh: bool) -> Result<()> {
    if fresh {
        tracing::info!("Starting fresh (queued jobs will be discarded)");
    }
    tracing::info!(
        "Sources: {}, workers: {}",
        config.sources.len(),
        config.crawler.max_concurrent_scrapes
    );

    match driftnet::crawler::run(config, fresh).await {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            Ok(())
        }
        Err(e) => {
            tracing::error!("Driftnet failed: {}", e);
            Err(e.into())
        }
    }
}
