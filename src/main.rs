//! Profile-Enrich main entry point
//!
//! This is the command-line interface for the Profile-Enrich worker service.

use anyhow::Context;
use clap::{Args, Parser};
use profile_enrich::broker::{consume, RedisBus};
use profile_enrich::browser::ChromeLauncher;
use profile_enrich::config::{load_candidates, load_config_with_hash, Config};
use profile_enrich::pipeline::{JobKind, JobRunner, RecordSource};
use profile_enrich::proxy::probe_candidates;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Profile-Enrich: fills in business records from their social profiles
///
/// Listens for job requests of one category, enriches the job's records
/// through a proxied headless browser and acknowledges each job with the
/// number of updated records.
#[derive(Parser, Debug)]
#[command(name = "profile-enrich")]
#[command(version = "1.0.0")]
#[command(about = "Resilient social-profile enrichment worker", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    #[command(flatten)]
    category: Category,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show the resolved job profile without connecting
    #[arg(long)]
    dry_run: bool,
}

/// Job category served by this process
#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct Category {
    /// Serve business jobs (relational store)
    #[arg(long)]
    business: bool,

    /// Serve web jobs (durable list, adaptive patience)
    #[arg(long)]
    web: bool,

    /// Serve google jobs (durable list, producer signal)
    #[arg(long)]
    google: bool,
}

impl Category {
    fn kind(&self) -> JobKind {
        if self.web {
            JobKind::Web
        } else if self.google {
            JobKind::Google
        } else {
            JobKind::Business
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok(loaded) => loaded,
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    let kind = cli.category.kind();
    if cli.dry_run {
        return handle_dry_run(&config, kind);
    }

    handle_serve(config, kind).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("profile_enrich=info,warn"),
            1 => EnvFilter::new("profile_enrich=debug,info"),
            2 => EnvFilter::new("profile_enrich=trace,debug"),
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

/// Handles the --dry-run mode: validates config and shows the job profile
fn handle_dry_run(config: &Config, kind: JobKind) -> anyhow::Result<()> {
    let profile = kind.profile();
    let candidates = load_candidates(&config.proxy)?;

    println!("=== Profile-Enrich Dry Run ===\n");

    println!("Job category: {}", kind);
    println!(
        "  Inbound key: {}",
        kind.inbound_key(&config.broker.inbound_prefix)
    );
    println!("  Fetch profile: {:?}", profile.fetch);
    println!("  Field table: {:?}", profile.table);
    match profile.source {
        RecordSource::Store => println!("  Records: {}", config.store.database_path),
        RecordSource::Queue {
            wait,
            clear_on_done,
        } => {
            println!("  Records: {}", config.queue.url);
            println!("  Wait policy: {:?}", wait.patience(&config.queue));
            println!("  Clear list when done: {}", clear_on_done);
        }
    }

    let fetch = profile.fetch.settings(config);
    println!("\nFetch:");
    println!(
        "  Attempts: {} ({} on the pool)",
        fetch.max_attempts, fetch.regular_attempts
    );
    println!("  Ban threshold: {}", fetch.ban_threshold);
    if let Some(ceiling) = fetch.fallback_ceiling {
        println!("  Fallback ceiling: {}", ceiling);
    }
    println!(
        "  Fallback egress: {}",
        config.fetch.fallback_egress.as_deref().unwrap_or("(none)")
    );

    println!("\nProxies:");
    println!("  Candidates: {}", candidates.len());
    println!("  Probe: {}", !config.proxy.skip_probe);

    println!("\nWorkers:");
    println!("  Concurrency: {}", config.worker.concurrency);
    println!("  Required fields: {}", config.worker.required_fields.join(", "));

    println!("\n✓ Configuration is valid");

    Ok(())
}

/// Handles the main service loop
async fn handle_serve(config: Config, kind: JobKind) -> anyhow::Result<()> {
    let candidates = load_candidates(&config.proxy)?;
    let endpoints = if config.proxy.skip_probe {
        candidates
    } else {
        probe_candidates(&config.proxy, candidates).await
    };
    tracing::info!("{} proxy endpoints available", endpoints.len());

    let bus = RedisBus::connect(&config.broker, kind)
        .await
        .context("Failed to connect to the message bus")?;
    tracing::info!("Listening on {}", bus.inbound_key());

    let config = Arc::new(config);
    let launcher = Arc::new(ChromeLauncher::for_fetch(&config.fetch));
    let runner = JobRunner::connect(kind, config, launcher, endpoints)
        .await
        .context("Failed to open the record backend")?;

    tokio::select! {
        result = consume(&bus, &runner) => {
            if let Err(e) = result {
                tracing::error!("Message bus closed: {}", e);
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, shutting down ({})", runner.pool().stats());
        }
    }

    Ok(())
}
