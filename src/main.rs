use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use common::catalog::Catalog;
use common::config::Configuration;
use common::storage::object_store_from_config;
use reconciler::{ObjectStoreGateway, ReconcileEngine};
use scheduler::JobScheduler;

/// Name the reconciliation job is registered under.
const RECONCILE_JOB: &str = "reconcile-orphans";

#[derive(Parser, Debug)]
#[command(author, version, about = "Object store reconciliation service", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "janitor.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the service and run scheduled jobs (default)
    Start,
    /// Run a named job once, outside of its schedule
    Run {
        /// Job name, e.g. "reconcile-orphans"
        name: String,
    },
    /// Show the effective configuration and exit
    Config {
        #[arg(long, help = "Show configuration in JSON format")]
        json: bool,
    },
    /// Validate the configuration and exit
    Validate,
}

/// Waits for a shutdown signal (SIGINT or SIGTERM)
async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;
        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

        tokio::select! {
            _ = sigint.recv() => log::info!("Received SIGINT"),
            _ = sigterm.recv() => log::info!("Received SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for shutdown signal")?;
        log::info!("Received Ctrl+C");
    }

    Ok(())
}

/// Wire catalog, store, engine, and scheduler from the configuration.
async fn build_scheduler(config: &Configuration) -> Result<JobScheduler> {
    let catalog = Catalog::new(&config.database.dsn)
        .await
        .context("Failed to connect to catalog database")?;

    let store = object_store_from_config(&config.storage)
        .context("Failed to create object store client")?;
    let gateway = ObjectStoreGateway::new(store).with_page_size(config.reconciler.page_size);

    let engine = Arc::new(ReconcileEngine::new(
        gateway,
        Arc::new(catalog),
        config.reconciler.clone(),
    ));

    let mut jobs = JobScheduler::new();
    jobs.register_job(
        RECONCILE_JOB,
        &config.reconciler.schedule,
        scheduler::handler(move || {
            let engine = engine.clone();
            async move {
                let stats = engine.reconcile_orphans().await?;
                tracing::info!(
                    deleted = stats.deleted,
                    total = stats.total,
                    "Reconciliation job completed"
                );
                Ok(serde_json::to_value(stats)?)
            }
        }),
        config.reconciler.enabled,
    );

    Ok(jobs)
}

async fn serve(config: Configuration) -> Result<()> {
    let mut jobs = build_scheduler(&config).await?;
    jobs.start_all_jobs();

    tracing::info!("Janitor service running, waiting for shutdown signal");
    wait_for_shutdown_signal().await?;

    tracing::info!("Received shutdown signal, stopping service");
    jobs.stop_all_jobs();

    Ok(())
}

async fn run_once(config: Configuration, name: &str) -> Result<()> {
    let jobs = build_scheduler(&config).await?;

    let outcome = jobs
        .run_job_manually(name)
        .await
        .with_context(|| format!("Manual run of job '{name}' failed"))?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);

    Ok(())
}

fn display_config(config: &Configuration, json: bool) -> Result<()> {
    if json {
        let json = serde_json::to_string_pretty(config)
            .context("Failed to serialize configuration to JSON")?;
        println!("{json}");
    } else {
        println!("Janitor Configuration:");
        println!("======================");
        println!("Database DSN: {}", config.database.dsn);
        println!("Storage DSN: {}", config.storage.dsn);
        println!("Reconciler enabled: {}", config.reconciler.enabled);
        println!("Reconciler schedule: {}", config.reconciler.schedule);
        println!("Reconciler dry run: {}", config.reconciler.dry_run);
        println!("Reconciler page size: {}", config.reconciler.page_size);
        match config.reconciler.run_timeout {
            Some(timeout) => println!("Reconciler run timeout: {timeout:?}"),
            None => println!("Reconciler run timeout: none"),
        }
    }
    Ok(())
}

fn validate_config(config: &Configuration) -> Result<()> {
    if config.database.dsn.is_empty() {
        anyhow::bail!("Database DSN cannot be empty");
    }
    if config.storage.dsn.is_empty() {
        anyhow::bail!("Storage DSN cannot be empty");
    }
    if !scheduler::validate_schedule(&config.reconciler.schedule) {
        anyhow::bail!(
            "Invalid reconciler cron schedule: {}",
            config.reconciler.schedule
        );
    }

    println!("Configuration is valid");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let config = if args.config.exists() {
        Configuration::load_from_path(&args.config).context("Failed to load configuration")?
    } else {
        log::info!("Configuration file not found, using defaults and environment");
        Configuration::load().context("Failed to load configuration")?
    };

    match args.command.unwrap_or(Command::Start) {
        Command::Start => serve(config).await,
        Command::Run { name } => run_once(config, &name).await,
        Command::Config { json } => display_config(&config, json),
        Command::Validate => validate_config(&config),
    }
}
