//! Lagoon - mirrors repositories on a schedule and publishes dated snapshots.
//!
//! The default `run` command starts the daemon; the other commands inspect
//! configuration and snapshots or run a single sync by hand.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use lagoon_config::{LagoonConfig, CONFIG_FILENAME};
use lagoon_sync::{describe_metrics, CronScheduler, Registry, SyncOutcome};

/// Upper bound on waiting for the metrics endpoint during shutdown.
const METRICS_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "lagoon")]
#[command(about = "Lagoon - Repository mirroring with dated snapshots")]
#[command(version)]
struct Cli {
    /// Enable debug logging.
    #[arg(short, long, global = true)]
    debug: bool,

    /// Human readable log output instead of JSON lines.
    #[arg(long, global = true)]
    human: bool,

    /// Configuration file.
    #[arg(short, long, global = true, default_value = CONFIG_FILENAME)]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler until SIGINT or SIGTERM (default).
    Run {
        /// Metrics listen address, overrides the configured one.
        #[arg(long)]
        metrics_addr: Option<SocketAddr>,
    },

    /// Validate the configuration and list the repositories.
    Check,

    /// Sync one repository right away.
    Sync {
        /// Repository id.
        id: String,
    },

    /// List the staged snapshots of a repository.
    Snapshots {
        /// Repository id.
        id: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.debug, cli.human) {
        eprintln!("Error: {:#}", e);
        return ExitCode::FAILURE;
    }

    let result = match cli.command.unwrap_or(Commands::Run { metrics_addr: None }) {
        Commands::Run { metrics_addr } => cmd_run(&cli.config, metrics_addr).await,
        Commands::Check => cmd_check(&cli.config),
        Commands::Sync { id } => cmd_sync(&cli.config, &id).await,
        Commands::Snapshots { id } => cmd_snapshots(&cli.config, &id).await,
    };
    exit_code(result)
}

/// Log a failed command through the installed subscriber and map it to
/// the process exit status.
fn exit_code(result: Result<()>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Install the tracing subscriber. `RUST_LOG` overrides `--debug`.
fn init_logging(debug: bool, human: bool) -> Result<()> {
    let level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let installed = if human {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_current_span(true)
            .try_init()
    };

    installed.map_err(|e| anyhow!("Failed to install logger: {}", e))
}

/// Load configuration and build the registry.
fn load_registry(config_path: &Path) -> Result<(Registry, SocketAddr)> {
    let config = LagoonConfig::load(config_path).context("Unable to load configuration")?;
    let metrics_addr = config.settings.metrics_addr;
    let registry = Registry::bootstrap(config).context("Unable to set up repositories")?;
    Ok((registry, metrics_addr))
}

/// Run the daemon until a termination signal arrives.
async fn cmd_run(config_path: &Path, metrics_addr: Option<SocketAddr>) -> Result<()> {
    info!("Starting Lagoon");

    let (registry, configured_addr) = load_registry(config_path)?;
    let exporter = start_metrics_exporter(metrics_addr.unwrap_or(configured_addr))?;

    registry
        .preflight()
        .await
        .context("Prerequisite checks failed")?;

    let scheduler = CronScheduler::start(registry.controllers(), registry.tracker())?;

    info!("Lagoon running");
    shutdown_signal().await?;

    scheduler.stop().await;

    info!("Waiting for running sync jobs to exit gracefully");
    registry.wait_idle().await;

    exporter.abort();
    if tokio::time::timeout(METRICS_SHUTDOWN_TIMEOUT, exporter)
        .await
        .is_err()
    {
        error!("Metrics endpoint did not shut down in time");
    }

    info!("Exiting");
    Ok(())
}

/// Install the Prometheus recorder and serve it over HTTP.
fn start_metrics_exporter(addr: SocketAddr) -> Result<JoinHandle<()>> {
    let (recorder, exporter) = PrometheusBuilder::new()
        .with_http_listener(addr)
        .build()
        .context("Unable to build metrics exporter")?;
    metrics::set_global_recorder(recorder)
        .map_err(|_| anyhow!("A metrics recorder is already installed"))?;
    describe_metrics();

    info!("Serving metrics on http://{}/metrics", addr);
    Ok(tokio::spawn(async move {
        if let Err(e) = exporter.await {
            error!("Metrics endpoint failed: {:?}", e);
        }
    }))
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() -> Result<()> {
    let mut terminate =
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

    tokio::select! {
        received = tokio::signal::ctrl_c() => {
            received.context("Failed to listen for SIGINT")?;
            debug!("Received SIGINT");
        }
        _ = terminate.recv() => {
            debug!("Received SIGTERM");
        }
    }

    Ok(())
}

/// Validate configuration and print the repositories.
fn cmd_check(config_path: &Path) -> Result<()> {
    let (registry, metrics_addr) = load_registry(config_path)?;

    println!("Configuration OK: {}", config_path.display());
    println!("  Metrics: {}", metrics_addr);
    for controller in registry.controllers() {
        let spec = controller.spec();
        println!();
        println!("  [{}] {}", spec.id, spec.name);
        println!("    Type: {}", spec.kind.as_str());
        println!("    Schedule: {}", spec.cron);
        println!("    Snapshots kept: {}", spec.snapshots);
        println!("    Upstream: {}", controller.store().paths().upstream.display());
        if !spec.exclude.is_empty() {
            println!("    Exclude: {}", spec.exclude.join(", "));
        }
    }

    Ok(())
}

/// Run one sync of a repository in the foreground.
async fn cmd_sync(config_path: &Path, id: &str) -> Result<()> {
    let (registry, _) = load_registry(config_path)?;
    let controller = registry
        .get(id)
        .with_context(|| format!("Unknown repository '{}'", id))?;

    controller
        .prereqs()
        .await
        .context("Prerequisite checks failed")?;

    let outcome = controller.sync().await;
    registry.wait_idle().await;

    match outcome {
        SyncOutcome::Completed { snapshot } => {
            match snapshot {
                Some(snapshot) => println!("Sync completed, snapshot {}", snapshot),
                None => println!("Sync completed, no new snapshot"),
            }
            Ok(())
        }
        SyncOutcome::TransportFailed => anyhow::bail!("Sync of '{}' failed after retries", id),
        SyncOutcome::AlreadyRunning => anyhow::bail!("Sync of '{}' already in progress", id),
    }
}

/// Print staged snapshots, marking published ones and `latest`.
async fn cmd_snapshots(config_path: &Path, id: &str) -> Result<()> {
    let (registry, _) = load_registry(config_path)?;
    let controller = registry
        .get(id)
        .with_context(|| format!("Unknown repository '{}'", id))?;
    let store = controller.store();

    let snapshots = store
        .list_snapshots()
        .await
        .context("Failed to list snapshots")?;
    let latest = store.latest().await.context("Failed to read latest")?;

    if snapshots.is_empty() {
        println!("No snapshots for {}.", id);
        return Ok(());
    }

    println!("Snapshots of {}:", id);
    for snapshot in snapshots {
        let published = if store.is_published(&snapshot).await {
            "published"
        } else {
            "staged"
        };
        let marker = if latest.as_ref() == Some(&snapshot) {
            " (latest)"
        } else {
            ""
        };
        println!("  {}  {}{}", snapshot, published, marker);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_default_command_is_run() {
        let cli = Cli::parse_from(["lagoon", "-d"]);
        assert!(cli.debug);
        assert!(cli.command.is_none());
        assert_eq!(cli.config, PathBuf::from(CONFIG_FILENAME));
    }

    #[test]
    fn test_exit_code() {
        assert_eq!(exit_code(Ok(())), ExitCode::SUCCESS);
        assert_eq!(
            exit_code(Err(anyhow!("Unable to load configuration"))),
            ExitCode::FAILURE
        );
    }

    #[test]
    fn test_sync_command() {
        let cli = Cli::parse_from(["lagoon", "--human", "sync", "centos", "-c", "/etc/lagoon.yaml"]);
        assert!(cli.human);
        assert_eq!(cli.config, PathBuf::from("/etc/lagoon.yaml"));
        assert!(matches!(cli.command, Some(Commands::Sync { ref id }) if id == "centos"));
    }
}
