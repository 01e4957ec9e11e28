//! fleetd — the fleetguard daemon.
//!
//! Polls the configured brokers and coordination-service nodes, and
//! runs remediation for the ones that fail.
//!
//! # Usage
//!
//! ```text
//! fleetd run --config /etc/fleetguard/fleetd.toml
//! fleetd check --config fleetd.toml
//! fleetd validate --config fleetd.toml
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};

use fleetd::config::FleetConfig;
use fleetd::Daemon;

/// How long shutdown waits for an in-flight tick before aborting it.
const SHUTDOWN_JOIN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "fleetd", about = "fleetguard cluster health monitor and recovery daemon")]
struct Cli {
    /// Log output format.
    #[arg(long, value_enum, default_value = "text", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Monitor the cluster and recover failed nodes until interrupted.
    Run {
        /// Path to fleetd.toml.
        #[arg(long, short)]
        config: PathBuf,
    },
    /// Check every node once, print statuses as JSON, and exit.
    Check {
        #[arg(long, short)]
        config: PathBuf,
    },
    /// Load and validate a config file.
    Validate {
        #[arg(long, short)]
        config: PathBuf,
    },
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,fleetd=debug,fleetguard=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Command::Run { config } => run(FleetConfig::from_file(&config)?).await,
        Command::Check { config } => check(FleetConfig::from_file(&config)?).await,
        Command::Validate { config } => {
            let loaded = FleetConfig::from_file(&config)?;
            println!(
                "{}: ok ({} nodes, {} actions)",
                config.display(),
                loaded.nodes.len(),
                loaded.actions.len()
            );
            Ok(())
        }
    }
}

async fn run(config: FleetConfig) -> anyhow::Result<()> {
    info!(
        nodes = config.nodes.len(),
        actions = config.actions.len(),
        "fleetd starting"
    );

    let daemon = Daemon::build(&config)?;
    let coordinator = daemon.coordinator.clone();
    let handle = daemon.monitor.spawn();

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    if !handle.stop(SHUTDOWN_JOIN_TIMEOUT).await {
        warn!("monitoring loop was aborted during shutdown");
    }

    let stats = coordinator.stats().await;
    info!(
        failures = stats.total_failures,
        recoveries = stats.total_recoveries,
        escalations = stats.total_escalations,
        "fleetd stopped"
    );
    Ok(())
}

async fn check(config: FleetConfig) -> anyhow::Result<()> {
    let monitor = fleetd::build_probe_only(&config)?;
    let mut statuses = monitor.check_all_nodes_once().await;
    statuses.sort_by(|a, b| a.node_id.cmp(&b.node_id));
    println!("{}", serde_json::to_string_pretty(&statuses)?);
    Ok(())
}
