//! Fleetbalance Rebalancer
//!
//! Runs one agent rebalance against the controller database or a JSON fleet
//! snapshot and prints the resulting report as JSON.

use clap::Parser;
use fleetbalance_core::{FleetError, RebalanceReport, Role};
use fleetbalance_metadata::{DbConfig, FleetStore, MemoryFleetStore, PostgresFleetStore};
use fleetbalance_rebalancer::{RebalanceError, RebalanceRequest, Rebalancer, RebalancerConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fleetbalance-rebalancer")]
#[command(about = "Rebalance monitoring agents across controller or analyzer nodes")]
struct Cli {
    /// Node role to rebalance
    #[arg(long, default_value = "controller")]
    role: Role,

    /// Compute the plan without writing it
    #[arg(long, default_value = "false")]
    check: bool,

    /// Analyzer algorithm (by-ingested-data | by-agent-count)
    #[arg(long, env = "FLEETBALANCE_ANALYZER_ALGORITHM")]
    algorithm: Option<String>,

    /// Traffic sampling window in seconds
    #[arg(long, env = "FLEETBALANCE_DATA_DURATION_SECS")]
    data_duration: Option<u64>,

    /// JSON fleet snapshot to use instead of the database
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Write the rebalanced fleet back to the snapshot file (commit mode only)
    #[arg(long, default_value = "false", requires = "snapshot")]
    save: bool,

    /// PostgreSQL database URL
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Log as JSON
    #[arg(long, default_value = "false")]
    log_json: bool,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let mut config = RebalancerConfig::from_env()?;
    if let Some(algorithm) = cli.algorithm.clone() {
        config.strategy.algorithm = algorithm;
    }
    if let Some(secs) = cli.data_duration {
        config.strategy.data_duration = Duration::from_secs(secs);
    }
    if cli.database_url.is_some() {
        config.database_url = cli.database_url.clone();
    }

    info!(
        role = %cli.role,
        check = cli.check,
        algorithm = %config.strategy.algorithm,
        snapshot = ?cli.snapshot,
        "Starting fleetbalance rebalancer"
    );

    let memory_store = match &cli.snapshot {
        Some(path) => Some(Arc::new(MemoryFleetStore::from_json_file(path)?)),
        None => None,
    };

    let store: Arc<dyn FleetStore> = match &memory_store {
        Some(store) => store.clone() as Arc<dyn FleetStore>,
        None => {
            let url = config.require_database_url()?;
            Arc::new(PostgresFleetStore::connect(DbConfig::with_url(url)).await?)
        }
    };

    let rebalancer = Rebalancer::new(store, config);
    let outcome = rebalancer
        .rebalance(RebalanceRequest::new(cli.role, cli.check))
        .await;

    if let (true, false, Some(store), Some(path)) =
        (cli.save, cli.check, &memory_store, &cli.snapshot)
    {
        if let Err(e) = save_snapshot(store, path, &outcome) {
            if let Err(run_err) = &outcome {
                error!(error = %run_err, "Rebalance failed");
            }
            return Err(e.into());
        }
    }

    let report = outcome?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}

/// Persist the store after a commit that wrote anything
///
/// A partial commit is saved too; its applied moves are already in the store.
fn save_snapshot(
    store: &MemoryFleetStore,
    path: &Path,
    outcome: &Result<RebalanceReport, RebalanceError>,
) -> Result<bool, FleetError> {
    match outcome {
        Ok(_) | Err(RebalanceError::PartialCommit { .. }) => {
            store.save_json_file(path)?;
            info!(path = %path.display(), "Saved rebalanced snapshot");
            Ok(true)
        }
        Err(_) => Ok(false),
    }
}
