//! Fleetbalance Rebalancer Library
//!
//! Rebalances monitoring agents across their controller and analyzer nodes.
//!
//! A rebalance call runs:
//! - Strategy selection (agent count, or delegated traffic balancing)
//! - Topology resolution (AZ -> serving nodes, region wildcards expanded)
//! - Capacity accounting (per-node load and headroom per AZ)
//! - Greedy planning (flatten each AZ toward its average load)
//! - Execution (write the new assignments, or nothing in check mode)

pub mod capacity;
pub mod config;
pub mod error;
pub mod executor;
pub mod planner;
pub mod strategy;
pub mod topology;

use fleetbalance_core::{RebalanceReport, Role};
use fleetbalance_metadata::FleetStore;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, instrument};

// Re-export main types
pub use capacity::{AzCapacity, NodeCapacity};
pub use config::{ConfigError, LoadBalancingStrategy, RebalancerConfig};
pub use error::{RebalanceError, Result};
pub use executor::{ExecutionMode, ExecutionResult, Executor, MoveFailure};
pub use planner::{PlannedMove, Planner, PlannerConfig, PlannerError, RebalancePlan};
pub use strategy::{
    AnalyzerAlgorithm, CountBasedStrategy, RebalanceStrategy, StrategyKind, TrafficRebalancer,
    TrafficStrategy,
};
pub use topology::Topology;

/// A rebalance trigger from the API layer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct RebalanceRequest {
    /// `controller` (default) or `analyzer`
    #[serde(default, rename = "type")]
    pub role: Role,
    /// Compute the plan without writing it
    #[serde(default)]
    pub check: bool,
}

impl RebalanceRequest {
    pub fn new(role: Role, check: bool) -> Self {
        Self { role, check }
    }
}

/// Rebalancing engine
///
/// Calls for the same role are serialized: the role lock is held from the
/// snapshot read to the last write.
pub struct Rebalancer {
    store: Arc<dyn FleetStore>,
    config: RebalancerConfig,
    count_based: CountBasedStrategy,
    traffic: Option<Arc<dyn TrafficRebalancer>>,
    controller_lock: Mutex<()>,
    analyzer_lock: Mutex<()>,
}

impl Rebalancer {
    /// Create a new rebalancer over a fleet store
    pub fn new(store: Arc<dyn FleetStore>, config: RebalancerConfig) -> Self {
        let planner = Planner::new(PlannerConfig {
            reserve_on_stay: config.reserve_on_stay,
        });

        Self {
            store,
            config,
            count_based: CountBasedStrategy::new(planner, Executor::new()),
            traffic: None,
            controller_lock: Mutex::new(()),
            analyzer_lock: Mutex::new(()),
        }
    }

    /// Wire in the traffic-volume balancer used by `by-ingested-data`
    pub fn with_traffic_rebalancer(mut self, traffic: Arc<dyn TrafficRebalancer>) -> Self {
        self.traffic = Some(traffic);
        self
    }

    pub fn config(&self) -> &RebalancerConfig {
        &self.config
    }

    fn lock_for(&self, role: Role) -> &Mutex<()> {
        match role {
            Role::Controller => &self.controller_lock,
            Role::Analyzer => &self.analyzer_lock,
        }
    }

    /// Run one rebalance
    #[instrument(skip(self))]
    pub async fn rebalance(&self, request: RebalanceRequest) -> Result<RebalanceReport> {
        let kind = StrategyKind::select(request.role, &self.config.strategy)?;
        let mode = ExecutionMode::from_check_flag(request.check);

        let traffic_strategy;
        let strategy: &dyn RebalanceStrategy = match kind {
            StrategyKind::CountBased => &self.count_based,
            StrategyKind::Traffic { data_duration } => {
                let inner = self
                    .traffic
                    .clone()
                    .ok_or_else(|| RebalanceError::StrategyUnavailable(kind.name().to_string()))?;
                traffic_strategy = TrafficStrategy::new(inner, data_duration);
                &traffic_strategy
            }
        };

        let _guard = self.lock_for(request.role).lock().await;

        info!(
            role = %request.role,
            check = request.check,
            strategy = strategy.name(),
            "Starting rebalance"
        );

        let report = strategy
            .rebalance(self.store.as_ref(), request.role, mode)
            .await?;

        info!(summary = %report.summary(), "Rebalance complete");

        Ok(report)
    }
}
