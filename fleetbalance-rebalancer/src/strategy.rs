//! Strategy selection
//!
//! Controllers are always balanced by agent count. Analyzers are balanced by
//! agent count or, delegated to an external collaborator, by ingested traffic.

use fleetbalance_core::{RebalanceReport, Role};
use fleetbalance_metadata::FleetStore;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};

use crate::config::LoadBalancingStrategy;
use crate::error::{RebalanceError, Result};
use crate::executor::{ExecutionMode, Executor};
use crate::planner::Planner;

pub const BY_INGESTED_DATA: &str = "by-ingested-data";
pub const BY_AGENT_COUNT: &str = "by-agent-count";

/// Configured analyzer algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalyzerAlgorithm {
    ByIngestedData,
    ByAgentCount,
}

impl FromStr for AnalyzerAlgorithm {
    type Err = RebalanceError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            BY_INGESTED_DATA => Ok(Self::ByIngestedData),
            BY_AGENT_COUNT => Ok(Self::ByAgentCount),
            other => Err(RebalanceError::UnsupportedStrategy(other.to_string())),
        }
    }
}

/// Which strategy a request runs with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    CountBased,
    Traffic { data_duration: Duration },
}

impl StrategyKind {
    /// Pick the strategy for a role; fails on an unknown analyzer algorithm
    pub fn select(role: Role, config: &LoadBalancingStrategy) -> Result<Self> {
        match role {
            Role::Controller => Ok(Self::CountBased),
            Role::Analyzer => match config.algorithm.parse::<AnalyzerAlgorithm>()? {
                AnalyzerAlgorithm::ByAgentCount => Ok(Self::CountBased),
                AnalyzerAlgorithm::ByIngestedData => Ok(Self::Traffic {
                    data_duration: config.data_duration,
                }),
            },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::CountBased => BY_AGENT_COUNT,
            Self::Traffic { .. } => BY_INGESTED_DATA,
        }
    }
}

/// Produces (and in commit mode applies) a rebalance for one role
#[async_trait::async_trait]
pub trait RebalanceStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn rebalance(
        &self,
        store: &dyn FleetStore,
        role: Role,
        mode: ExecutionMode,
    ) -> Result<RebalanceReport>;
}

/// External traffic-volume balancer for analyzers
///
/// Owns its own data access; it is handed only the check flag and the
/// sampling window.
#[async_trait::async_trait]
pub trait TrafficRebalancer: Send + Sync {
    async fn rebalance_by_traffic(
        &self,
        check: bool,
        data_duration: Duration,
    ) -> std::result::Result<RebalanceReport, Box<dyn std::error::Error + Send + Sync>>;
}

/// Agent-count balancing (planner + executor)
#[derive(Debug, Clone, Default)]
pub struct CountBasedStrategy {
    planner: Planner,
    executor: Executor,
}

impl CountBasedStrategy {
    pub fn new(planner: Planner, executor: Executor) -> Self {
        Self { planner, executor }
    }
}

#[async_trait::async_trait]
impl RebalanceStrategy for CountBasedStrategy {
    fn name(&self) -> &'static str {
        BY_AGENT_COUNT
    }

    #[instrument(skip(self, store))]
    async fn rebalance(
        &self,
        store: &dyn FleetStore,
        role: Role,
        mode: ExecutionMode,
    ) -> Result<RebalanceReport> {
        let snapshot = store.snapshot(role).await?;
        let plan = self.planner.plan(role, &snapshot)?;

        let result = self.executor.execute(store, &plan, mode).await;
        result.into_result()?;

        Ok(plan.report.with_uniform_weights(1.0))
    }
}

/// Traffic balancing, delegated
pub struct TrafficStrategy {
    inner: Arc<dyn TrafficRebalancer>,
    data_duration: Duration,
}

impl TrafficStrategy {
    pub fn new(inner: Arc<dyn TrafficRebalancer>, data_duration: Duration) -> Self {
        Self {
            inner,
            data_duration,
        }
    }
}

#[async_trait::async_trait]
impl RebalanceStrategy for TrafficStrategy {
    fn name(&self) -> &'static str {
        BY_INGESTED_DATA
    }

    async fn rebalance(
        &self,
        _store: &dyn FleetStore,
        role: Role,
        mode: ExecutionMode,
    ) -> Result<RebalanceReport> {
        info!(%role, data_duration = ?self.data_duration, "Delegating to traffic rebalancer");
        self.inner
            .rebalance_by_traffic(mode.is_check(), self.data_duration)
            .await
            .map_err(|e| RebalanceError::Traffic(e.to_string()))
    }
}
