//! Plan Executor
//!
//! Applies a rebalance plan to the fleet store, or simulates it in check mode.
//! Every move is an independent single-field update. A failed write does not
//! stop the remaining moves; failures are collected and returned together.

use fleetbalance_core::Role;
use fleetbalance_metadata::FleetStore;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{error, info, instrument};

use crate::error::RebalanceError;
use crate::planner::RebalancePlan;

/// Check (dry run) or commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Check,
    Commit,
}

impl ExecutionMode {
    pub fn from_check_flag(check: bool) -> Self {
        if check {
            Self::Check
        } else {
            Self::Commit
        }
    }

    pub fn is_check(&self) -> bool {
        matches!(self, Self::Check)
    }
}

/// A move whose write failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MoveFailure {
    pub agent_id: u64,
    pub agent_name: String,
    pub role: Role,
    pub from: String,
    pub to: String,
    pub error: String,
}

/// Overall execution result
#[derive(Debug, Default)]
pub struct ExecutionResult {
    /// Writes that succeeded
    pub applied: usize,
    /// Writes that failed
    pub failures: Vec<MoveFailure>,
    /// Moves not written (check mode)
    pub skipped: usize,
    /// Total execution time
    pub duration: Duration,
}

impl ExecutionResult {
    /// Success rate as percentage
    pub fn success_rate(&self) -> f64 {
        let total = self.applied + self.failures.len();
        if total == 0 {
            100.0
        } else {
            (self.applied as f64 / total as f64) * 100.0
        }
    }

    /// Summary string
    pub fn summary(&self) -> String {
        format!(
            "{} applied, {} failed, {} skipped in {:?} ({:.1}% success rate)",
            self.applied,
            self.failures.len(),
            self.skipped,
            self.duration,
            self.success_rate()
        )
    }

    /// `Err(PartialCommit)` if any write failed
    pub fn into_result(self) -> Result<usize, RebalanceError> {
        if self.failures.is_empty() {
            Ok(self.applied)
        } else {
            Err(RebalanceError::PartialCommit {
                applied: self.applied,
                failures: self.failures,
            })
        }
    }
}

/// Plan executor
#[derive(Debug, Clone, Default)]
pub struct Executor;

impl Executor {
    /// Create a new executor
    pub fn new() -> Self {
        Self
    }

    /// Execute a rebalance plan
    #[instrument(skip(self, store, plan), fields(role = %plan.role, moves = plan.moves.len()))]
    pub async fn execute(
        &self,
        store: &dyn FleetStore,
        plan: &RebalancePlan,
        mode: ExecutionMode,
    ) -> ExecutionResult {
        let start = Instant::now();
        let mut result = ExecutionResult::default();

        if plan.moves.is_empty() {
            info!("No moves to execute");
            return result;
        }

        if mode.is_check() {
            result.skipped = plan.moves.len();
            info!(moves = result.skipped, "Check mode, not writing");
            return result;
        }

        for planned in &plan.moves {
            match store
                .update_agent_node(plan.role, planned.agent_id, &planned.to)
                .await
            {
                Ok(()) => result.applied += 1,
                Err(e) => {
                    error!(
                        agent = %planned.agent_name,
                        from = %planned.from,
                        to = %planned.to,
                        error = %e,
                        "Failed to reassign agent"
                    );
                    result.failures.push(MoveFailure {
                        agent_id: planned.agent_id,
                        agent_name: planned.agent_name.clone(),
                        role: plan.role,
                        from: planned.from.clone(),
                        to: planned.to.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        result.duration = start.elapsed();

        info!(summary = %result.summary(), "Rebalance plan execution complete");

        result
    }
}
