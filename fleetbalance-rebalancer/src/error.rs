//! Rebalance errors
//!
//! Everything that aborts a rebalance call. Unserved AZs are not errors; the
//! planner skips them.

use fleetbalance_core::Role;
use fleetbalance_metadata::StoreError;
use thiserror::Error;

use crate::executor::MoveFailure;
use crate::planner::PlannerError;
use crate::strategy::{BY_AGENT_COUNT, BY_INGESTED_DATA};

/// Rebalance errors
#[derive(Error, Debug)]
pub enum RebalanceError {
    #[error("No available {role}s, global rebalancing is not possible")]
    NoHealthyNodes { role: Role },

    #[error(
        "algorithm({0}) is not supported, only supports: {by_data}, {by_count}",
        by_data = BY_INGESTED_DATA,
        by_count = BY_AGENT_COUNT
    )]
    UnsupportedStrategy(String),

    #[error("Strategy {0} is configured but no implementation is available")]
    StrategyUnavailable(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("{} of {} agent reassignments failed", .failures.len(), .applied + .failures.len())]
    PartialCommit {
        applied: usize,
        failures: Vec<MoveFailure>,
    },

    #[error("Traffic rebalancer failed: {0}")]
    Traffic(String),
}

impl From<PlannerError> for RebalanceError {
    fn from(err: PlannerError) -> Self {
        match err {
            PlannerError::NoHealthyNodes { role } => RebalanceError::NoHealthyNodes { role },
        }
    }
}

pub type Result<T> = std::result::Result<T, RebalanceError>;
