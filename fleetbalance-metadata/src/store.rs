//! Fleet store trait
//!
//! Defines the interface the rebalancer uses to read a fleet snapshot and to
//! write agent re-assignments back.

use fleetbalance_core::{Agent, AvailabilityZone, FleetError, Node, Role, ZoneBinding};
use thiserror::Error;

/// Store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Invalid data: {0}")]
    Invalid(String),

    #[error("Write rejected: {0}")]
    WriteRejected(String),

    #[error(transparent)]
    Fleet(#[from] FleetError),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Everything the engine reads for one role, taken at invocation start
#[derive(Debug, Clone, Default)]
pub struct FleetSnapshot {
    pub azs: Vec<AvailabilityZone>,
    pub nodes: Vec<Node>,
    pub bindings: Vec<ZoneBinding>,
    /// Agents with a node assigned for the role
    pub agents: Vec<Agent>,
}

/// Fleet store
///
/// Implementations must be Send + Sync so one store can back concurrent
/// controller and analyzer runs.
#[async_trait::async_trait]
pub trait FleetStore: Send + Sync {
    /// All availability zones
    async fn list_azs(&self) -> Result<Vec<AvailabilityZone>>;

    /// All nodes of a role
    async fn list_nodes(&self, role: Role) -> Result<Vec<Node>>;

    /// Zone bindings of a role's nodes
    async fn list_zone_bindings(&self, role: Role) -> Result<Vec<ZoneBinding>>;

    /// Agents that have a node assigned for `role`
    async fn list_agents(&self, role: Role) -> Result<Vec<Agent>>;

    /// Point an agent at a new node. Idempotent.
    async fn update_agent_node(&self, role: Role, agent_id: u64, node_ip: &str) -> Result<()>;

    /// Read a full snapshot for a role
    async fn snapshot(&self, role: Role) -> Result<FleetSnapshot> {
        Ok(FleetSnapshot {
            azs: self.list_azs().await?,
            nodes: self.list_nodes(role).await?,
            bindings: self.list_zone_bindings(role).await?,
            agents: self.list_agents(role).await?,
        })
    }
}
