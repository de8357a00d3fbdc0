//! In-memory fleet store
//!
//! Used for testing, development and JSON snapshot files. Not persistent.

use crate::store::{FleetStore, Result, StoreError};
use fleetbalance_core::{Agent, AvailabilityZone, FleetError, Node, Role, ZoneBinding};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Raw fleet contents, also the JSON snapshot file format
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FleetData {
    #[serde(default)]
    pub azs: Vec<AvailabilityZone>,
    #[serde(default)]
    pub controllers: Vec<Node>,
    #[serde(default)]
    pub analyzers: Vec<Node>,
    #[serde(default)]
    pub controller_bindings: Vec<ZoneBinding>,
    #[serde(default)]
    pub analyzer_bindings: Vec<ZoneBinding>,
    #[serde(default)]
    pub agents: Vec<Agent>,
}

impl FleetData {
    pub fn add_az(&mut self, id: &str, region: &str) -> &mut Self {
        self.azs.push(AvailabilityZone {
            id: id.to_string(),
            region: region.to_string(),
        });
        self
    }

    pub fn add_node(&mut self, role: Role, node: Node) -> &mut Self {
        self.nodes_mut(role).push(node);
        self
    }

    pub fn bind(&mut self, role: Role, binding: ZoneBinding) -> &mut Self {
        match role {
            Role::Controller => self.controller_bindings.push(binding),
            Role::Analyzer => self.analyzer_bindings.push(binding),
        }
        self
    }

    pub fn add_agent(&mut self, agent: Agent) -> &mut Self {
        self.agents.push(agent);
        self
    }

    pub fn nodes(&self, role: Role) -> &[Node] {
        match role {
            Role::Controller => &self.controllers,
            Role::Analyzer => &self.analyzers,
        }
    }

    fn nodes_mut(&mut self, role: Role) -> &mut Vec<Node> {
        match role {
            Role::Controller => &mut self.controllers,
            Role::Analyzer => &mut self.analyzers,
        }
    }

    pub fn bindings(&self, role: Role) -> &[ZoneBinding] {
        match role {
            Role::Controller => &self.controller_bindings,
            Role::Analyzer => &self.analyzer_bindings,
        }
    }
}

/// In-memory fleet store
pub struct MemoryFleetStore {
    azs: RwLock<Vec<AvailabilityZone>>,
    nodes: RwLock<BTreeMap<Role, Vec<Node>>>,
    bindings: RwLock<BTreeMap<Role, Vec<ZoneBinding>>>,
    /// Agents keyed by id
    agents: RwLock<BTreeMap<u64, Agent>>,

    /// Agents whose writes are rejected
    failing_writes: RwLock<HashSet<u64>>,

    /// Successful write counter
    writes: AtomicU64,
}

impl MemoryFleetStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::from_data(FleetData::default())
    }

    /// Create a store holding `data`
    pub fn from_data(data: FleetData) -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(Role::Controller, data.controllers);
        nodes.insert(Role::Analyzer, data.analyzers);

        let mut bindings = BTreeMap::new();
        bindings.insert(Role::Controller, data.controller_bindings);
        bindings.insert(Role::Analyzer, data.analyzer_bindings);

        Self {
            azs: RwLock::new(data.azs),
            nodes: RwLock::new(nodes),
            bindings: RwLock::new(bindings),
            agents: RwLock::new(data.agents.into_iter().map(|a| (a.id, a)).collect()),
            failing_writes: RwLock::new(HashSet::new()),
            writes: AtomicU64::new(0),
        }
    }

    /// Parse a JSON snapshot
    pub fn from_json_str(json: &str) -> std::result::Result<Self, FleetError> {
        let data: FleetData = serde_json::from_str(json)?;
        Ok(Self::from_data(data))
    }

    /// Load a JSON snapshot file
    pub fn from_json_file(path: impl AsRef<Path>) -> std::result::Result<Self, FleetError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Write the current contents as a JSON snapshot file
    pub fn save_json_file(&self, path: impl AsRef<Path>) -> std::result::Result<(), FleetError> {
        let json = serde_json::to_string_pretty(&self.data())?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Export the current contents
    pub fn data(&self) -> FleetData {
        let nodes = self.nodes.read();
        let bindings = self.bindings.read();
        FleetData {
            azs: self.azs.read().clone(),
            controllers: nodes.get(&Role::Controller).cloned().unwrap_or_default(),
            analyzers: nodes.get(&Role::Analyzer).cloned().unwrap_or_default(),
            controller_bindings: bindings.get(&Role::Controller).cloned().unwrap_or_default(),
            analyzer_bindings: bindings.get(&Role::Analyzer).cloned().unwrap_or_default(),
            agents: self.agents.read().values().cloned().collect(),
        }
    }

    /// Look up one agent
    pub fn agent(&self, id: u64) -> Option<Agent> {
        self.agents.read().get(&id).cloned()
    }

    /// Reject every future write for this agent
    pub fn fail_writes_for(&self, agent_id: u64) {
        self.failing_writes.write().insert(agent_id);
    }

    /// Number of successful writes so far
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }
}

impl Default for MemoryFleetStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl FleetStore for MemoryFleetStore {
    async fn list_azs(&self) -> Result<Vec<AvailabilityZone>> {
        Ok(self.azs.read().clone())
    }

    async fn list_nodes(&self, role: Role) -> Result<Vec<Node>> {
        Ok(self.nodes.read().get(&role).cloned().unwrap_or_default())
    }

    async fn list_zone_bindings(&self, role: Role) -> Result<Vec<ZoneBinding>> {
        Ok(self.bindings.read().get(&role).cloned().unwrap_or_default())
    }

    async fn list_agents(&self, role: Role) -> Result<Vec<Agent>> {
        Ok(self
            .agents
            .read()
            .values()
            .filter(|a| a.is_assigned(role))
            .cloned()
            .collect())
    }

    async fn update_agent_node(&self, role: Role, agent_id: u64, node_ip: &str) -> Result<()> {
        if self.failing_writes.read().contains(&agent_id) {
            return Err(StoreError::WriteRejected(format!(
                "agent {} {} update refused",
                agent_id, role
            )));
        }

        let mut agents = self.agents.write();
        let agent = agents
            .get_mut(&agent_id)
            .ok_or(StoreError::Fleet(FleetError::UnknownAgent(agent_id)))?;

        debug!(agent = agent_id, %role, from = agent.node_ip(role), to = node_ip, "Updating agent node");
        agent.set_node_ip(role, node_ip);
        self.writes.fetch_add(1, Ordering::Relaxed);

        Ok(())
    }
}
