//! Rebalance Planner
//!
//! Greedy, single-pass redistribution of agents within each AZ:
//! - Target load per node is `ceil(agents_in_az / healthy_nodes_in_az)`
//! - Agents past the target on an overloaded node are candidates
//! - Each candidate goes to the healthy node with the most headroom
//!
//! Ordering is deterministic. Overloaded nodes are visited by IP, candidates
//! by agent id, and headroom ties go to the lowest IP.

use fleetbalance_core::{Agent, NodeRebalanceEntry, RebalanceReport, Role};
use fleetbalance_metadata::FleetSnapshot;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::capacity::{usable_node_count, AzCapacity};
use crate::topology::Topology;

/// Planner errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlannerError {
    #[error("No available {role}s, global rebalancing is not possible")]
    NoHealthyNodes { role: Role },
}

pub type Result<T> = std::result::Result<T, PlannerError>;

/// A single agent reassignment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedMove {
    pub agent_id: u64,
    pub agent_name: String,
    pub az: String,
    /// Current node
    pub from: String,
    /// New node
    pub to: String,
}

/// Plan for one role: the moves to apply plus the report to return
#[derive(Debug, Clone)]
pub struct RebalancePlan {
    pub role: Role,
    pub moves: Vec<PlannedMove>,
    pub report: RebalanceReport,
}

impl RebalancePlan {
    /// Moves off a specific node
    pub fn moves_from(&self, ip: &str) -> Vec<&PlannedMove> {
        self.moves.iter().filter(|m| m.from == ip).collect()
    }

    /// Moves onto a specific node
    pub fn moves_to(&self, ip: &str) -> Vec<&PlannedMove> {
        self.moves.iter().filter(|m| m.to == ip).collect()
    }

    /// Summary of the plan
    pub fn summary(&self) -> String {
        let sources: BTreeSet<_> = self.moves.iter().map(|m| m.from.as_str()).collect();
        let targets: BTreeSet<_> = self.moves.iter().map(|m| m.to.as_str()).collect();
        format!(
            "{} {} moves, {} source nodes, {} target nodes",
            self.moves.len(),
            self.role,
            sources.len(),
            targets.len()
        )
    }
}

/// Planner configuration
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    /// Take a headroom unit from the chosen node even when it is the
    /// candidate's current node and nothing moves.
    ///
    /// With this off, a source node that ties for the most headroom wins
    /// every pick and never sheds its excess.
    pub reserve_on_stay: bool,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            reserve_on_stay: true,
        }
    }
}

/// Rebalance planner
#[derive(Debug, Clone, Default)]
pub struct Planner {
    config: PlannerConfig,
}

impl Planner {
    /// Create a new planner
    pub fn new(config: PlannerConfig) -> Self {
        Self { config }
    }

    /// Plan a rebalance of every AZ in the snapshot
    #[instrument(skip(self, snapshot), fields(agents = snapshot.agents.len(), nodes = snapshot.nodes.len()))]
    pub fn plan(&self, role: Role, snapshot: &FleetSnapshot) -> Result<RebalancePlan> {
        if usable_node_count(&snapshot.nodes) == 0 {
            return Err(PlannerError::NoHealthyNodes { role });
        }

        let topology = Topology::resolve(&snapshot.azs, &snapshot.nodes, &snapshot.bindings);

        let mut az_to_agents: BTreeMap<&str, Vec<&Agent>> = BTreeMap::new();
        for agent in snapshot.agents.iter().filter(|a| a.is_assigned(role)) {
            az_to_agents.entry(agent.az.as_str()).or_default().push(agent);
        }

        let az_ids: BTreeSet<&str> = snapshot.azs.iter().map(|az| az.id.as_str()).collect();

        let mut plan = RebalancePlan {
            role,
            moves: Vec::new(),
            report: RebalanceReport::default(),
        };

        for az in az_ids {
            let Some(agents) = az_to_agents.get(az) else {
                continue;
            };
            let Some(nodes) = topology.nodes_for(az) else {
                debug!(az, agents = agents.len(), "No nodes serve AZ, skipping");
                continue;
            };

            let capacity = AzCapacity::account(az, role, agents, &nodes);
            let (moves, report) = self.plan_az(role, &capacity);

            plan.moves.extend(moves);
            plan.report.merge(report);
        }

        plan.report.sort();

        info!(summary = %plan.summary(), "Rebalance plan created");

        Ok(plan)
    }

    /// Plan one AZ
    pub fn plan_az(&self, role: Role, capacity: &AzCapacity) -> (Vec<PlannedMove>, RebalanceReport) {
        let mut entries: BTreeMap<String, NodeRebalanceEntry> = capacity
            .nodes
            .iter()
            .map(|n| {
                (
                    n.ip.clone(),
                    NodeRebalanceEntry::unchanged(&n.ip, n.state, &capacity.az, n.used),
                )
            })
            .collect();

        let mut moves = Vec::new();
        let mut total_switched = 0;

        match capacity.target() {
            None => {
                warn!(az = %capacity.az, "No healthy nodes in AZ, leaving agents in place");
            }
            Some(target) => {
                // Destination pool: (ip, remaining headroom)
                let mut pool: Vec<(String, i64)> = capacity
                    .nodes
                    .iter()
                    .filter(|n| n.is_destination())
                    .map(|n| (n.ip.clone(), n.available))
                    .collect();

                debug!(
                    az = %capacity.az,
                    agents = capacity.total_agents,
                    healthy = pool.len(),
                    target,
                    "Planning AZ"
                );

                for (source_ip, agents) in &capacity.assignments {
                    if agents.len() <= target {
                        continue;
                    }

                    for agent in &agents[target..] {
                        let Some(destination) = select_destination(&mut pool) else {
                            break;
                        };
                        let stays = destination.0 == *source_ip;

                        info!(
                            agent = %agent.name,
                            %role,
                            from = %source_ip,
                            to = %destination.0,
                            "Rebalance agent"
                        );

                        if stays && !self.config.reserve_on_stay {
                            continue;
                        }
                        destination.1 -= 1;
                        if stays {
                            continue;
                        }

                        let destination_ip = destination.0.clone();
                        if let Some(entry) = entries.get_mut(source_ip) {
                            entry.after = entry.after.saturating_sub(1);
                            entry.switched += 1;
                        }
                        if let Some(entry) = entries.get_mut(&destination_ip) {
                            entry.after += 1;
                            entry.switched += 1;
                        }
                        total_switched += 1;

                        moves.push(PlannedMove {
                            agent_id: agent.id,
                            agent_name: agent.name.clone(),
                            az: capacity.az.clone(),
                            from: source_ip.clone(),
                            to: destination_ip,
                        });
                    }
                }
            }
        }

        let report = RebalanceReport {
            total_switched,
            details: entries.into_values().collect(),
        };
        (moves, report)
    }
}

/// Healthy node with the most headroom; ties go to the lowest IP
fn select_destination(pool: &mut [(String, i64)]) -> Option<&mut (String, i64)> {
    pool.iter_mut()
        .min_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)))
}
