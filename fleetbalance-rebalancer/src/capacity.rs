//! Capacity accountant
//!
//! Per-AZ load accounting: how many agents each resolved node carries and how
//! much headroom it has left.

use fleetbalance_core::{Agent, Node, NodeState, Role};
use std::collections::BTreeMap;

/// Load of one node within one AZ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeCapacity {
    pub ip: String,
    pub state: NodeState,
    pub max_agents: u32,
    /// Agents of this AZ currently assigned to the node
    pub used: u32,
    /// `max_agents - used`; negative when the node is over capacity
    pub available: i64,
}

impl NodeCapacity {
    /// Can this node receive agents?
    pub fn is_destination(&self) -> bool {
        self.state.is_healthy()
    }
}

/// Load accounting for one AZ
#[derive(Debug, Clone)]
pub struct AzCapacity {
    pub az: String,
    /// Every agent of the AZ, including ones on nodes outside the AZ's pool
    pub total_agents: usize,
    /// Resolved nodes, ordered by IP
    pub nodes: Vec<NodeCapacity>,
    /// Agents on resolved nodes, grouped by node IP, each group ordered by agent id
    pub assignments: BTreeMap<String, Vec<Agent>>,
}

impl AzCapacity {
    /// Account the AZ's agents against the nodes serving it
    ///
    /// Agents pinned to a node outside `nodes` are counted in `total_agents`
    /// but belong to no node and are never reassignment candidates.
    pub fn account(az: &str, role: Role, agents: &[&Agent], nodes: &[&Node]) -> Self {
        let mut assignments: BTreeMap<String, Vec<Agent>> = BTreeMap::new();
        for agent in agents {
            let ip = agent.node_ip(role);
            if nodes.iter().any(|n| n.ip == ip) {
                assignments
                    .entry(ip.to_string())
                    .or_default()
                    .push((*agent).clone());
            }
        }
        for group in assignments.values_mut() {
            group.sort_by_key(|a| a.id);
        }

        let mut capacities: Vec<NodeCapacity> = nodes
            .iter()
            .map(|node| {
                let used = saturating_count(assignments.get(&node.ip).map_or(0, Vec::len));
                NodeCapacity {
                    ip: node.ip.clone(),
                    state: node.state,
                    max_agents: node.max_agents,
                    used,
                    available: i64::from(node.max_agents) - i64::from(used),
                }
            })
            .collect();
        capacities.sort_by(|a, b| a.ip.cmp(&b.ip));
        capacities.dedup_by(|a, b| a.ip == b.ip);

        Self {
            az: az.to_string(),
            total_agents: agents.len(),
            nodes: capacities,
            assignments,
        }
    }

    /// Healthy nodes in this AZ
    pub fn healthy_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_destination()).count()
    }

    /// Per-node load target, `ceil(total_agents / healthy_nodes)`
    ///
    /// `None` when the AZ has no healthy node.
    pub fn target(&self) -> Option<usize> {
        let healthy = self.healthy_count();
        if healthy == 0 {
            None
        } else {
            Some(self.total_agents.div_ceil(healthy))
        }
    }

    /// Capacity entry for a node
    pub fn node(&self, ip: &str) -> Option<&NodeCapacity> {
        self.nodes.iter().find(|n| n.ip == ip)
    }
}

/// Agent count as reported, clamped to `u32::MAX`
fn saturating_count(count: usize) -> u32 {
    u32::try_from(count).unwrap_or(u32::MAX)
}

/// Nodes that count toward the global "any usable node" check
pub fn usable_node_count(nodes: &[Node]) -> usize {
    nodes.iter().filter(|n| n.is_usable()).count()
}
