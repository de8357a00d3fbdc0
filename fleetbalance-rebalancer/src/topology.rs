//! Topology resolver
//!
//! Builds the AZ -> serving nodes map for one role. Region-wide bindings are
//! expanded against the AZ list of the current snapshot, so a region binding
//! always covers exactly the AZs that exist at invocation time.

use fleetbalance_core::{AvailabilityZone, Node, ZoneBinding, ZoneScope};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Resolved AZ topology for one role
#[derive(Debug, Clone, Default)]
pub struct Topology {
    /// AZ id -> nodes serving it, keyed by node IP
    az_nodes: BTreeMap<String, BTreeMap<String, Node>>,
}

impl Topology {
    /// Resolve bindings against the known AZs and nodes
    ///
    /// Bindings to a node that is not in `nodes` are dropped. A node bound to
    /// the same AZ more than once appears once.
    pub fn resolve(azs: &[AvailabilityZone], nodes: &[Node], bindings: &[ZoneBinding]) -> Self {
        let ip_to_node: HashMap<&str, &Node> = nodes.iter().map(|n| (n.ip.as_str(), n)).collect();

        let mut region_to_azs: HashMap<&str, Vec<&str>> = HashMap::new();
        for az in azs {
            region_to_azs
                .entry(az.region.as_str())
                .or_default()
                .push(az.id.as_str());
        }

        let mut topology = Self::default();

        for binding in bindings {
            let Some(node) = ip_to_node.get(binding.node_ip.as_str()) else {
                debug!(node = %binding.node_ip, "Binding references unknown node, skipping");
                continue;
            };

            match &binding.scope {
                ZoneScope::Region(region) => {
                    if let Some(az_ids) = region_to_azs.get(region.as_str()) {
                        for az_id in az_ids {
                            topology.insert(az_id, node);
                        }
                    }
                }
                ZoneScope::Az(az_id) => topology.insert(az_id, node),
            }
        }

        topology
    }

    fn insert(&mut self, az: &str, node: &Node) {
        self.az_nodes
            .entry(az.to_string())
            .or_default()
            .insert(node.ip.clone(), node.clone());
    }

    /// Nodes serving an AZ, ordered by IP; `None` if nothing serves it
    pub fn nodes_for(&self, az: &str) -> Option<Vec<&Node>> {
        self.az_nodes
            .get(az)
            .filter(|nodes| !nodes.is_empty())
            .map(|nodes| nodes.values().collect())
    }
}
