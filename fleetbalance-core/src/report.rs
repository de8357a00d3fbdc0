//! Rebalance result report
//!
//! This is what the API layer hands back to the caller, for both check and
//! commit runs.

use serde::{Deserialize, Serialize};

use crate::model::NodeState;

/// Per-node line of a rebalance report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRebalanceEntry {
    pub ip: String,
    pub state: NodeState,
    pub az: String,
    /// Agents assigned before the run
    pub before: u32,
    /// Agents assigned after the run
    pub after: u32,
    /// Agents moved off or onto this node
    pub switched: u32,
    pub before_weight: f64,
    pub after_weight: f64,
}

impl NodeRebalanceEntry {
    /// Entry for a node whose load is not changed (yet)
    pub fn unchanged(ip: impl Into<String>, state: NodeState, az: impl Into<String>, used: u32) -> Self {
        Self {
            ip: ip.into(),
            state,
            az: az.into(),
            before: used,
            after: used,
            switched: 0,
            before_weight: 1.0,
            after_weight: 1.0,
        }
    }
}

/// Rebalance report
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RebalanceReport {
    pub total_switched: u32,
    pub details: Vec<NodeRebalanceEntry>,
}

impl RebalanceReport {
    /// Fold another report (e.g. one AZ) into this one
    pub fn merge(&mut self, other: RebalanceReport) {
        self.total_switched += other.total_switched;
        self.details.extend(other.details);
    }

    /// Order entries by AZ, then node IP
    pub fn sort(&mut self) {
        self.details
            .sort_by(|a, b| a.az.cmp(&b.az).then_with(|| a.ip.cmp(&b.ip)));
    }

    /// Entries belonging to one AZ
    pub fn entries_for_az<'a>(&'a self, az: &'a str) -> impl Iterator<Item = &'a NodeRebalanceEntry> + 'a {
        self.details.iter().filter(move |e| e.az == az)
    }

    /// Entry for a node within an AZ
    pub fn entry(&self, az: &str, ip: &str) -> Option<&NodeRebalanceEntry> {
        self.details.iter().find(|e| e.az == az && e.ip == ip)
    }

    /// Set every weight to `weight` (count-based strategies)
    pub fn with_uniform_weights(mut self, weight: f64) -> Self {
        for entry in &mut self.details {
            entry.before_weight = weight;
            entry.after_weight = weight;
        }
        self
    }

    /// Summary of the report
    pub fn summary(&self) -> String {
        let azs: std::collections::BTreeSet<_> = self.details.iter().map(|e| e.az.as_str()).collect();
        format!(
            "{} agents switched across {} nodes in {} AZs",
            self.total_switched,
            self.details.len(),
            azs.len()
        )
    }
}
