//! Fleet data model
//!
//! Agents, the controller/analyzer nodes they are pinned to, and the
//! availability-zone topology those nodes serve.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::FleetError;

/// Which node assignment of an agent is being balanced
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Configuration-sync node
    #[default]
    Controller,
    /// Telemetry-ingestion node
    Analyzer,
}

impl Role {
    /// Both roles, in a fixed order
    pub const ALL: [Role; 2] = [Role::Controller, Role::Analyzer];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Controller => "controller",
            Self::Analyzer => "analyzer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = FleetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "controller" => Ok(Self::Controller),
            "analyzer" => Ok(Self::Analyzer),
            other => Err(FleetError::InvalidRole(other.to_string())),
        }
    }
}

/// Node health state
///
/// Only `Complete` nodes may receive agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    Complete,
    Maintenance,
    Exception,
    /// A state code this build does not know about
    Unknown,
}

impl NodeState {
    pub const CODE_COMPLETE: i32 = 2;
    pub const CODE_MAINTENANCE: i32 = 3;
    pub const CODE_EXCEPTION: i32 = 4;

    /// Map a persisted state code
    pub fn from_code(code: i32) -> Self {
        match code {
            Self::CODE_COMPLETE => Self::Complete,
            Self::CODE_MAINTENANCE => Self::Maintenance,
            Self::CODE_EXCEPTION => Self::Exception,
            _ => Self::Unknown,
        }
    }

    /// Can this node receive agents?
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Complete)
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Complete => write!(f, "complete"),
            Self::Maintenance => write!(f, "maintenance"),
            Self::Exception => write!(f, "exception"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// A monitoring agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub id: u64,
    pub name: String,
    /// AZ the agent lives in; never changed by rebalancing
    pub az: String,
    #[serde(default)]
    pub controller_ip: String,
    #[serde(default)]
    pub analyzer_ip: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl Agent {
    /// Address of the node this agent is pinned to for `role`
    pub fn node_ip(&self, role: Role) -> &str {
        match role {
            Role::Controller => &self.controller_ip,
            Role::Analyzer => &self.analyzer_ip,
        }
    }

    /// Re-pin the agent for `role`
    pub fn set_node_ip(&mut self, role: Role, ip: impl Into<String>) {
        match role {
            Role::Controller => self.controller_ip = ip.into(),
            Role::Analyzer => self.analyzer_ip = ip.into(),
        }
    }

    /// Is the agent assigned to any node for `role`?
    pub fn is_assigned(&self, role: Role) -> bool {
        !self.node_ip(role).is_empty()
    }
}

/// A controller or analyzer node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub ip: String,
    pub state: NodeState,
    /// Maximum number of agents this node accepts
    pub max_agents: u32,
}

impl Node {
    /// Counts toward the global "any usable node" check
    pub fn is_usable(&self) -> bool {
        self.state.is_healthy() && self.max_agents > 0
    }
}

/// An availability zone
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AvailabilityZone {
    pub id: String,
    pub region: String,
}

/// What a zone binding covers
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneScope {
    /// A single AZ
    Az(String),
    /// Every AZ of a region
    Region(String),
}

/// Binds a node to one AZ or to a whole region
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ZoneBinding {
    pub node_ip: String,
    pub scope: ZoneScope,
}

impl ZoneBinding {
    pub fn az(node_ip: impl Into<String>, az: impl Into<String>) -> Self {
        Self {
            node_ip: node_ip.into(),
            scope: ZoneScope::Az(az.into()),
        }
    }

    pub fn region(node_ip: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            node_ip: node_ip.into(),
            scope: ZoneScope::Region(region.into()),
        }
    }
}
