//! Fleetbalance Core Library
//!
//! Core types for the fleetbalance agent rebalancing engine.
//! This crate provides:
//! - The fleet data model (agents, controller/analyzer nodes, AZ topology)
//! - The rebalance report returned to API callers
//! - Common error handling

pub mod error;
pub mod model;
pub mod report;

pub use error::{FleetError, Result};
pub use model::{Agent, AvailabilityZone, Node, NodeState, Role, ZoneBinding, ZoneScope};
pub use report::{NodeRebalanceEntry, RebalanceReport};

/// Zone-binding AZ value meaning "every AZ in the binding's region"
pub const WILDCARD_AZ: &str = "ALL";
