//! Fleetbalance Metadata Library
//!
//! The fleet store the rebalancer reads snapshots from and writes agent
//! re-assignments to. Two implementations:
//! - `PostgresFleetStore`: the controller database
//! - `MemoryFleetStore`: tests and JSON snapshot files

pub mod memory;
pub mod postgres;
pub mod store;

pub use memory::{FleetData, MemoryFleetStore};
pub use postgres::{DbConfig, PostgresFleetStore};
pub use store::{FleetSnapshot, FleetStore, StoreError};
