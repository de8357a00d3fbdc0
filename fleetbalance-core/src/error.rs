//! Error types for fleetbalance
//!
//! Errors shared by every crate in the workspace. The engine and the store
//! layer wrap these in their own enums.

use thiserror::Error;

/// Result type alias for fleetbalance core operations
pub type Result<T> = std::result::Result<T, FleetError>;

/// Unified error type for the fleet model
#[derive(Error, Debug)]
pub enum FleetError {
    // ===== Model Errors =====
    #[error("Invalid role: {0} (expected controller or analyzer)")]
    InvalidRole(String),

    #[error("Unknown agent: {0}")]
    UnknownAgent(u64),

    // ===== Serialization Errors =====
    #[error("Serialization error: {0}")]
    Serialization(String),

    // ===== I/O Errors =====
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for FleetError {
    fn from(err: serde_json::Error) -> Self {
        FleetError::Serialization(err.to_string())
    }
}
