// src/core/errors.rs

//! Defines the primary error type for the entire application.

use thiserror::Error;

/// The main error enum, representing all possible failures within the
/// collector. Using `thiserror` allows for clean error definitions and
/// automatic `From` trait implementations.
///
/// Per-item failures (a node download, a group metakey read, a malformed DB
/// record) are degraded into entity state and never abort a round; these
/// variants exist so the degradation can be logged and recorded uniformly.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FleetmonError {
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("Transport failure: {0}")]
    TransportFailure(String),

    #[error("Parse failure: {0}")]
    ParseFailure(String),

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("External database unavailable: {0}")]
    ExternalDbUnavailable(String),

    #[error("Inventory failure: {0}")]
    InventoryFailure(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for FleetmonError {
    fn from(e: std::io::Error) -> Self {
        FleetmonError::TransportFailure(e.to_string())
    }
}

impl From<reqwest::Error> for FleetmonError {
    fn from(e: reqwest::Error) -> Self {
        FleetmonError::TransportFailure(e.to_string())
    }
}

impl From<serde_json::Error> for FleetmonError {
    fn from(e: serde_json::Error) -> Self {
        FleetmonError::ParseFailure(e.to_string())
    }
}

impl From<rmpv::decode::Error> for FleetmonError {
    fn from(e: rmpv::decode::Error) -> Self {
        FleetmonError::ParseFailure(e.to_string())
    }
}
