//! Error types for the workspace graph engine.
//!
//! Only genuinely failed operations surface here. Degradation paths such as a
//! placement budget overrun or a preview settle timeout are reported through
//! stats and status values instead.

use thiserror::Error;

/// Top-level error type for the graph engine.
#[derive(Debug, Error)]
pub enum GraphError {
    /// An externally supplied payload (e.g. a drag-drop entity blob) could not
    /// be parsed. The operation is aborted and no state is mutated.
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// An operation referenced an entity the graph does not contain.
    #[error("Unknown entity: {0}")]
    UnknownEntity(String),

    /// A configuration value is out of its valid range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A collaborator (workspace service) call failed.
    #[error("Service error: {0}")]
    Service(String),

    /// Conversion to or from a host value failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for GraphError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedPayload(err.to_string())
    }
}

impl From<serde_wasm_bindgen::Error> for GraphError {
    fn from(err: serde_wasm_bindgen::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, GraphError>;
