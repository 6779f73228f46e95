use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Query failed against {endpoint}: {message}")]
    Query { endpoint: String, message: String },

    #[error("Query timed out after {elapsed:?}: {query}")]
    Timeout { query: String, elapsed: Duration },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to decode query response: {0}")]
    Decode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid pattern {pattern:?} for attribute {attribute}: {message}")]
    InvalidPattern {
        attribute: String,
        pattern: String,
        message: String,
    },

    #[error("Unsupported entity type: {0}")]
    UnsupportedEntityType(String),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Failure to derive an entity identity from one sample's labels.
///
/// Recoverable: the offending sample is skipped and collection continues.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    #[error("No identifier could be derived from labels for entity type {entity_type}")]
    MissingIdentifier { entity_type: String },

    #[error("Required label {label} for attribute {attribute} is missing")]
    MissingLabel { attribute: String, label: String },
}
