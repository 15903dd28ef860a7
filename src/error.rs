//! Error types for Synheart Daily

use thiserror::Error;

/// Errors that can occur during computation
///
/// Only the input-level variants abort a request. `UnparseableTimestamp`,
/// `MalformedPayload` and `InvalidInterval` are raised for a single reading and
/// are recorded as diagnostics by the parser instead of being propagated.
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Failed to parse input rows: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Unparseable timestamp: {0}")]
    UnparseableTimestamp(String),

    #[error("Unparseable calendar date: {0}")]
    UnparseableDate(String),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Invalid interval: start {start} is not before end {end}")]
    InvalidInterval { start: String, end: String },

    #[error("Invalid date range: {from} is after {to}")]
    InvalidRange { from: String, to: String },

    #[error("Row source failure: {0}")]
    SourceError(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors raised while loading or validating pipeline configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}
