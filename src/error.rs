use std::path::PathBuf;

use thiserror::Error;

/// Raised by a single filter when it cannot complete. The manager turns it into
/// a `false` for that filter and moves on to the next one.
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("parameter '{name}' must be {expected}")]
    MalformedParameter {
        name: &'static str,
        expected: &'static str,
    },

    #[error("parameter '{name}' is not a valid timestamp: {value}")]
    InvalidTimestamp { name: &'static str, value: String },
}

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("feature document not found: {}", .0.display())]
    DocumentNotFound(PathBuf),

    #[error("failed to read feature document {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse feature document: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid feature definition: {0}")]
    InvalidDefinition(String),

    #[error("feature '{0}' is defined more than once")]
    DuplicateFeature(String),

    #[error("invalid remote config endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("failed to build remote config client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Per-key failure of the remote config source. Logged and skipped, never
/// surfaced from a refresh.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("timed out fetching key '{0}'")]
    Timeout(String),

    #[error("key '{key}' returned status {status}")]
    Status { key: String, status: u16 },

    #[error("key '{0}' has no value")]
    MissingValue(String),

    #[error("invalid response envelope: {0}")]
    Envelope(#[from] serde_json::Error),

    #[error("invalid feature entry: {0}")]
    Definition(#[from] serde_yaml::Error),

    #[error("invalid feature entry: {0}")]
    InvalidDefinition(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} missing, it is required")]
    Missing(&'static str),

    #[error("{var} has an invalid value: {value}")]
    Invalid { var: &'static str, value: String },
}
