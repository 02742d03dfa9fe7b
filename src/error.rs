use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by collaborators and configuration loading.
///
/// None of these are fatal to the serving loop: the serving state machine logs them and
/// retries on the next interval.
#[derive(Debug, Error)]
pub enum AdsError {
    /// A database collaborator failed to answer a query.
    #[error("database error: {0}")]
    Database(String),

    /// A built ad is missing a required field.
    #[error("invalid ad: {0}")]
    InvalidAd(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors returned while loading or validating [`crate::AdsConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// An override environment variable holds a value that cannot be parsed.
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Why a serving attempt did not show an ad. Every variant leads to a retry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureReason {
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("no eligible ads")]
    NoEligibleAds,

    #[error("invalid ad: {0}")]
    InvalidAd(String),

    /// A collaborator such as the database failed.
    #[error("collaborator failure: {0}")]
    Collaborator(String),
}

/// Result of one call to `maybe_serve_ad`.
#[derive(Debug, Clone, PartialEq)]
pub enum ServeAdOutcome {
    Served(crate::model::Ad),
    /// Another attempt was in flight; nothing happened.
    AlreadyServing,
    Failed(FailureReason),
}
