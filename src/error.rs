// src/error.rs
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Failure of one web provider attempt. Never leaves the orchestrator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("provider timed out after {0:?}")]
    Timeout(Duration),

    #[error("network error: {0}")]
    Network(String),

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Coarse failure classes reported through diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    ProviderTimeout,
    ProviderNetworkFailure,
    ProviderMalformedResponse,
    StoreUnavailable,
}

impl ProviderError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ProviderError::Timeout(_) => FailureKind::ProviderTimeout,
            ProviderError::Network(_) | ProviderError::Status(_) => FailureKind::ProviderNetworkFailure,
            ProviderError::Malformed(_) => FailureKind::ProviderMalformedResponse,
        }
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        ProviderError::Malformed(err.to_string())
    }
}

/// Active-learning store failures. Reads degrade to "no record" and writes
/// are dropped; callers only see these through diagnostics.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot encoding error: {0}")]
    Encode(#[from] bincode::Error),

    #[error("journal encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("rejected record: {0}")]
    Invalid(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Failures surfaced to the caller. `rank` only ever returns `InvalidAcronym`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("not a rankable acronym: {0:?}")]
    InvalidAcronym(String),

    #[error("engine setup failed: {0}")]
    Setup(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),
}
