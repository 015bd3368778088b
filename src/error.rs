// src/error.rs

use thiserror::Error;

/// Errors raised by the fetch, decode, and I/O layers.
///
/// Orchestration code wraps these in `anyhow::Error` with block/fetcher context;
/// the retry executor and orchestrator treat every variant as retryable.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP error from {endpoint}: {status}")]
    Status {
        endpoint: String,
        status: reqwest::StatusCode,
    },

    #[error("GraphQL errors from {endpoint}: {messages}")]
    GraphQl { endpoint: String, messages: String },

    #[error("Response from {endpoint} has no `{collection}` collection")]
    MissingCollection { endpoint: String, collection: String },

    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid integer amount: {0:?}")]
    InvalidAmount(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = SnapshotError> = std::result::Result<T, E>;
