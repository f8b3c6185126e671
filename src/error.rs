//! Error types for Adpulse.

use thiserror::Error;

/// Errors returned by the ads-platform Graph API client.
#[derive(Debug, Error)]
pub enum GraphError {
    /// The request never produced a response (DNS, TLS, connection reset).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The platform answered with a non-success status and an error envelope.
    #[error("ads platform returned {status}: {message}")]
    Api { status: u16, message: String },

    /// The body could not be decoded into the expected shape.
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Errors produced while resolving a reporting window.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DateRangeError {
    #[error("invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("start date {since} is after end date {until}")]
    Inverted { since: String, until: String },

    #[error("unknown date preset '{0}'")]
    UnknownPreset(String),

    #[error("custom range needs both 'since' and 'until'")]
    Incomplete,
}

/// Errors around the credential lifecycle.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// No credentials have been submitted (or they were cleared by logout).
    #[error("no credentials configured")]
    Missing,

    /// Account id or token was blank.
    #[error("account id and access token are both required")]
    Blank,

    /// The live connectivity probe was rejected.
    #[error("failed to connect to the ads platform: {0}")]
    ProbeFailed(#[source] GraphError),

    #[error("credential storage failed: {0}")]
    Storage(#[from] anyhow::Error),
}

/// Result alias for Graph API calls.
pub type GraphResult<T> = std::result::Result<T, GraphError>;
