//! Error types for the Marzelle gateway

use std::time::Duration;

use thiserror::Error;

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the gateway
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Completion provider request failed or its stream faulted
    #[error("completion failed: {0}")]
    CompletionFailure(String),

    /// Completion did not finish within the configured bound
    #[error("completion timed out after {}s", .0.as_secs())]
    CompletionTimeout(Duration),

    /// A required input was absent or blank
    #[error("missing input: {0}")]
    MissingInput(&'static str),

    /// A dependent service was unreachable or answered with a non-success status
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Whether this error came from the completion path and should be
    /// answered with the fallback reply
    #[must_use]
    pub const fn is_completion_error(&self) -> bool {
        matches!(self, Self::CompletionFailure(_) | Self::CompletionTimeout(_))
    }
}
