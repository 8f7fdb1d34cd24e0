//! Control API error types.

use buildfarm_retry::Retryable;
use thiserror::Error;

/// Errors returned by the slave control API client.
#[derive(Debug, Error)]
pub enum SlaveApiError {
    /// The configured server URL cannot be used as a base for API paths.
    #[error("invalid control API url: {0}")]
    Url(String),

    /// Failed to send the request or read the response.
    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body did not match the expected shape.
    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl Retryable for SlaveApiError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(e) => !e.is_builder(),
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::Url(_) | Self::Decode(_) => false,
        }
    }
}
