//! Error types for the Brain client.

use thiserror::Error;

/// Result type for Brain client operations.
pub type Result<T> = std::result::Result<T, BrainError>;

/// Brain client errors.
#[derive(Debug, Error)]
pub enum BrainError {
    /// Configuration error (missing base URL, bad environment)
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport error (connection failed, timeout)
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-2xx response from the Brain API
    #[error("Brain API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// Response body did not match the expected shape
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    /// Streaming response carried malformed data
    #[error("stream error: {0}")]
    Stream(String),
}
