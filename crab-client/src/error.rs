//! Client error types

use thiserror::Error;

/// Client error type
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed (connect, timeout, body read)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid base URL or path
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Store rejected the request because its state differs (409 / 422)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Authentication required
    #[error("Authentication required")]
    Unauthorized,

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Any other non-success status
    #[error("Server error ({status}): {body}")]
    Server { status: u16, body: String },

    /// Invalid response format
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ClientError {
    /// Network / server side failure (as opposed to a business rejection)
    pub fn is_transport(&self) -> bool {
        !matches!(self, ClientError::Conflict(_))
    }
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;
