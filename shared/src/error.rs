//! Model-level errors

use thiserror::Error;

/// Errors raised while checking a record received from the outside world
#[derive(Debug, Error)]
pub enum ModelError {
    /// Record failed field validation
    #[error("Invalid order {id}: {reason}")]
    InvalidOrder { id: String, reason: String },

    /// Unknown status literal (query string / config)
    #[error("Unknown order status: {0}")]
    UnknownStatus(String),
}

pub type ModelResult<T> = Result<T, ModelError>;
