use shared::models::OrderStatus;
use thiserror::Error;

/// Dispatcher errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
    /// Target not reachable from the order's confirmed status (no network call made)
    #[error("Invalid transition for order {id}: {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: OrderStatus,
        to: OrderStatus,
    },

    /// A transition for this order is already in flight
    #[error("Order busy: {0}")]
    Busy(String),

    /// Order is not on the board
    #[error("Order not found: {0}")]
    NotFound(String),

    /// Store rejected the transition; the board now shows the refetched state
    #[error("Conflict on order {id}: {message}")]
    Conflict { id: String, message: String },

    /// 网络/服务端故障，已回滚，可由用户重试
    #[error("Transport failure on order {id}: {message}")]
    Transport { id: String, message: String },
}

impl DispatchError {
    /// Whether the same request may succeed if the user retries it
    pub fn is_retryable(&self) -> bool {
        matches!(self, DispatchError::Transport { .. })
    }

    pub fn order_id(&self) -> &str {
        match self {
            DispatchError::InvalidTransition { id, .. }
            | DispatchError::Conflict { id, .. }
            | DispatchError::Transport { id, .. } => id,
            DispatchError::Busy(id) | DispatchError::NotFound(id) => id,
        }
    }
}

pub type DispatchResult<T> = Result<T, DispatchError>;
