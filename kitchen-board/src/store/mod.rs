//! 订单库访问
//!
//! 看板只需要三个操作：拉整板、提交状态、完成上菜。这里不做重试，
//! 重试策略在 [`CommandDispatcher`](crate::dispatch::CommandDispatcher) 和轮询层。

mod mock;

pub use mock::MockStore;

use async_trait::async_trait;
use crab_client::{ClientError, HttpClient};
use shared::models::{KitchenOrder, OrderStatus};
use thiserror::Error;

/// Store seam errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Network failure, timeout or a non-business server status
    #[error("Store unreachable: {0}")]
    Transport(String),

    /// The store's authoritative state disallows the request
    #[error("Store conflict: {0}")]
    Conflict(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<ClientError> for StoreError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Conflict(msg) => StoreError::Conflict(msg),
            other => StoreError::Transport(other.to_string()),
        }
    }
}

/// Submit/complete errors: an order the store no longer knows is a conflict
/// (the board refetches), not a transport failure
fn submit_error(err: ClientError) -> StoreError {
    match err {
        ClientError::NotFound(msg) => StoreError::Conflict(format!("Order not found: {}", msg)),
        other => other.into(),
    }
}

/// Order store contract
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// All currently active orders
    async fn fetch_snapshot(&self) -> StoreResult<Vec<KitchenOrder>>;

    /// Submit a status transition, returning the confirmed record
    async fn submit_status(&self, order_id: &str, status: OrderStatus) -> StoreResult<KitchenOrder>;

    /// `ready → served` completion path
    async fn complete(&self, order_id: &str) -> StoreResult<KitchenOrder>;
}

#[async_trait]
impl OrderStore for HttpClient {
    async fn fetch_snapshot(&self) -> StoreResult<Vec<KitchenOrder>> {
        Ok(self.fetch_board().await?)
    }

    async fn submit_status(&self, order_id: &str, status: OrderStatus) -> StoreResult<KitchenOrder> {
        self.update_status(order_id, status).await.map_err(submit_error)
    }

    async fn complete(&self, order_id: &str) -> StoreResult<KitchenOrder> {
        HttpClient::complete(self, order_id).await.map_err(submit_error)
    }
}
