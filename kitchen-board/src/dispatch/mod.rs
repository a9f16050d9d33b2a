//! 员工状态推进
//!
//! 流程：
//!
//! ```text
//! request_transition(id, target)
//!   ├─ 校验 + pin + 乐观写入 (持锁，立即释放)
//!   ├─ 提交到订单库 (不持锁)
//!   └─ 结果
//!       ├─ Ok        → 采用确认记录，解除 pin (served 则移出看板)
//!       ├─ Conflict  → 重新拉取，强制替换，返回 Conflict
//!       └─ Transport → 回滚，返回可重试错误
//! ```
//!
//! 每个订单同一时间最多一个在途请求，其余返回 `Busy`。

mod error;

pub use error::{DispatchError, DispatchResult};

use std::fmt;
use std::sync::Arc;

use shared::models::{KitchenOrder, OrderStatus};

use crate::audit_log;
use crate::board::{SharedBoard, Snapshot};
use crate::store::{OrderStore, StoreError};

/// Staff-facing actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaffAction {
    /// pending → preparing
    Start,
    /// pending | preparing → ready
    Complete,
    /// ready → served
    Serve,
}

impl StaffAction {
    pub fn target(self) -> OrderStatus {
        match self {
            StaffAction::Start => OrderStatus::Preparing,
            StaffAction::Complete => OrderStatus::Ready,
            StaffAction::Serve => OrderStatus::Served,
        }
    }

    /// The action that advances an order one step from `status`
    pub fn next_for(status: OrderStatus) -> Option<Self> {
        match status {
            OrderStatus::Pending => Some(StaffAction::Start),
            OrderStatus::Preparing => Some(StaffAction::Complete),
            OrderStatus::Ready => Some(StaffAction::Serve),
            OrderStatus::Served => None,
        }
    }
}

impl fmt::Display for StaffAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StaffAction::Start => write!(f, "start"),
            StaffAction::Complete => write!(f, "complete"),
            StaffAction::Serve => write!(f, "serve"),
        }
    }
}

/// Confirmed outcome of a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Store confirmed; the board now holds this record
    Confirmed(KitchenOrder),
    /// Order served and removed from the board
    Completed { id: String },
}

/// 在途请求的 pin：未确认就被丢弃 (调用方取消) 时自动回滚
struct InFlight<'a> {
    board: &'a SharedBoard,
    id: &'a str,
    armed: bool,
}

impl InFlight<'_> {
    fn resolve(mut self) {
        self.armed = false;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.armed
            && let Some(target) = self.board.write(|b| b.revert_transition(self.id))
        {
            tracing::debug!(order_id = %self.id, to = %target, "Transition abandoned, reverted");
        }
    }
}

/// Validates and submits staff transitions against the shared board
#[derive(Clone)]
pub struct CommandDispatcher {
    board: SharedBoard,
    store: Arc<dyn OrderStore>,
    /// 审计日志里的设备名
    device: String,
}

impl CommandDispatcher {
    pub fn new(board: SharedBoard, store: Arc<dyn OrderStore>) -> Self {
        Self {
            board,
            store,
            device: "kitchen-board".to_string(),
        }
    }

    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = device.into();
        self
    }

    pub fn board(&self) -> &SharedBoard {
        &self.board
    }

    pub async fn request_action(&self, id: &str, action: StaffAction) -> DispatchResult<Transition> {
        self.request_transition(id, action.target()).await
    }

    /// Move the order one step along its lifecycle
    pub async fn advance(&self, id: &str) -> DispatchResult<Transition> {
        let status = self
            .board
            .read(|b| {
                b.get(id)
                    .map(|o| o.status)
                    .or_else(|| b.is_retired(id).then_some(OrderStatus::Served))
            })
            .ok_or_else(|| DispatchError::NotFound(id.to_string()))?;
        let action = StaffAction::next_for(status).ok_or_else(|| DispatchError::InvalidTransition {
            id: id.to_string(),
            from: status,
            to: status,
        })?;
        self.request_action(id, action).await
    }

    pub async fn request_transition(&self, id: &str, target: OrderStatus) -> DispatchResult<Transition> {
        let from = self.board.write(|b| b.begin_transition(id, target))?;
        let guard = InFlight {
            board: &self.board,
            id,
            armed: true,
        };
        tracing::debug!(order_id = %id, from = %from, to = %target, "Transition applied optimistically");

        // served 只能由 ready 到达，走 complete 接口
        let result = if target == OrderStatus::Served {
            self.store.complete(id).await
        } else {
            self.store.submit_status(id, target).await
        };

        match result {
            Ok(confirmed) => {
                let transition = self.adopt(id, from, target, confirmed);
                guard.resolve();
                Ok(transition)
            }
            Err(StoreError::Conflict(message)) => {
                // 拉取期间被取消时仍由 guard 回滚
                self.recover_conflict(guard, from, target).await;
                Err(DispatchError::Conflict {
                    id: id.to_string(),
                    message,
                })
            }
            Err(StoreError::Transport(message)) => {
                self.board.write(|b| b.revert_transition(id));
                guard.resolve();
                tracing::warn!(order_id = %id, from = %from, to = %target, error = %message, "Transition failed, reverted");
                Err(DispatchError::Transport {
                    id: id.to_string(),
                    message,
                })
            }
        }
    }

    fn adopt(&self, id: &str, from: OrderStatus, target: OrderStatus, confirmed: KitchenOrder) -> Transition {
        let status = confirmed.status;
        let terminal = status.is_terminal();
        self.board.write(|b| b.confirm_transition(id, confirmed.clone()));

        let resource = format!("order:{}", id);
        let details = format!("{} -> {}", from, status);
        audit_log!(self.device.as_str(), "transition", resource.as_str(), details.as_str());

        if terminal {
            tracing::info!(order_id = %id, from = %from, to = %target, "Order served, removed from board");
            Transition::Completed { id: id.to_string() }
        } else {
            tracing::info!(order_id = %id, from = %from, to = %status, "Transition confirmed");
            Transition::Confirmed(confirmed)
        }
    }

    /// 冲突：以订单库为准，拉取失败则至少回到操作前的状态
    async fn recover_conflict(&self, guard: InFlight<'_>, from: OrderStatus, target: OrderStatus) {
        let id = guard.id;
        let basis = self.board.revision();
        match self.store.fetch_snapshot().await {
            Ok(orders) => {
                let fresh = orders.iter().find(|o| o.id == id).cloned();
                let status = fresh.as_ref().map(|o| o.status);
                self.board.write(|b| {
                    b.force_replace(id, fresh);
                    b.merge(Snapshot::refetch(orders).with_basis(basis))
                });
                guard.resolve();
                tracing::info!(order_id = %id, from = %from, to = %target, store_status = ?status, "Conflict resolved from refetch");
            }
            Err(e) => {
                self.board.write(|b| b.revert_transition(id));
                guard.resolve();
                tracing::warn!(order_id = %id, from = %from, to = %target, error = %e, "Conflict refetch failed, reverted");
            }
        }
    }
}

impl fmt::Debug for CommandDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandDispatcher")
            .field("board", &self.board)
            .field("device", &self.device)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MockStore;
    use chrono::{Duration, Utc};
    use shared::models::{Destination, OrderItem};

    fn order(id: &str, status: OrderStatus) -> KitchenOrder {
        KitchenOrder::new(id, 11, Destination::Table("T9".into()), Utc::now() - Duration::minutes(2))
            .with_item(OrderItem::new(1, "Burger").with_station("grill"))
            .with_status(status)
    }

    fn setup(store: MockStore) -> (Arc<MockStore>, CommandDispatcher) {
        let store = Arc::new(store);
        let board = SharedBoard::new();
        board.write(|b| b.merge(Snapshot::poll(store.orders())));
        let dispatcher = CommandDispatcher::new(board, store.clone());
        (store, dispatcher)
    }

    #[tokio::test]
    async fn test_invalid_transition_rejected_without_store_call() {
        let (store, dispatcher) = setup(MockStore::new(vec![order("A1", OrderStatus::Ready)]));
        let before = dispatcher.board().orders();
        let revision = dispatcher.board().revision();

        let err = dispatcher.request_transition("A1", OrderStatus::Preparing).await.unwrap_err();
        assert!(matches!(
            err,
            DispatchError::InvalidTransition { from: OrderStatus::Ready, to: OrderStatus::Preparing, .. }
        ));
        assert!(!err.is_retryable());
        assert_eq!(dispatcher.board().orders(), before);
        assert_eq!(dispatcher.board().revision(), revision);
        assert_eq!(store.submit_count(), 0);
    }

    #[tokio::test]
    async fn test_served_order_rejects_further_transitions() {
        let (store, dispatcher) = setup(MockStore::new(vec![order("A1", OrderStatus::Ready)]));
        dispatcher.request_action("A1", StaffAction::Serve).await.unwrap();
        let revision = dispatcher.board().revision();

        let err = dispatcher.request_transition("A1", OrderStatus::Preparing).await.unwrap_err();
        assert!(matches!(
            err,
            DispatchError::InvalidTransition { from: OrderStatus::Served, to: OrderStatus::Preparing, .. }
        ));
        assert!(dispatcher.board().get("A1").is_none());
        assert_eq!(dispatcher.board().revision(), revision);
        assert_eq!(store.submit_count(), 1);
    }

    #[tokio::test]
    async fn test_confirmed_transition_adopts_store_record() {
        let (store, dispatcher) = setup(MockStore::new(vec![order("A1", OrderStatus::Pending)]));

        let outcome = dispatcher.request_action("A1", StaffAction::Start).await.unwrap();
        let Transition::Confirmed(confirmed) = outcome else {
            panic!("expected a confirmed record");
        };
        assert_eq!(confirmed.status, OrderStatus::Preparing);
        assert_eq!(dispatcher.board().get("A1"), Some(confirmed));
        assert_eq!(dispatcher.board().get("A1"), store.get("A1"));
        assert!(!dispatcher.board().is_pinned("A1"));
    }

    #[tokio::test]
    async fn test_pending_can_complete_directly() {
        let (_store, dispatcher) = setup(MockStore::new(vec![order("A1", OrderStatus::Pending)]));
        let outcome = dispatcher.request_action("A1", StaffAction::Complete).await.unwrap();
        assert!(matches!(outcome, Transition::Confirmed(ref o) if o.status == OrderStatus::Ready));
    }

    #[tokio::test]
    async fn test_conflict_replaces_with_fresh_fetch() {
        let (store, dispatcher) = setup(MockStore::new(vec![order("A1", OrderStatus::Pending)]));
        // 另一台设备已经把 A1 做完
        store.set_status("A1", OrderStatus::Ready);

        let err = dispatcher.request_transition("A1", OrderStatus::Preparing).await.unwrap_err();
        assert!(matches!(err, DispatchError::Conflict { ref id, .. } if id == "A1"));
        assert!(!err.is_retryable());

        let fresh = store.fetch_snapshot().await.unwrap();
        assert_eq!(dispatcher.board().get("A1").as_ref(), fresh.iter().find(|o| o.id == "A1"));
        assert_eq!(dispatcher.board().get("A1").unwrap().status, OrderStatus::Ready);
        assert!(!dispatcher.board().is_pinned("A1"));
    }

    #[tokio::test]
    async fn test_conflict_for_order_gone_from_store_removes_it() {
        let (store, dispatcher) = setup(MockStore::new(vec![order("A1", OrderStatus::Ready)]));
        store.remove("A1");

        let err = dispatcher.request_action("A1", StaffAction::Serve).await.unwrap_err();
        assert!(matches!(err, DispatchError::Conflict { .. }));
        assert!(dispatcher.board().get("A1").is_none());
    }

    #[tokio::test]
    async fn test_conflict_with_failed_refetch_reverts() {
        let (store, dispatcher) = setup(MockStore::new(vec![order("A1", OrderStatus::Pending)]));
        store.fail_next_submit(StoreError::Conflict("stale".into()));
        store.fail_fetches(1);

        let err = dispatcher.request_action("A1", StaffAction::Start).await.unwrap_err();
        assert!(matches!(err, DispatchError::Conflict { .. }));
        assert_eq!(dispatcher.board().get("A1").unwrap().status, OrderStatus::Pending);
        assert!(!dispatcher.board().is_pinned("A1"));
    }

    #[tokio::test]
    async fn test_transport_failure_reverts_and_is_retryable() {
        let (store, dispatcher) = setup(MockStore::new(vec![order("A1", OrderStatus::Pending)]));
        let before = dispatcher.board().get("A1");
        store.fail_next_submit(StoreError::Transport("timeout".into()));

        let err = dispatcher.request_action("A1", StaffAction::Start).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(err.order_id(), "A1");
        assert_eq!(dispatcher.board().get("A1"), before);
        assert!(!dispatcher.board().is_pinned("A1"));

        // 用户重试
        assert!(dispatcher.request_action("A1", StaffAction::Start).await.is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_request_is_busy() {
        let (store, dispatcher) = setup(MockStore::gated(vec![order("A1", OrderStatus::Pending)]));

        let first = tokio::spawn({
            let dispatcher = dispatcher.clone();
            async move { dispatcher.request_action("A1", StaffAction::Start).await }
        });
        store.wait_for_submits(1).await;

        assert_eq!(dispatcher.board().get("A1").unwrap().status, OrderStatus::Preparing);
        assert!(dispatcher.board().is_pinned("A1"));
        let err = dispatcher.request_action("A1", StaffAction::Complete).await.unwrap_err();
        assert_eq!(err, DispatchError::Busy("A1".into()));

        store.release_submit();
        assert!(first.await.unwrap().is_ok());
        assert!(!dispatcher.board().is_pinned("A1"));
        assert_eq!(store.submit_count(), 1);
    }

    #[tokio::test]
    async fn test_abandoned_request_reverts() {
        let (store, dispatcher) = setup(MockStore::gated(vec![order("A1", OrderStatus::Pending)]));

        let request = tokio::spawn({
            let dispatcher = dispatcher.clone();
            async move { dispatcher.request_action("A1", StaffAction::Start).await }
        });
        store.wait_for_submits(1).await;
        request.abort();
        let _ = request.await;

        assert_eq!(dispatcher.board().get("A1").unwrap().status, OrderStatus::Pending);
        assert!(!dispatcher.board().is_pinned("A1"));
    }

    #[tokio::test]
    async fn test_abandoned_conflict_recovery_reverts() {
        let (store, dispatcher) = setup(MockStore::new(vec![order("A1", OrderStatus::Pending)]));
        store.fail_next_submit(StoreError::Conflict("stale".into()));
        store.stall_fetches(true);

        let request = tokio::spawn({
            let dispatcher = dispatcher.clone();
            async move { dispatcher.request_action("A1", StaffAction::Start).await }
        });
        store.wait_for_fetches(1).await;
        assert!(dispatcher.board().is_pinned("A1"));
        request.abort();
        let _ = request.await;

        assert_eq!(dispatcher.board().get("A1").unwrap().status, OrderStatus::Pending);
        assert!(!dispatcher.board().is_pinned("A1"));

        // 没有卡死：下一次请求正常到达订单库
        store.stall_fetches(false);
        let outcome = dispatcher.request_action("A1", StaffAction::Start).await.unwrap();
        assert!(matches!(outcome, Transition::Confirmed(ref o) if o.status == OrderStatus::Preparing));
    }

    #[tokio::test]
    async fn test_serve_removes_order() {
        let (store, dispatcher) = setup(MockStore::new(vec![order("A1", OrderStatus::Ready)]));

        let outcome = dispatcher.request_action("A1", StaffAction::Serve).await.unwrap();
        assert_eq!(outcome, Transition::Completed { id: "A1".into() });
        assert!(dispatcher.board().get("A1").is_none());
        assert!(store.get("A1").is_none());
    }

    #[tokio::test]
    async fn test_advance_walks_lifecycle() {
        let (_store, dispatcher) = setup(MockStore::new(vec![order("A1", OrderStatus::Pending)]));
        dispatcher.advance("A1").await.unwrap();
        dispatcher.advance("A1").await.unwrap();
        assert_eq!(dispatcher.board().get("A1").unwrap().status, OrderStatus::Ready);
        assert!(matches!(dispatcher.advance("A1").await, Ok(Transition::Completed { .. })));
        assert!(matches!(
            dispatcher.advance("A1").await,
            Err(DispatchError::InvalidTransition { from: OrderStatus::Served, .. })
        ));
        assert!(matches!(dispatcher.advance("zz").await, Err(DispatchError::NotFound(_))));
    }
}
