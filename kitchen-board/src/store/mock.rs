//! In-memory order store
//!
//! 进程内的权威订单库，和真实库使用同一套状态机。测试用它脚本化失败、
//! 卡住提交 (gated) 或拉取 (stall) 以观察乐观状态，也可用于离线演示。

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use shared::models::{KitchenOrder, OrderStatus};
use tokio::sync::{Semaphore, watch};

use super::{OrderStore, StoreError, StoreResult};

#[derive(Debug, Default)]
struct MockState {
    orders: Vec<KitchenOrder>,
    /// 接下来 N 次 fetch 返回 Transport 错误
    fetch_failures: usize,
    /// 下一次 submit/complete 返回的错误
    next_submit_error: Option<StoreError>,
    /// fetch 一直挂起
    stall_fetches: bool,
}

/// In-memory store of record
#[derive(Debug)]
pub struct MockStore {
    state: Mutex<MockState>,
    /// 提交闸门：None 表示立即处理
    gate: Option<Arc<Semaphore>>,
    /// Submits received (counted before the gate)
    submits: watch::Sender<usize>,
    fetches: watch::Sender<usize>,
    /// false: 像不带 version / updated_at 的订单库
    versioned: bool,
}

impl MockStore {
    pub fn new(orders: Vec<KitchenOrder>) -> Self {
        let (submits, _) = watch::channel(0);
        let (fetches, _) = watch::channel(0);
        Self {
            state: Mutex::new(MockState {
                orders,
                ..Default::default()
            }),
            gate: None,
            submits,
            fetches,
            versioned: true,
        }
    }

    /// Records never carry a version or `updated_at`
    pub fn unversioned(orders: Vec<KitchenOrder>) -> Self {
        Self {
            versioned: false,
            ..Self::new(orders)
        }
    }

    pub fn gate_submits(mut self) -> Self {
        self.gate = Some(Arc::new(Semaphore::new(0)));
        self
    }

    /// Submits block until [`release_submit`](Self::release_submit) is called
    pub fn gated(orders: Vec<KitchenOrder>) -> Self {
        Self::new(orders).gate_submits()
    }

    /// Let one blocked submit through
    pub fn release_submit(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1);
        }
    }

    /// Fail the next `n` snapshot fetches with a transport error
    pub fn fail_fetches(&self, n: usize) {
        self.state.lock().fetch_failures = n;
    }

    /// Fetches hang until the caller gives up
    pub fn stall_fetches(&self, stall: bool) {
        self.state.lock().stall_fetches = stall;
    }

    /// Fail the next submit (or complete) with `err`
    pub fn fail_next_submit(&self, err: StoreError) {
        self.state.lock().next_submit_error = Some(err);
    }

    /// Change an order behind the board's back (another device), bumping its version
    pub fn set_status(&self, order_id: &str, status: OrderStatus) -> Option<KitchenOrder> {
        let mut state = self.state.lock();
        let order = state.orders.iter_mut().find(|o| o.id == order_id)?;
        order.status = status;
        self.touch(order);
        Some(order.clone())
    }

    fn touch(&self, order: &mut KitchenOrder) {
        if self.versioned {
            order.version += 1;
            order.updated_at = Some(Utc::now());
        }
    }

    pub fn insert(&self, order: KitchenOrder) {
        let mut state = self.state.lock();
        state.orders.retain(|o| o.id != order.id);
        state.orders.push(order);
    }

    pub fn remove(&self, order_id: &str) {
        self.state.lock().orders.retain(|o| o.id != order_id);
    }

    /// Current records of the store
    pub fn orders(&self) -> Vec<KitchenOrder> {
        self.state.lock().orders.clone()
    }

    pub fn get(&self, order_id: &str) -> Option<KitchenOrder> {
        self.state.lock().orders.iter().find(|o| o.id == order_id).cloned()
    }

    pub fn fetch_count(&self) -> usize {
        *self.fetches.borrow()
    }

    pub fn submit_count(&self) -> usize {
        *self.submits.borrow()
    }

    /// Wait until at least `n` submits have reached the store
    pub async fn wait_for_submits(&self, n: usize) {
        let mut rx = self.submits.subscribe();
        // Sender 在 self 中存活
        let _ = rx.wait_for(|count| *count >= n).await;
    }

    /// Wait until at least `n` fetches have reached the store
    pub async fn wait_for_fetches(&self, n: usize) {
        let mut rx = self.fetches.subscribe();
        let _ = rx.wait_for(|count| *count >= n).await;
    }

    async fn pass_gate(&self) -> StoreResult<()> {
        self.submits.send_modify(|count| *count += 1);
        if let Some(gate) = &self.gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|_| StoreError::Transport("Store gate closed".to_string()))?;
            permit.forget();
        }
        Ok(())
    }

    fn apply(&self, order_id: &str, target: OrderStatus) -> StoreResult<KitchenOrder> {
        let mut state = self.state.lock();
        if let Some(err) = state.next_submit_error.take() {
            return Err(err);
        }

        let idx = state
            .orders
            .iter()
            .position(|o| o.id == order_id)
            .ok_or_else(|| StoreError::Conflict(format!("Order not found: {}", order_id)))?;

        let current = state.orders[idx].status;
        if !current.can_transition_to(target) {
            return Err(StoreError::Conflict(format!(
                "Order {} is {}, cannot move to {}",
                order_id, current, target
            )));
        }

        let order = &mut state.orders[idx];
        order.status = target;
        self.touch(order);
        let confirmed = order.clone();

        // 已上菜的订单不再出现在整板里
        if target.is_terminal() {
            state.orders.remove(idx);
        }
        Ok(confirmed)
    }
}

impl Default for MockStore {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl OrderStore for MockStore {
    async fn fetch_snapshot(&self) -> StoreResult<Vec<KitchenOrder>> {
        self.fetches.send_modify(|count| *count += 1);
        let stalled = self.state.lock().stall_fetches;
        if stalled {
            std::future::pending::<()>().await;
        }

        let mut state = self.state.lock();
        if state.fetch_failures > 0 {
            state.fetch_failures -= 1;
            return Err(StoreError::Transport("Connection refused".to_string()));
        }
        Ok(state.orders.clone())
    }

    async fn submit_status(&self, order_id: &str, status: OrderStatus) -> StoreResult<KitchenOrder> {
        self.pass_gate().await?;
        self.apply(order_id, status)
    }

    async fn complete(&self, order_id: &str) -> StoreResult<KitchenOrder> {
        self.pass_gate().await?;
        self.apply(order_id, OrderStatus::Served)
    }
}
