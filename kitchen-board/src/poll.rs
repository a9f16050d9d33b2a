//! 兜底轮询
//!
//! 定时拉整板。失败只记录日志，看板保留上一次的数据，连接状态不变。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::board::{SharedBoard, Snapshot};
use crate::core::PollPolicy;
use crate::push::Connectivity;
use crate::store::{OrderStore, StoreResult};

pub struct Poller {
    store: Arc<dyn OrderStore>,
    interval: Duration,
    policy: PollPolicy,
    connectivity: Option<watch::Receiver<Connectivity>>,
    /// 用于记录拉取发起时的 revision
    board: Option<SharedBoard>,
}

impl Poller {
    pub fn new(store: Arc<dyn OrderStore>, interval: Duration, policy: PollPolicy) -> Self {
        Self {
            store,
            interval,
            policy,
            connectivity: None,
            board: None,
        }
    }

    /// Stamp each snapshot with the board revision read before the fetch
    pub fn with_board(mut self, board: SharedBoard) -> Self {
        self.board = Some(board);
        self
    }

    /// Push connectivity consulted by [`PollPolicy::WhenDisconnected`]
    pub fn with_connectivity(mut self, connectivity: watch::Receiver<Connectivity>) -> Self {
        self.connectivity = Some(connectivity);
        self
    }

    /// Whether the next tick should hit the store
    pub fn should_poll(&self) -> bool {
        match self.policy {
            PollPolicy::Always => true,
            PollPolicy::WhenDisconnected => !self
                .connectivity
                .as_ref()
                .is_some_and(|rx| rx.borrow().is_connected()),
        }
    }

    pub async fn poll_once(&self) -> StoreResult<Snapshot> {
        let basis = self.board.as_ref().map(SharedBoard::revision);
        let orders = self.store.fetch_snapshot().await?;
        let snapshot = Snapshot::poll(orders);
        Ok(match basis {
            Some(revision) => snapshot.with_basis(revision),
            None => snapshot,
        })
    }

    pub async fn run(self, tx: mpsc::Sender<Snapshot>, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // 首个 tick 立即完成；初始加载已由会话完成
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if !self.should_poll() {
                tracing::trace!("Push connected, skipping poll");
                continue;
            }

            let fetched = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                result = self.poll_once() => result,
            };

            match fetched {
                Ok(snapshot) => {
                    if tx.send(snapshot).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Board poll failed, keeping last known state");
                }
            }
        }
        tracing::debug!("Poller stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::SnapshotSource;
    use crate::store::MockStore;
    use chrono::Utc;
    use shared::models::{Destination, KitchenOrder, OrderItem};
    use tokio::time::timeout;

    fn store() -> Arc<MockStore> {
        Arc::new(MockStore::new(vec![
            KitchenOrder::new("A1", 1, Destination::Table("T1".into()), Utc::now())
                .with_item(OrderItem::new(1, "Tea")),
        ]))
    }

    #[tokio::test]
    async fn test_policy_gates_on_connectivity() {
        let (conn_tx, conn_rx) = watch::channel(Connectivity::Connected);

        let always = Poller::new(store(), Duration::from_secs(1), PollPolicy::Always).with_connectivity(conn_rx.clone());
        assert!(always.should_poll());

        let gated =
            Poller::new(store(), Duration::from_secs(1), PollPolicy::WhenDisconnected).with_connectivity(conn_rx);
        assert!(!gated.should_poll());
        conn_tx.send_replace(Connectivity::Disconnected);
        assert!(gated.should_poll());

        // 没有推送通道时总是轮询
        assert!(Poller::new(store(), Duration::from_secs(1), PollPolicy::WhenDisconnected).should_poll());
    }

    #[tokio::test]
    async fn test_snapshot_records_revision_before_fetch() {
        let board = SharedBoard::new();
        board.write(|b| b.merge(Snapshot::poll(store().orders())));
        let poller = Poller::new(store(), Duration::from_secs(1), PollPolicy::Always).with_board(board.clone());

        let snapshot = poller.poll_once().await.unwrap();
        assert_eq!(snapshot.basis, Some(board.revision()));
        assert_eq!(Poller::new(store(), Duration::from_secs(1), PollPolicy::Always).poll_once().await.unwrap().basis, None);
    }

    #[tokio::test]
    async fn test_failures_are_swallowed() {
        let store = store();
        store.fail_fetches(2);
        let poller = Poller::new(store.clone(), Duration::from_millis(10), PollPolicy::Always);
        let (tx, mut rx) = mpsc::channel(4);
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(poller.run(tx, shutdown.clone()));

        let snapshot = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
        assert_eq!(snapshot.source, SnapshotSource::Poll);
        assert_eq!(snapshot.orders.len(), 1);
        assert!(store.fetch_count() >= 3);

        shutdown.cancel();
        handle.await.unwrap();
    }
}
