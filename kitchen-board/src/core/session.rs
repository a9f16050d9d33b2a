//! 看板会话
//!
//! 一个显示会话 = 一个 Board + 合并/轮询/推送三个后台任务 + 一个 dispatcher。
//!
//! ```text
//! Poller ──┐
//!          ├── mpsc<Snapshot> ──▶ snapshot_merger ──▶ Reconciler ──▶ SharedBoard
//! Push ────┘                                                          ▲
//! staff ───────────────────────────▶ CommandDispatcher ───────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use shared::models::{KitchenOrder, OrderStatus};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use super::tasks::{BackgroundTasks, TaskKind};
use super::BoardConfig;
use crate::board::{Reconciler, SharedBoard, Snapshot};
use crate::dispatch::{CommandDispatcher, DispatchResult, StaffAction, Transition};
use crate::poll::Poller;
use crate::push::{Connectivity, PushAdapter};
use crate::store::OrderStore;
use crate::urgency::{ClassifiedOrder, UrgencyConfig};
use crate::view::{self, BoardFilter};

/// Pending snapshots between producers and the merger
const SNAPSHOT_CHANNEL_CAPACITY: usize = 32;

/// How long shutdown waits for tasks before aborting them
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// One render's worth of board data
#[derive(Debug, Clone)]
pub struct BoardView {
    pub filter: BoardFilter,
    /// Filtered orders, oldest first
    pub orders: Vec<ClassifiedOrder>,
    /// 升级栏，不受筛选影响
    pub rail: Vec<ClassifiedOrder>,
    /// Station options across the whole board
    pub stations: Vec<String>,
    pub revision: u64,
    pub connectivity: Connectivity,
}

/// Live kitchen board for one display
pub struct BoardSession {
    board: SharedBoard,
    dispatcher: CommandDispatcher,
    urgency: UrgencyConfig,
    connectivity: watch::Receiver<Connectivity>,
    /// 无推送通道时保持 watch 通道存活
    _offline: Option<watch::Sender<Connectivity>>,
    tasks: BackgroundTasks,
}

impl BoardSession {
    /// Initial load, then start merger, poller and (optionally) push tasks
    pub async fn start(config: &BoardConfig, store: Arc<dyn OrderStore>, push: Option<PushAdapter>) -> Self {
        let board = SharedBoard::new();
        let reconciler = Reconciler::new(board.clone());

        match store.fetch_snapshot().await {
            Ok(orders) => {
                let count = orders.len();
                reconciler.apply(Snapshot::poll(orders));
                tracing::info!(orders = count, "Initial board loaded");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Initial board load failed, starting empty");
            }
        }

        let mut tasks = BackgroundTasks::new();
        let token = tasks.shutdown_token();
        let (tx, rx) = mpsc::channel(SNAPSHOT_CHANNEL_CAPACITY);

        tasks.spawn(
            "snapshot_merger",
            TaskKind::Worker,
            merge_snapshots(reconciler, rx, token.clone()),
        );

        let (connectivity, offline) = match push {
            Some(adapter) => {
                let connectivity = adapter.connectivity();
                tracing::info!(topic = %adapter.topic(), "Starting push adapter");
                tasks.spawn("push_adapter", TaskKind::Listener, adapter.run(tx.clone(), token.clone()));
                (connectivity, None)
            }
            None => {
                tracing::info!("No push channel configured, polling only");
                let (sender, receiver) = watch::channel(Connectivity::Disconnected);
                (receiver, Some(sender))
            }
        };

        let poller = Poller::new(store.clone(), config.poll_interval(), config.poll_policy)
            .with_connectivity(connectivity.clone())
            .with_board(board.clone());
        tasks.spawn("board_poll", TaskKind::Periodic, poller.run(tx, token));
        tasks.log_summary();

        let dispatcher = CommandDispatcher::new(board.clone(), store).with_device(&config.client_name);

        Self {
            board,
            dispatcher,
            urgency: config.urgency,
            connectivity,
            _offline: offline,
            tasks,
        }
    }

    pub fn board(&self) -> &SharedBoard {
        &self.board
    }

    pub fn dispatcher(&self) -> &CommandDispatcher {
        &self.dispatcher
    }

    pub fn orders(&self) -> Vec<KitchenOrder> {
        self.board.orders()
    }

    pub fn stations(&self) -> Vec<String> {
        self.board.stations()
    }

    pub fn connectivity(&self) -> Connectivity {
        *self.connectivity.borrow()
    }

    pub fn watch_connectivity(&self) -> watch::Receiver<Connectivity> {
        self.connectivity.clone()
    }

    /// Board revision after every change
    pub fn subscribe_changes(&self) -> watch::Receiver<u64> {
        self.board.subscribe()
    }

    pub fn escalation_rail(&self, now: DateTime<Utc>) -> Vec<ClassifiedOrder> {
        let classified = self.urgency.classify_all(self.board.orders(), now);
        self.urgency.escalation_rail(&classified)
    }

    /// Filtered, classified view from one point-in-time copy of the board
    pub fn view(&self, filter: &BoardFilter, now: DateTime<Utc>) -> BoardView {
        let (orders, revision) = self.board.read(|b| (b.orders(), b.revision()));
        let stations = view::station_options(&orders);
        let classified = self.urgency.classify_all(orders, now);
        let rail = self.urgency.escalation_rail(&classified);
        let orders = classified.into_iter().filter(|c| filter.matches(&c.order)).collect();

        BoardView {
            filter: filter.clone(),
            orders,
            rail,
            stations,
            revision,
            connectivity: self.connectivity(),
        }
    }

    pub async fn request_transition(&self, id: &str, target: OrderStatus) -> DispatchResult<Transition> {
        self.dispatcher.request_transition(id, target).await
    }

    pub async fn request_action(&self, id: &str, action: StaffAction) -> DispatchResult<Transition> {
        self.dispatcher.request_action(id, action).await
    }

    pub async fn advance(&self, id: &str) -> DispatchResult<Transition> {
        self.dispatcher.advance(id).await
    }

    /// Names of background tasks that have stopped running
    pub fn finished_tasks(&self) -> Vec<&'static str> {
        self.tasks.finished()
    }

    /// Stop polling, release the push subscription and wait for the tasks
    pub async fn shutdown(self) {
        self.tasks.shutdown(SHUTDOWN_GRACE).await;
    }
}

/// 唯一的快照写入任务
async fn merge_snapshots(reconciler: Reconciler, mut rx: mpsc::Receiver<Snapshot>, shutdown: CancellationToken) {
    loop {
        let snapshot = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            snapshot = rx.recv() => match snapshot {
                Some(snapshot) => snapshot,
                None => break,
            },
        };
        reconciler.apply(snapshot);
    }
    tracing::debug!("Snapshot merger stopped");
}

impl std::fmt::Debug for BoardSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoardSession")
            .field("board", &self.board)
            .field("connectivity", &self.connectivity())
            .field("tasks", &self.tasks.names())
            .finish()
    }
}
