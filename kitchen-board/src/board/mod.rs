//! 看板状态
//!
//! [`Board`] 是一次显示会话内唯一的可变共享资源。写入只经过两条路径：
//!
//! ```text
//! poll / push ──▶ Reconciler::apply ──┐
//!                                     ├──▶ SharedBoard (单写锁) ──▶ watch<revision>
//! staff action ──▶ CommandDispatcher ─┘
//! ```
//!
//! 读方 (urgency / view) 只拿时间点拷贝，不持有锁。

mod reconciler;

pub use reconciler::{MergeOutcome, MergeStats, Reconciler};

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use shared::models::{KitchenOrder, OrderStatus};
use tokio::sync::watch;

use crate::dispatch::DispatchError;

/// Where a snapshot came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotSource {
    /// Fallback poll timer (or initial load)
    Poll,
    /// Push channel message
    Push,
    /// Conflict recovery refetch
    Refetch,
}

impl std::fmt::Display for SnapshotSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SnapshotSource::Poll => write!(f, "poll"),
            SnapshotSource::Push => write!(f, "push"),
            SnapshotSource::Refetch => write!(f, "refetch"),
        }
    }
}

/// Complete replacement view of all active orders
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub orders: Vec<KitchenOrder>,
    pub source: SnapshotSource,
    /// Server timestamp (push only)
    pub taken_at: Option<DateTime<Utc>>,
    /// 发起拉取时的看板 revision (poll / refetch)
    pub basis: Option<u64>,
}

impl Snapshot {
    pub fn poll(orders: Vec<KitchenOrder>) -> Self {
        Self {
            orders,
            source: SnapshotSource::Poll,
            taken_at: None,
            basis: None,
        }
    }

    pub fn push(orders: Vec<KitchenOrder>, timestamp: DateTime<Utc>) -> Self {
        Self {
            orders,
            source: SnapshotSource::Push,
            taken_at: Some(timestamp),
            basis: None,
        }
    }

    pub fn refetch(orders: Vec<KitchenOrder>) -> Self {
        Self {
            orders,
            source: SnapshotSource::Refetch,
            taken_at: None,
            basis: None,
        }
    }

    /// Board revision read just before the fetch was sent
    pub fn with_basis(mut self, revision: u64) -> Self {
        self.basis = Some(revision);
        self
    }
}

/// In-flight transition lock held by the dispatcher
#[derive(Debug, Clone)]
pub struct Pin {
    /// Record before the optimistic change (restored on failure)
    pub prior: KitchenOrder,
    pub target: OrderStatus,
}

/// One order on the board
#[derive(Debug, Clone)]
pub struct BoardEntry {
    pub order: KitchenOrder,
    pub pin: Option<Pin>,
    /// Board revision at which this entry was last written
    pub revision: u64,
    /// 数据时间：推送写入取服务端时间戳，其余写入取本地时间
    pub written_at: DateTime<Utc>,
}

impl BoardEntry {
    fn new(order: KitchenOrder, revision: u64, written_at: DateTime<Utc>) -> Self {
        Self {
            order,
            pin: None,
            revision,
            written_at,
        }
    }

    pub fn is_pinned(&self) -> bool {
        self.pin.is_some()
    }

    /// Whether this entry was written after the snapshot's data was read.
    ///
    /// Only consulted when recency markers tie (stores that send no
    /// `version` / `updated_at`).
    pub fn is_newer_than(&self, snapshot: &Snapshot) -> bool {
        let after_fetch = snapshot.basis.is_some_and(|basis| self.revision > basis);
        let after_push = snapshot.taken_at.is_some_and(|taken_at| self.written_at > taken_at);
        after_fetch || after_push
    }
}

/// Canonical set of active orders, keyed by id
#[derive(Debug, Default)]
pub struct Board {
    entries: HashMap<String, BoardEntry>,
    revision: u64,
    /// 已合并推送快照的最大服务端时间戳
    high_water: Option<DateTime<Utc>>,
    /// 已上菜的订单 id，之后的旧快照不能把它们带回来
    retired: HashSet<String>,
}

impl Board {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Monotonic change counter
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn high_water(&self) -> Option<DateTime<Utc>> {
        self.high_water
    }

    pub fn get(&self, id: &str) -> Option<&KitchenOrder> {
        self.entries.get(id).map(|e| &e.order)
    }

    pub fn entry(&self, id: &str) -> Option<&BoardEntry> {
        self.entries.get(id)
    }

    pub fn is_pinned(&self, id: &str) -> bool {
        self.entries.get(id).is_some_and(BoardEntry::is_pinned)
    }

    /// Whether `id` was served during this session
    pub fn is_retired(&self, id: &str) -> bool {
        self.retired.contains(id)
    }

    /// Point-in-time copy, oldest order first (ties by id)
    pub fn orders(&self) -> Vec<KitchenOrder> {
        let mut orders: Vec<KitchenOrder> = self.entries.values().map(|e| e.order.clone()).collect();
        orders.sort_by(|a, b| a.ordered_at.cmp(&b.ordered_at).then_with(|| a.id.cmp(&b.id)));
        orders
    }

    /// Distinct station tags across all items, sorted
    pub fn stations(&self) -> Vec<String> {
        crate::view::station_options(&self.orders())
    }

    fn next_revision(&mut self) -> u64 {
        self.revision += 1;
        self.revision
    }

    // ========== Dispatcher write path ==========

    /// Validate, pin and apply `target` optimistically. Returns the confirmed
    /// status the order had before the change.
    pub(crate) fn begin_transition(
        &mut self,
        id: &str,
        target: OrderStatus,
    ) -> Result<OrderStatus, DispatchError> {
        // 已上菜的订单仍按终态校验
        if self.retired.contains(id) {
            return Err(DispatchError::InvalidTransition {
                id: id.to_string(),
                from: OrderStatus::Served,
                to: target,
            });
        }

        let revision = self.revision + 1;
        let entry = self
            .entries
            .get_mut(id)
            .ok_or_else(|| DispatchError::NotFound(id.to_string()))?;

        if entry.pin.is_some() {
            return Err(DispatchError::Busy(id.to_string()));
        }

        let from = entry.order.status;
        if !from.can_transition_to(target) {
            return Err(DispatchError::InvalidTransition {
                id: id.to_string(),
                from,
                to: target,
            });
        }

        entry.pin = Some(Pin {
            prior: entry.order.clone(),
            target,
        });
        entry.order.status = target;
        entry.revision = revision;
        self.revision = revision;
        Ok(from)
    }

    /// Adopt the store's confirmed record and release the pin.
    /// A confirmed terminal record removes the order.
    pub(crate) fn confirm_transition(&mut self, id: &str, confirmed: KitchenOrder) {
        let revision = self.next_revision();
        if confirmed.status.is_terminal() {
            self.retire(id);
            return;
        }
        self.entries
            .insert(id.to_string(), BoardEntry::new(confirmed, revision, Utc::now()));
    }

    /// Restore the pre-transition record and release the pin.
    /// Returns the abandoned target, `None` if nothing was pinned.
    pub(crate) fn revert_transition(&mut self, id: &str) -> Option<OrderStatus> {
        let revision = self.revision + 1;
        let entry = self.entries.get_mut(id)?;
        let pin = entry.pin.take()?;
        entry.order = pin.prior;
        entry.revision = revision;
        self.revision = revision;
        Some(pin.target)
    }

    /// Release the pin and force the entry to the authoritative record,
    /// ignoring recency. `None` means the store no longer lists the order.
    pub(crate) fn force_replace(&mut self, id: &str, fresh: Option<KitchenOrder>) {
        let revision = self.next_revision();
        match fresh {
            Some(order) if !order.status.is_terminal() => {
                self.entries
                    .insert(id.to_string(), BoardEntry::new(order, revision, Utc::now()));
            }
            Some(_) => self.retire(id),
            None => {
                self.entries.remove(id);
            }
        }
    }

    pub(crate) fn retire(&mut self, id: &str) {
        self.entries.remove(id);
        self.retired.insert(id.to_string());
    }
}

/// Board behind the single-writer lock, with change notification
///
/// Cheap to clone; all clones share one board.
#[derive(Debug, Clone)]
pub struct SharedBoard {
    inner: Arc<Mutex<Board>>,
    changes: Arc<watch::Sender<u64>>,
}

impl SharedBoard {
    pub fn new() -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            inner: Arc::new(Mutex::new(Board::new())),
            changes: Arc::new(changes),
        }
    }

    /// Run `f` against a read-only view of the board
    pub fn read<R>(&self, f: impl FnOnce(&Board) -> R) -> R {
        f(&self.inner.lock())
    }

    /// Point-in-time copy of all orders
    pub fn orders(&self) -> Vec<KitchenOrder> {
        self.read(Board::orders)
    }

    pub fn get(&self, id: &str) -> Option<KitchenOrder> {
        self.read(|b| b.get(id).cloned())
    }

    pub fn stations(&self) -> Vec<String> {
        self.read(Board::stations)
    }

    pub fn revision(&self) -> u64 {
        self.read(Board::revision)
    }

    pub fn len(&self) -> usize {
        self.read(Board::len)
    }

    pub fn is_empty(&self) -> bool {
        self.read(Board::is_empty)
    }

    pub fn is_pinned(&self, id: &str) -> bool {
        self.read(|b| b.is_pinned(id))
    }

    /// Receives the board revision after every change
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    /// 写入口：仅 Reconciler / CommandDispatcher 使用
    pub(crate) fn write<R>(&self, f: impl FnOnce(&mut Board) -> R) -> R {
        let (result, before, after) = {
            let mut board = self.inner.lock();
            let before = board.revision;
            let result = f(&mut board);
            (result, before, board.revision)
        };
        if after != before {
            self.changes.send_replace(after);
        }
        result
    }
}

impl Default for SharedBoard {
    fn default() -> Self {
        Self::new()
    }
}
