//! Reconciler - 快照合并
//!
//! 轮询和推送都投递整板快照，合并规则与来源无关：
//!
//! 1. 本地没有 → 插入
//! 2. 本地已 pin → 保留本地 (乐观状态未确认前不被旧数据回滚)
//! 3. 传入记录比本地旧 → 忽略
//! 4. 新旧标记相同且本地写入晚于快照读取 → 忽略 (订单库不发 version 时)
//! 5. 否则替换
//! 6. 快照中缺席且未 pin → 移除 (快照即"当前全部未完成订单")
//!
//! 推送快照另有整板级时间戳：比已合并的最大时间戳还旧的整板丢弃。

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use shared::models::KitchenOrder;

use super::{Board, BoardEntry, SharedBoard, Snapshot};

/// Per-merge counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub inserted: usize,
    pub replaced: usize,
    pub removed: usize,
    pub unchanged: usize,
    pub kept_pinned: usize,
    pub skipped_older: usize,
    pub skipped_invalid: usize,
    pub skipped_retired: usize,
}

impl MergeStats {
    /// Whether the merge wrote anything
    pub fn changed(&self) -> bool {
        self.inserted + self.replaced + self.removed > 0
    }
}

/// Result of merging one snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Applied(MergeStats),
    /// Snapshot older than one already merged; dropped wholesale
    Stale,
}

impl MergeOutcome {
    pub fn stats(&self) -> Option<&MergeStats> {
        match self {
            MergeOutcome::Applied(stats) => Some(stats),
            MergeOutcome::Stale => None,
        }
    }
}

impl Board {
    pub(crate) fn merge(&mut self, mut snapshot: Snapshot) -> MergeOutcome {
        if let (Some(taken_at), Some(high_water)) = (snapshot.taken_at, self.high_water)
            && taken_at < high_water
        {
            return MergeOutcome::Stale;
        }
        if let Some(taken_at) = snapshot.taken_at {
            self.high_water = Some(taken_at);
        }

        let revision = self.revision + 1;
        let written_at = snapshot.taken_at.unwrap_or_else(Utc::now);
        let mut stats = MergeStats::default();
        let mut seen: HashSet<String> = HashSet::with_capacity(snapshot.orders.len());
        let orders = std::mem::take(&mut snapshot.orders);

        for incoming in orders {
            // 校验失败的记录也算"在场"，本地记录保持不动
            seen.insert(incoming.id.clone());
            if let Err(e) = incoming.check() {
                tracing::warn!(order_id = %incoming.id, source = %snapshot.source, error = %e, "Skipping invalid order record");
                stats.skipped_invalid += 1;
                continue;
            }
            self.merge_one(incoming, &snapshot, revision, written_at, &mut stats);
        }

        let mut absent: Vec<String> = Vec::new();
        for (id, entry) in &self.entries {
            if seen.contains(id) {
                continue;
            }
            if entry.is_pinned() {
                stats.kept_pinned += 1;
            } else {
                absent.push(id.clone());
            }
        }
        for id in absent {
            self.entries.remove(&id);
            stats.removed += 1;
        }

        if stats.changed() {
            self.revision = revision;
        }
        MergeOutcome::Applied(stats)
    }

    fn merge_one(
        &mut self,
        incoming: KitchenOrder,
        snapshot: &Snapshot,
        revision: u64,
        written_at: DateTime<Utc>,
        stats: &mut MergeStats,
    ) {
        if self.retired.contains(&incoming.id) {
            stats.skipped_retired += 1;
            return;
        }
        match self.entries.get_mut(&incoming.id) {
            None => {
                // 终态记录不进看板
                if incoming.status.is_terminal() {
                    stats.unchanged += 1;
                    return;
                }
                self.entries
                    .insert(incoming.id.clone(), BoardEntry::new(incoming, revision, written_at));
                stats.inserted += 1;
            }
            Some(entry) if entry.is_pinned() => {
                stats.kept_pinned += 1;
            }
            Some(entry) if incoming.recency() < entry.order.recency() => {
                stats.skipped_older += 1;
            }
            Some(entry) if entry.order == incoming => {
                stats.unchanged += 1;
            }
            Some(entry) if incoming.recency() == entry.order.recency() && entry.is_newer_than(snapshot) => {
                stats.skipped_older += 1;
            }
            Some(_) if incoming.status.is_terminal() => {
                self.retire(&incoming.id);
                stats.removed += 1;
            }
            Some(entry) => {
                entry.order = incoming;
                entry.revision = revision;
                entry.written_at = written_at;
                stats.replaced += 1;
            }
        }
    }
}

/// Source-agnostic merge entry point over the shared board
#[derive(Debug, Clone)]
pub struct Reconciler {
    board: SharedBoard,
}

impl Reconciler {
    pub fn new(board: SharedBoard) -> Self {
        Self { board }
    }

    pub fn board(&self) -> &SharedBoard {
        &self.board
    }

    /// Merge one snapshot under the board lock
    pub fn apply(&self, snapshot: Snapshot) -> MergeOutcome {
        let source = snapshot.source;
        let taken_at = snapshot.taken_at;
        let outcome = self.board.write(|board| board.merge(snapshot));

        match &outcome {
            MergeOutcome::Applied(stats) if stats.changed() => {
                tracing::debug!(
                    source = %source,
                    inserted = stats.inserted,
                    replaced = stats.replaced,
                    removed = stats.removed,
                    kept_pinned = stats.kept_pinned,
                    skipped_older = stats.skipped_older,
                    "Snapshot merged"
                );
            }
            MergeOutcome::Applied(_) => {}
            MergeOutcome::Stale => {
                tracing::info!(source = %source, taken_at = ?taken_at, "Discarded stale snapshot");
            }
        }
        outcome
    }
}
