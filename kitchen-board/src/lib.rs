//! Kitchen Board - live kitchen order board core
//!
//! # 模块结构
//!
//! - [`board`] - 看板状态 (Board) 与快照合并 (Reconciler)
//! - [`urgency`] - 超时/紧急程度分级
//! - [`view`] - 工位/状态筛选与工位列表
//! - [`dispatch`] - 员工状态推进 (乐观更新 + pin)
//! - [`store`] - 订单库访问抽象
//! - [`push`] - 推送通道适配器
//! - [`poll`] - 兜底轮询
//! - [`core`] - 配置、后台任务与会话
//! - [`utils`] - 日志

pub mod board;
pub mod core;
pub mod dispatch;
pub mod poll;
pub mod push;
pub mod store;
pub mod urgency;
pub mod utils;
pub mod view;

// Re-export commonly used types
pub use board::{Board, BoardEntry, MergeOutcome, MergeStats, Reconciler, SharedBoard, Snapshot, SnapshotSource};
pub use crate::core::{BoardConfig, BoardSession, BoardView, PollPolicy};
pub use dispatch::{CommandDispatcher, DispatchError, DispatchResult, StaffAction, Transition};
pub use push::{BusConnector, Connectivity, MemoryConnector, PushAdapter, TcpConnector};
pub use store::{MockStore, OrderStore, StoreError, StoreResult};
pub use urgency::{ClassifiedOrder, Severity, Urgency, UrgencyConfig};
pub use view::{BoardFilter, StationFilter, StatusFilter};

// Shared model re-exports
pub use shared::models::{Destination, KitchenOrder, OrderItem, OrderStatus, Priority};
