//! 会话运行时：配置、后台任务与会话装配

pub mod config;
pub mod session;
pub mod tasks;

pub use config::{BoardConfig, PollPolicy};
pub use session::{BoardSession, BoardView};
pub use tasks::{BackgroundTasks, TaskKind};
