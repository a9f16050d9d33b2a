// crab-client/src/message/mod.rs
// 消息模块 - 推送总线客户端配置和错误类型

pub mod client;
pub mod memory;
pub mod transport;

pub use client::MessageClient;
pub use memory::MemoryBus;
pub use shared::message::{BusMessage, EventType};

use std::time::Duration;
use thiserror::Error;

/// 推送总线错误
#[derive(Debug, Error)]
pub enum MessageError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Timeout: {0}")]
    Timeout(String),
}

/// 消息客户端配置
#[derive(Debug, Clone)]
pub struct MessageClientConfig {
    /// 连接超时
    pub connect_timeout: Duration,
    /// 重连延迟
    pub reconnect_delay: Duration,
    /// 最大重连延迟 (指数退避上限)
    pub max_reconnect_delay: Duration,
    /// 最大重连尝试次数 (0 表示无限重试)
    pub max_reconnect_attempts: u32,
}

impl Default for MessageClientConfig {
    /// 局域网优化配置
    ///
    /// 特点：
    /// - 快速重连（最长 10 秒退避）
    /// - 无限重试，看板需要一直在线
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(3),
            reconnect_delay: Duration::from_millis(500),  // 首次重连 500ms
            max_reconnect_delay: Duration::from_secs(10), // 最长 10 秒退避
            max_reconnect_attempts: 0,
        }
    }
}

impl MessageClientConfig {
    /// 创建默认配置 (局域网优化)
    pub fn new() -> Self {
        Self::default()
    }

    /// 广域网/互联网配置
    ///
    /// 特点：容忍高延迟
    /// - 退避上限：60 秒
    pub fn wan() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            reconnect_delay: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(60),
            max_reconnect_attempts: 0,
        }
    }

    /// 设置连接超时
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// 设置重连退避区间
    pub fn with_reconnect_delay(mut self, initial: Duration, max: Duration) -> Self {
        self.reconnect_delay = initial;
        self.max_reconnect_delay = max.max(initial);
        self
    }

    /// 设置最大重连尝试次数 (0 表示无限重试)
    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    /// 第 `attempt` 次重连前的等待时间 (从 1 开始，指数退避)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.reconnect_delay
            .saturating_mul(1u32 << shift)
            .min(self.max_reconnect_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = MessageClientConfig::default();
        assert_eq!(config.reconnect_delay, Duration::from_millis(500));
        assert_eq!(config.max_reconnect_attempts, 0);
    }

    #[test]
    fn test_backoff_is_capped() {
        let config = MessageClientConfig::new()
            .with_reconnect_delay(Duration::from_millis(100), Duration::from_millis(700));
        assert_eq!(config.backoff(1), Duration::from_millis(100));
        assert_eq!(config.backoff(2), Duration::from_millis(200));
        assert_eq!(config.backoff(3), Duration::from_millis(400));
        assert_eq!(config.backoff(4), Duration::from_millis(700));
        assert_eq!(config.backoff(40), Duration::from_millis(700));
    }
}
