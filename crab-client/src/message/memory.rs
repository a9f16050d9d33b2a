//! 进程内推送总线
//!
//! 同进程嵌入或测试时代替 TCP 推送服务：
//!
//! ```text
//! MemoryBus::publish() ──▶ server_tx ──▶ MessageClient(s)
//! MessageClient::send() ──▶ client_tx ──▶ MemoryBus::inbound()
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use shared::message::BusMessage;
use tokio::sync::broadcast;

use crate::message::{MessageClient, MessageError};

#[derive(Debug, Clone)]
pub struct MemoryBus {
    /// 服务器到客户端的广播通道 (可整体替换以模拟断线)
    server_tx: Arc<Mutex<broadcast::Sender<BusMessage>>>,
    /// 客户端到服务器的消息通道
    client_tx: broadcast::Sender<BusMessage>,
    /// 保活接收端，保证握手写入不会因无接收者失败
    _inbound_keepalive: Arc<broadcast::Receiver<BusMessage>>,
    capacity: usize,
}

impl MemoryBus {
    pub fn new(capacity: usize) -> Self {
        let (server_tx, _) = broadcast::channel(capacity);
        let (client_tx, keepalive) = broadcast::channel(capacity);
        Self {
            server_tx: Arc::new(Mutex::new(server_tx)),
            client_tx,
            _inbound_keepalive: Arc::new(keepalive),
            capacity,
        }
    }

    /// Connect a new subscriber
    pub async fn connect(
        &self,
        client_name: &str,
        topics: &[String],
    ) -> Result<MessageClient, MessageError> {
        let server_tx = self.server_tx.lock().clone();
        MessageClient::memory(&server_tx, &self.client_tx, client_name, topics).await
    }

    /// 广播到所有订阅者，返回接收者数量 (无订阅者时为 0)
    pub fn publish(&self, msg: BusMessage) -> usize {
        self.server_tx.lock().send(msg).unwrap_or(0)
    }

    /// Publish `data` on `topic`
    pub fn publish_topic<T: Serialize>(&self, topic: &str, data: &T) -> Result<usize, MessageError> {
        Ok(self.publish(BusMessage::publish(topic, data)?))
    }

    /// 断开全部订阅者：旧通道关闭，之后 connect 的客户端使用新通道
    pub fn drop_clients(&self) {
        let (fresh, _) = broadcast::channel(self.capacity);
        let old = std::mem::replace(&mut *self.server_tx.lock(), fresh);
        tracing::debug!(subscribers = old.receiver_count(), "Dropping memory bus clients");
    }

    /// Number of connected subscribers
    pub fn subscriber_count(&self) -> usize {
        self.server_tx.lock().receiver_count()
    }

    /// Frames written by clients (handshakes)
    pub fn inbound(&self) -> broadcast::Receiver<BusMessage> {
        self.client_tx.subscribe()
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new(64)
    }
}
