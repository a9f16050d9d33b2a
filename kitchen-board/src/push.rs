//! 推送通道适配器
//!
//! 订阅一个主题，把每条整板消息转成 [`Snapshot`] 交给合并任务。
//! 断线期间不缓存，重连后的下一条消息就是新的完整快照。
//!
//! 连接状态只由这里的连接/断开事件改变，轮询失败不影响它。

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use crab_client::{MemoryBus, MessageClient, MessageClientConfig, MessageError};
use shared::message::{BoardSnapshotPayload, BusMessage, EventType, PublishPayload};
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::board::Snapshot;

/// Push channel state surfaced to the UI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Connectivity {
    Connected,
    #[default]
    Disconnected,
}

impl Connectivity {
    pub fn is_connected(self) -> bool {
        self == Connectivity::Connected
    }
}

impl fmt::Display for Connectivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Connectivity::Connected => write!(f, "connected"),
            Connectivity::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// Opens one bus subscription (handshake included)
#[async_trait]
pub trait BusConnector: Send + Sync {
    async fn connect(&self) -> Result<MessageClient, MessageError>;

    /// Human readable endpoint for logs
    fn endpoint(&self) -> String;
}

/// TCP push bus
#[derive(Debug, Clone)]
pub struct TcpConnector {
    pub addr: String,
    pub client_name: String,
    pub topics: Vec<String>,
    pub config: MessageClientConfig,
}

impl TcpConnector {
    pub fn new(addr: impl Into<String>, client_name: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            client_name: client_name.into(),
            topics: vec![topic.into()],
            config: MessageClientConfig::default(),
        }
    }

    pub fn with_config(mut self, config: MessageClientConfig) -> Self {
        self.config = config;
        self
    }
}

#[async_trait]
impl BusConnector for TcpConnector {
    async fn connect(&self) -> Result<MessageClient, MessageError> {
        MessageClient::connect(&self.addr, &self.client_name, &self.topics, &self.config).await
    }

    fn endpoint(&self) -> String {
        format!("tcp://{}", self.addr)
    }
}

/// In-process push bus
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    pub bus: MemoryBus,
    pub client_name: String,
    pub topics: Vec<String>,
}

impl MemoryConnector {
    pub fn new(bus: MemoryBus, client_name: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            bus,
            client_name: client_name.into(),
            topics: vec![topic.into()],
        }
    }
}

#[async_trait]
impl BusConnector for MemoryConnector {
    async fn connect(&self) -> Result<MessageClient, MessageError> {
        self.bus.connect(&self.client_name, &self.topics).await
    }

    fn endpoint(&self) -> String {
        "memory".to_string()
    }
}

enum PumpEnd {
    Shutdown,
    Disconnected,
    /// 合并任务已退出
    ReceiverGone,
}

/// Keeps the subscription alive and forwards snapshots
pub struct PushAdapter {
    connector: Arc<dyn BusConnector>,
    topic: String,
    config: MessageClientConfig,
    connectivity: watch::Sender<Connectivity>,
}

impl PushAdapter {
    pub fn new(
        connector: impl BusConnector + 'static,
        topic: impl Into<String>,
        config: MessageClientConfig,
    ) -> Self {
        let (connectivity, _) = watch::channel(Connectivity::Disconnected);
        Self {
            connector: Arc::new(connector),
            topic: topic.into(),
            config,
            connectivity,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn connectivity(&self) -> watch::Receiver<Connectivity> {
        self.connectivity.subscribe()
    }

    fn set_connectivity(&self, state: Connectivity) {
        let changed = self.connectivity.send_if_modified(|current| {
            let changed = *current != state;
            *current = state;
            changed
        });
        if changed {
            tracing::info!(endpoint = %self.connector.endpoint(), connectivity = %state, "Push connectivity changed");
        }
    }

    /// Connect/reconnect loop; returns on shutdown, when `tx` is closed or when
    /// `max_reconnect_attempts` consecutive connects failed
    pub async fn run(self, tx: mpsc::Sender<Snapshot>, shutdown: CancellationToken) {
        let mut failures: u32 = 0;

        loop {
            let connected = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                result = self.connector.connect() => result,
            };

            let delay = match connected {
                Ok(client) => {
                    failures = 0;
                    self.set_connectivity(Connectivity::Connected);
                    let end = self.pump(&client, &tx, &shutdown).await;
                    if let Err(e) = client.close().await {
                        tracing::debug!(error = %e, "Error closing push client");
                    }
                    self.set_connectivity(Connectivity::Disconnected);

                    match end {
                        PumpEnd::Shutdown | PumpEnd::ReceiverGone => break,
                        PumpEnd::Disconnected => {
                            tracing::warn!(endpoint = %self.connector.endpoint(), "Push channel lost, reconnecting");
                            self.config.reconnect_delay
                        }
                    }
                }
                Err(e) => {
                    failures += 1;
                    let max = self.config.max_reconnect_attempts;
                    if max > 0 && failures >= max {
                        tracing::error!(
                            endpoint = %self.connector.endpoint(),
                            attempts = failures,
                            error = %e,
                            "Push channel unreachable, giving up"
                        );
                        break;
                    }
                    let delay = self.config.backoff(failures);
                    tracing::warn!(
                        endpoint = %self.connector.endpoint(),
                        attempt = failures,
                        retry_in_ms = delay.as_millis() as u64,
                        error = %e,
                        "Push connect failed"
                    );
                    delay
                }
            };

            if !Self::sleep(delay, &shutdown).await {
                break;
            }
        }

        self.set_connectivity(Connectivity::Disconnected);
        tracing::debug!(topic = %self.topic, "Push adapter stopped");
    }

    /// false = cancelled while waiting
    async fn sleep(delay: Duration, shutdown: &CancellationToken) -> bool {
        tokio::select! {
            _ = shutdown.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    async fn pump(
        &self,
        client: &MessageClient,
        tx: &mpsc::Sender<Snapshot>,
        shutdown: &CancellationToken,
    ) -> PumpEnd {
        let mut rx = client.subscribe();
        loop {
            // 先取已收到的帧，再看连接是否断开
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return PumpEnd::Shutdown,
                msg = rx.recv() => match msg {
                    Ok(msg) => {
                        if let Some(snapshot) = self.decode(&msg)
                            && tx.send(snapshot).await.is_err()
                        {
                            return PumpEnd::ReceiverGone;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Push consumer lagged, waiting for next snapshot");
                    }
                    Err(broadcast::error::RecvError::Closed) => return PumpEnd::Disconnected,
                },
                _ = client.closed() => return PumpEnd::Disconnected,
            }
        }
    }

    fn decode(&self, msg: &BusMessage) -> Option<Snapshot> {
        if msg.event_type != EventType::Publish {
            tracing::trace!(event_type = %msg.event_type, "Ignoring non-publish frame");
            return None;
        }
        let publish: PublishPayload = match msg.parse_payload() {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(error = %e, "Malformed publish frame");
                return None;
            }
        };
        if publish.topic != self.topic {
            return None;
        }
        match publish.decode::<BoardSnapshotPayload>() {
            Ok(payload) => Some(Snapshot::push(payload.orders, payload.timestamp)),
            Err(e) => {
                tracing::warn!(topic = %publish.topic, error = %e, "Malformed board snapshot");
                None
            }
        }
    }
}

impl fmt::Debug for PushAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushAdapter")
            .field("endpoint", &self.connector.endpoint())
            .field("topic", &self.topic)
            .field("connectivity", &*self.connectivity.borrow())
            .finish()
    }
}
