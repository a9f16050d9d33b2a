use crate::message::transport::{MemoryTransport, TcpTransport, Transport};
use crate::message::{MessageClientConfig, MessageError};
use parking_lot::Mutex;
use shared::message::{BusMessage, HandshakePayload, PROTOCOL_VERSION};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

/// Inbound frames buffered per subscriber before it starts lagging
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Message Client
///
/// Push bus subscriber. A background task reads frames from the transport
/// and fans them out to [`subscribe`](Self::subscribe) receivers. When the
/// transport fails the client flips to disconnected and stays there; the
/// caller reconnects by building a new client.
#[derive(Debug, Clone)]
pub struct MessageClient {
    transport: ClientTransport,
    event_tx: broadcast::Sender<BusMessage>,
    /// 第一个订阅者，在读任务启动前创建，避免丢首帧
    initial_rx: Arc<Mutex<Option<broadcast::Receiver<BusMessage>>>>,
    connected: Arc<watch::Sender<bool>>,
    reader: Arc<Mutex<Option<JoinHandle<()>>>>,
}

#[derive(Debug, Clone)]
enum ClientTransport {
    Tcp(TcpTransport),
    Memory(MemoryTransport),
}

impl ClientTransport {
    async fn read_message(&self) -> Result<BusMessage, MessageError> {
        match self {
            ClientTransport::Tcp(t) => t.read_message().await,
            ClientTransport::Memory(t) => t.read_message().await,
        }
    }

    async fn write_message(&self, msg: &BusMessage) -> Result<(), MessageError> {
        match self {
            ClientTransport::Tcp(t) => t.write_message(msg).await,
            ClientTransport::Memory(t) => t.write_message(msg).await,
        }
    }

    async fn close(&self) -> Result<(), MessageError> {
        match self {
            ClientTransport::Tcp(t) => t.close().await,
            ClientTransport::Memory(t) => t.close().await,
        }
    }
}

impl MessageClient {
    /// Connect via TCP and subscribe to `topics`
    pub async fn connect(
        addr: &str,
        client_name: &str,
        topics: &[String],
        config: &MessageClientConfig,
    ) -> Result<Self, MessageError> {
        let transport = tokio::time::timeout(config.connect_timeout, TcpTransport::connect(addr))
            .await
            .map_err(|_| MessageError::Timeout(format!("Connecting to {}", addr)))??;
        let client_transport = ClientTransport::Tcp(transport);

        Self::handshake(&client_transport, client_name, topics).await?;
        tracing::info!(addr = %addr, topics = ?topics, "Push bus connected");

        Ok(Self::new(client_transport))
    }

    /// Create in-memory client
    pub async fn memory(
        server_broadcast_tx: &broadcast::Sender<BusMessage>,
        client_to_server_tx: &broadcast::Sender<BusMessage>,
        client_name: &str,
        topics: &[String],
    ) -> Result<Self, MessageError> {
        let transport = MemoryTransport::new(server_broadcast_tx, client_to_server_tx);
        let client_transport = ClientTransport::Memory(transport);

        Self::handshake(&client_transport, client_name, topics).await?;

        Ok(Self::new(client_transport))
    }

    // 🤝 Perform Handshake
    async fn handshake(
        transport: &ClientTransport,
        client_name: &str,
        topics: &[String],
    ) -> Result<(), MessageError> {
        let payload = HandshakePayload {
            version: PROTOCOL_VERSION,
            client_name: Some(client_name.to_string()),
            client_version: Some(env!("CARGO_PKG_VERSION").to_string()),
            topics: topics.to_vec(),
        };
        transport
            .write_message(&BusMessage::handshake(&payload)?)
            .await
    }

    fn new(transport: ClientTransport) -> Self {
        let (event_tx, initial_rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (connected, _) = watch::channel(true);
        let connected = Arc::new(connected);

        // Spawn background task to dispatch messages
        let reader_transport = transport.clone();
        let reader_tx = event_tx.clone();
        let reader_connected = connected.clone();
        let handle = tokio::spawn(async move {
            loop {
                match reader_transport.read_message().await {
                    Ok(msg) => {
                        if let Err(e) = reader_tx.send(msg) {
                            tracing::debug!("No subscribers for event: {}", e);
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Push transport read error: {}", e);
                        // 连接断开，客户端需重新 connect
                        break;
                    }
                }
            }
            reader_connected.send_replace(false);
        });

        Self {
            transport,
            event_tx,
            initial_rx: Arc::new(Mutex::new(Some(initial_rx))),
            connected,
            reader: Arc::new(Mutex::new(Some(handle))),
        }
    }

    /// Receive inbound frames
    pub fn subscribe(&self) -> broadcast::Receiver<BusMessage> {
        if let Some(rx) = self.initial_rx.lock().take() {
            return rx;
        }
        self.event_tx.subscribe()
    }

    /// Whether the transport is still alive
    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    /// Resolves once the transport has failed or the client was closed
    pub async fn closed(&self) {
        let mut rx = self.connected.subscribe();
        // Sender 在 self 中存活，wait_for 不会因通道关闭返回错误
        let _ = rx.wait_for(|connected| !*connected).await;
    }

    /// Send a message (Fire and Forget)
    pub async fn send(&self, msg: &BusMessage) -> Result<(), MessageError> {
        self.transport.write_message(msg).await
    }

    /// Close the client connection and stop the reader task
    pub async fn close(&self) -> Result<(), MessageError> {
        if let Some(handle) = self.reader.lock().take() {
            handle.abort();
        }
        self.connected.send_replace(false);
        self.transport.close().await
    }
}
