use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, broadcast};
use uuid::Uuid;

use crate::message::MessageError;
use shared::message::{BusMessage, EventType};

/// 帧头长度: type(1) + request_id(16) + correlation_id(16) + len(4)
pub const FRAME_HEADER_LEN: usize = 37;

/// 单帧载荷上限 (整板快照足够)
pub const MAX_PAYLOAD_LEN: usize = 16 * 1024 * 1024;

/// Transport abstraction for push bus communication
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    async fn read_message(&self) -> Result<BusMessage, MessageError>;
    async fn write_message(&self, msg: &BusMessage) -> Result<(), MessageError>;
    async fn close(&self) -> Result<(), MessageError>;
}

/// Encode one frame
///
/// ```text
/// ┌──────┬────────────┬────────────────┬─────────┬─────────┐
/// │ type │ request_id │ correlation_id │ len(LE) │ payload │
/// │  1B  │    16B     │   16B (nil=无) │   4B    │  len B  │
/// └──────┴────────────┴────────────────┴─────────┴─────────┘
/// ```
pub fn encode_frame(msg: &BusMessage) -> Vec<u8> {
    let mut data = Vec::with_capacity(FRAME_HEADER_LEN + msg.payload.len());
    data.push(msg.event_type as u8);
    data.extend_from_slice(msg.request_id.as_bytes());

    let correlation_bytes = msg.correlation_id.unwrap_or(Uuid::nil()).into_bytes();
    data.extend_from_slice(&correlation_bytes);

    data.extend_from_slice(&(msg.payload.len() as u32).to_le_bytes());
    data.extend_from_slice(&msg.payload);
    data
}

/// Read one frame from any async reader
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<BusMessage, MessageError> {
    let mut header = [0u8; FRAME_HEADER_LEN];
    reader.read_exact(&mut header).await?;

    let event_type = EventType::try_from(header[0])
        .map_err(|_| MessageError::InvalidMessage(format!("Invalid event type {}", header[0])))?;

    let mut uuid_buf = [0u8; 16];
    uuid_buf.copy_from_slice(&header[1..17]);
    let request_id = Uuid::from_bytes(uuid_buf);

    uuid_buf.copy_from_slice(&header[17..33]);
    let correlation_raw = Uuid::from_bytes(uuid_buf);
    let correlation_id = if correlation_raw.is_nil() {
        None
    } else {
        Some(correlation_raw)
    };

    let mut len_buf = [0u8; 4];
    len_buf.copy_from_slice(&header[33..37]);
    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_PAYLOAD_LEN {
        return Err(MessageError::InvalidMessage(format!(
            "Payload too large: {} bytes",
            len
        )));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;

    Ok(BusMessage {
        request_id,
        event_type,
        correlation_id,
        payload,
    })
}

/// TCP Transport Implementation
#[derive(Debug, Clone)]
pub struct TcpTransport {
    reader: Arc<Mutex<OwnedReadHalf>>,
    writer: Arc<Mutex<OwnedWriteHalf>>,
}

impl TcpTransport {
    pub async fn connect(addr: &str) -> Result<Self, MessageError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| MessageError::Connection(format!("{}: {}", addr, e)))?;
        stream.set_nodelay(true)?;
        Ok(Self::from_stream(stream))
    }

    pub fn from_stream(stream: TcpStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            reader: Arc::new(Mutex::new(reader)),
            writer: Arc::new(Mutex::new(writer)),
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn read_message(&self) -> Result<BusMessage, MessageError> {
        let mut reader = self.reader.lock().await;
        read_frame(&mut *reader).await
    }

    async fn write_message(&self, msg: &BusMessage) -> Result<(), MessageError> {
        let mut writer = self.writer.lock().await;
        writer.write_all(&encode_frame(msg)).await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), MessageError> {
        let mut writer = self.writer.lock().await;
        writer.shutdown().await?;
        Ok(())
    }
}

/// Memory Transport Implementation (for In-Process communication)
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    /// Receiver for messages FROM server (broadcasts)
    rx: Arc<Mutex<broadcast::Receiver<BusMessage>>>,
    /// Sender for messages TO server
    tx: broadcast::Sender<BusMessage>,
}

impl MemoryTransport {
    /// Create a new memory transport
    ///
    /// # Arguments
    /// * `server_broadcast_tx` - The server's broadcast sender (to subscribe to updates)
    /// * `client_to_server_tx` - The channel to send messages TO the server
    pub fn new(
        server_broadcast_tx: &broadcast::Sender<BusMessage>,
        client_to_server_tx: &broadcast::Sender<BusMessage>,
    ) -> Self {
        Self {
            rx: Arc::new(Mutex::new(server_broadcast_tx.subscribe())),
            tx: client_to_server_tx.clone(),
        }
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn read_message(&self) -> Result<BusMessage, MessageError> {
        let mut rx = self.rx.lock().await;
        loop {
            match rx.recv().await {
                Ok(msg) => return Ok(msg),
                // 慢消费者丢帧：整板快照，下一帧即可追上
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Memory transport lagged, frames dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(MessageError::Connection("Memory channel closed".to_string()));
                }
            }
        }
    }

    async fn write_message(&self, msg: &BusMessage) -> Result<(), MessageError> {
        self.tx
            .send(msg.clone())
            .map_err(|e| MessageError::Connection(format!("Failed to send to server: {}", e)))?;
        Ok(())
    }

    async fn close(&self) -> Result<(), MessageError> {
        Ok(())
    }
}
