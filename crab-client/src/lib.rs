//! Crab Client - transport clients for the kitchen board
//!
//! - [`HttpClient`]: REST calls against the external order store
//! - [`MessageClient`]: push bus subscription (TCP or in-memory)

pub mod config;
pub mod error;
pub mod http;
pub mod message;

pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
pub use http::HttpClient;

// Message types and clients
pub use message::{BusMessage, EventType, MemoryBus, MessageClient, MessageClientConfig, MessageError};
