//! Shared types for the Crab kitchen board
//!
//! Wire and data types used by the store client, the push bus client
//! and the board core.

pub mod error;
pub mod message;
pub mod models;

// Re-exports
pub use serde::{Deserialize, Serialize};

// Message bus re-exports (for convenient access)
pub use message::{BusMessage, EventType};

pub use error::{ModelError, ModelResult};
pub use models::{Destination, KitchenOrder, OrderItem, OrderStatus, Priority, Recency};
