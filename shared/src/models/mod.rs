//! Data models
//!
//! Shared between the order store client, the push adapter and the board.

pub mod kitchen_order;

// Re-exports
pub use kitchen_order::*;
