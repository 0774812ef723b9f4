//! Prototrace Common Library
//!
//! The audit data model shared by the replay engine and its evaluator
//! adapters, plus the structured message protocol spoken across the
//! isolation boundary with the hosted prototype document.

pub mod error;
pub mod protocol;
pub mod types;

// Re-export commonly used types
pub use error::{Error, Result};
pub use protocol::{ActionId, InboundMessage, OutboundMessage};
pub use types::*;

/// Prototrace version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
