//! # keelson-proto
//!
//! Protocol types, constants, and data structures shared by keelson
//! cluster nodes and admin tools.
//!
//! This crate defines the membership wire protocol, the reusable message
//! buffer, error types, and the tunable defaults used by every component.

pub mod constants;
pub mod defaults;
pub mod error;
pub mod message;
pub mod node;

// Re-export commonly used types at the crate root
pub use error::{KsError, KsResult};
pub use message::{Message, Request, Response};
pub use node::{NodeRole, NodeState, ServerInfo};
