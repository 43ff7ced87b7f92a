//! keelson cluster node.
//!
//! A node owns a listening socket and an [`Engine`](engine::Engine) that
//! serves the membership protocol on every accepted connection. This crate
//! provides:
//! 1. the lifecycle coordinator ([`Server`]): start the accept loop, close
//!    it deterministically with a bounded wait, then stop the engine;
//! 2. the membership client ([`Server::join`], [`leave`]): Add then Promote,
//!    or Remove, sent to the current leader;
//! 3. ambient glue: database dumps, SQLite threading mode, logging and the
//!    persisted node identity used by the `keelson` daemon.

pub mod acceptor;
pub mod config;
pub mod dump;
pub mod engine;
pub mod error;
pub mod logging;
pub mod membership;
pub mod server;
pub mod threading;

#[cfg(test)]
mod testing;

pub use dump::DumpFile;
pub use engine::local::LocalEngine;
pub use engine::{Engine, WatchFn};
pub use error::ServerError;
pub use logging::{LogFn, LogLevel};
pub use membership::leave;
pub use server::{Server, ServerOptions};
