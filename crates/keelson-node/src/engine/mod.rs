//! Consensus engine capability.
//!
//! The node never talks to the replicated state machine directly. Everything
//! it needs (membership view, connection serving, database snapshots and
//! shutdown) goes through the [`Engine`] trait, so a real raft-backed engine
//! and the in-process [`LocalEngine`](local::LocalEngine) are interchangeable.

use std::sync::Arc;

use async_trait::async_trait;
use keelson_core::Conn;
use keelson_proto::{KsResult, NodeState, ServerInfo};

use crate::logging::LogFn;

pub mod local;

/// Called with `(old, new)` whenever the engine changes state.
pub type WatchFn = Arc<dyn Fn(NodeState, NodeState) + Send + Sync>;

/// Trait that all engine backends must implement.
#[async_trait]
pub trait Engine: Send + Sync + 'static {
    /// Human-readable name of this engine (e.g. "local").
    fn name(&self) -> &str;

    /// Current membership as seen by this node.
    async fn cluster(&self) -> KsResult<Vec<ServerInfo>>;

    /// The leader this node currently knows about, if any.
    async fn leader(&self) -> Option<ServerInfo>;

    /// Take ownership of an accepted connection and serve it.
    ///
    /// Must return promptly; serving happens in the background. Returns
    /// [`KsError::Stopped`](keelson_proto::KsError::Stopped) once the engine
    /// has been closed.
    async fn handle(&self, conn: Conn) -> KsResult<()>;

    /// Raw content of the named database file.
    async fn dump(&self, name: &str) -> KsResult<Vec<u8>>;

    /// Stop the engine. Closing twice is not an error.
    async fn close(&self) -> KsResult<()>;

    /// Install the log sink.
    fn set_log_fn(&self, log: LogFn);

    /// Install the state-change callback.
    fn set_watch_fn(&self, watch: WatchFn);
}
