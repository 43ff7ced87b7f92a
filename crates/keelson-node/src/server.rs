//! Lifecycle coordinator.
//!
//! A [`Server`] binds a node identity to an [`Engine`]. `start` launches the
//! accept loop; `close` shuts it down in a fixed order:
//!
//! 1. close the listener, which unblocks the pending accept;
//! 2. wait (bounded) for the accept loop to report;
//! 3. close the engine.
//!
//! Each step that fails aborts the sequence with an error naming the step.

use std::path::Path;
use std::sync::Arc;

use keelson_core::{DialFn, Listener, ServerStore};
use keelson_proto::defaults::DEFAULT_ACCEPT_STOP_TIMEOUT;
use keelson_proto::{KsResult, ServerInfo};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::acceptor::Acceptor;
use crate::dump;
use crate::engine::{Engine, WatchFn};
use crate::error::ServerError;
use crate::logging::{noop_log_fn, LogFn};
use crate::membership;

/// Options for [`Server::new`]. All fields are optional.
#[derive(Clone, Default)]
pub struct ServerOptions {
    /// Engine log sink (default: discard).
    pub log: Option<LogFn>,
    /// Dial function for membership changes (default: TCP).
    pub dial: Option<DialFn>,
    /// Engine state-change callback (default: none).
    pub watch: Option<WatchFn>,
}

impl ServerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_log_fn(mut self, log: LogFn) -> Self {
        self.log = Some(log);
        self
    }

    pub fn with_dial_fn(mut self, dial: DialFn) -> Self {
        self.dial = Some(dial);
        self
    }

    pub fn with_watch_fn(mut self, watch: WatchFn) -> Self {
        self.watch = Some(watch);
        self
    }
}

impl std::fmt::Debug for ServerOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerOptions")
            .field("log", &self.log.is_some())
            .field("dial", &self.dial.is_some())
            .field("watch", &self.watch.is_some())
            .finish()
    }
}

/// A cluster node: identity, engine and accept loop.
pub struct Server {
    info: ServerInfo,
    engine: Arc<dyn Engine>,
    dial: Option<DialFn>,
    /// Present between `start` and `close`.
    acceptor: Option<Acceptor>,
    started: bool,
    /// Set when a close stopped partway, leaving the engine running.
    close_failed: bool,
}

impl Server {
    /// Create a server. The engine receives the log sink and watch callback
    /// from `options`.
    pub fn new(info: ServerInfo, engine: Arc<dyn Engine>, options: ServerOptions) -> Self {
        engine.set_log_fn(options.log.unwrap_or_else(noop_log_fn));
        if let Some(watch) = options.watch {
            engine.set_watch_fn(watch);
        }
        debug!("server {} using engine {}", info, engine.name());

        Self {
            info,
            engine,
            dial: options.dial,
            acceptor: None,
            started: false,
            close_failed: false,
        }
    }

    pub fn id(&self) -> u64 {
        self.info.id
    }

    pub fn address(&self) -> &str {
        &self.info.address
    }

    pub fn info(&self) -> &ServerInfo {
        &self.info
    }

    /// Membership as reported by the engine.
    pub async fn cluster(&self) -> KsResult<Vec<ServerInfo>> {
        self.engine.cluster().await
    }

    /// Leader as reported by the engine.
    pub async fn leader(&self) -> Option<ServerInfo> {
        self.engine.leader().await
    }

    /// Start accepting connections on `listener`. Returns immediately.
    ///
    /// The accept loop is spawned onto the current tokio runtime, so this
    /// must be called from within one; it panics otherwise.
    pub fn start(&mut self, listener: Arc<dyn Listener>) -> Result<(), ServerError> {
        if self.started {
            return Err(ServerError::AlreadyStarted);
        }
        self.started = true;

        match listener.local_addr() {
            Ok(addr) => info!("server {} accepting connections on {}", self.info.id, addr),
            Err(_) => info!("server {} accepting connections", self.info.id),
        }
        self.acceptor = Some(Acceptor::start(listener, self.engine.clone()));
        Ok(())
    }

    /// Join the cluster described by `store` as a voter.
    ///
    /// `dial` overrides the dial function given in [`ServerOptions`].
    pub async fn join(
        &self,
        store: Arc<dyn ServerStore>,
        dial: Option<DialFn>,
        cancel: &CancellationToken,
    ) -> KsResult<()> {
        let dial = dial.or_else(|| self.dial.clone());
        membership::join(&self.info, store, dial, cancel).await
    }

    /// Write database `name` and its WAL into `dir`.
    pub async fn dump(&self, name: &str, dir: impl AsRef<Path>) -> Result<(), ServerError> {
        dump::dump_to_dir(self.engine.as_ref(), name, dir.as_ref()).await
    }

    /// Stop the accept loop, then the engine.
    ///
    /// Closing a server that was never started, or closing twice, is a
    /// no-op. If the listener cannot be closed the server stays running and
    /// `close` may be retried. Any later failure (the accept loop did not
    /// stop, or the engine failed to stop) is final: the accept loop has
    /// been released, so a further `close` returns `Ok(())` without
    /// touching the engine again.
    pub async fn close(&mut self) -> Result<(), ServerError> {
        let Some(acceptor) = self.acceptor.take() else {
            if self.close_failed {
                warn!(
                    "server {}: close already failed, engine was not stopped cleanly",
                    self.info.id
                );
            }
            return Ok(());
        };

        if let Err(e) = acceptor.close_listener() {
            warn!("server {}: failed to close listener: {}", self.info.id, e);
            self.acceptor = Some(acceptor);
            return Err(ServerError::Listener(e));
        }

        let result = self.stop(acceptor).await;
        if let Err(e) = &result {
            warn!("server {}: close failed: {}", self.info.id, e);
            self.close_failed = true;
        }
        result
    }

    async fn stop(&self, acceptor: Acceptor) -> Result<(), ServerError> {
        acceptor.wait(DEFAULT_ACCEPT_STOP_TIMEOUT).await?;
        self.engine.close().await.map_err(ServerError::Stop)?;
        info!("server {} stopped", self.info);
        Ok(())
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if let Some(acceptor) = &self.acceptor {
            let _ = acceptor.close_listener();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::local::LocalEngine;
    use crate::testing::{FakeEngine, FakeListener, HandleMode};
    use keelson_core::{InMemoryServerStore, TcpNodeListener};
    use keelson_proto::{KsError, NodeRole};
    use std::sync::atomic::Ordering;
    use std::time::{Duration, Instant};

    fn fake_server(engine: FakeEngine) -> (Server, Arc<FakeEngine>) {
        let engine = Arc::new(engine);
        let server = Server::new(
            ServerInfo::new(1, "127.0.0.1:9001"),
            engine.clone(),
            ServerOptions::new(),
        );
        (server, engine)
    }

    #[tokio::test]
    async fn test_new_installs_log_fn() {
        let (server, engine) = fake_server(FakeEngine::new(HandleMode::RecordTag));
        assert!(engine.log_set.load(Ordering::SeqCst));
        assert_eq!(server.id(), 1);
        assert_eq!(server.address(), "127.0.0.1:9001");
    }

    #[tokio::test]
    async fn test_close_before_start() {
        let (mut server, engine) = fake_server(FakeEngine::new(HandleMode::RecordTag));
        server.close().await.unwrap();
        assert!(!engine.closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_close_twice() {
        let (mut server, engine) = fake_server(FakeEngine::new(HandleMode::RecordTag));
        let (listener, _conns) = FakeListener::new();
        server.start(listener).unwrap();

        server.close().await.unwrap();
        assert!(engine.closed.load(Ordering::SeqCst));
        server.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_start_twice() {
        let (mut server, _engine) = fake_server(FakeEngine::new(HandleMode::RecordTag));
        let (first, _c1) = FakeListener::new();
        let (second, _c2) = FakeListener::new();
        server.start(first).unwrap();
        assert!(matches!(server.start(second), Err(ServerError::AlreadyStarted)));
        server.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_close_times_out_on_stuck_handle() {
        let (mut server, engine) =
            fake_server(FakeEngine::new(HandleMode::Block(Duration::from_secs(2))));
        let (listener, conns) = FakeListener::new();
        server.start(listener).unwrap();

        let (_client, conn) = tokio::io::duplex(64);
        conns.send(Box::new(conn)).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let started = Instant::now();
        let result = server.close().await;
        assert!(matches!(result, Err(ServerError::AcceptTimeout(_))));
        assert!(started.elapsed() < Duration::from_secs(2));
        // The engine is left running when the accept loop did not stop.
        assert!(!engine.closed.load(Ordering::SeqCst));

        // The failure is final; closing again does not reach the engine.
        server.close().await.unwrap();
        assert!(!engine.closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_close_releases_socket_while_handle_is_stuck() {
        let listener = TcpNodeListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (mut server, _engine) =
            fake_server(FakeEngine::new(HandleMode::Block(Duration::from_secs(5))));
        server.start(Arc::new(listener)).unwrap();

        let _stuck = tokio::net::TcpStream::connect(addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let result = server.close().await;
        assert!(matches!(result, Err(ServerError::AcceptTimeout(_))));
        assert!(tokio::net::TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn test_close_reports_listener_failure() {
        let (mut server, engine) = fake_server(FakeEngine::new(HandleMode::RecordTag));
        let (listener, _conns) = FakeListener::failing_close();
        server.start(listener).unwrap();

        assert!(matches!(server.close().await, Err(ServerError::Listener(_))));
        assert!(!engine.closed.load(Ordering::SeqCst));
        // Still running, so a retry fails the same way.
        assert!(matches!(server.close().await, Err(ServerError::Listener(_))));
    }

    #[tokio::test]
    async fn test_close_reports_engine_failure() {
        let engine = FakeEngine::new(HandleMode::RecordTag).with_close_result(Err(KsError::Eio));
        let (mut server, _engine) = fake_server(engine);
        let (listener, _conns) = FakeListener::new();
        server.start(listener).unwrap();

        assert!(matches!(server.close().await, Err(ServerError::Stop(KsError::Eio))));
    }

    #[tokio::test]
    async fn test_join_uses_option_dial() {
        let leader = crate::testing::FakeLeader::new(ServerInfo::new(9, "10.0.0.9:9000"));
        let engine = Arc::new(FakeEngine::new(HandleMode::RecordTag));
        let server = Server::new(
            ServerInfo::new(7, "10.0.0.7:9000"),
            engine,
            ServerOptions::new().with_dial_fn(leader.dial_fn()),
        );
        let store: Arc<dyn ServerStore> =
            Arc::new(InMemoryServerStore::new(vec![leader.info.clone()]));

        server.join(store, None, &CancellationToken::new()).await.unwrap();
        assert_eq!(leader.requests().len(), 2);
    }

    async fn local_server(id: u64, dir: &Path) -> (Server, Arc<LocalEngine>) {
        let listener = TcpNodeListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let info = ServerInfo::new(id, address);
        let engine = Arc::new(LocalEngine::new(info.clone(), dir));
        let mut server = Server::new(info, engine.clone(), ServerOptions::new());
        server.start(Arc::new(listener)).unwrap();
        (server, engine)
    }

    #[tokio::test]
    async fn test_join_and_leave_over_tcp() {
        let dir = tempfile::tempdir().unwrap();
        let (mut first, first_engine) = local_server(1, dir.path()).await;
        first_engine.bootstrap().await.unwrap();
        let (mut second, _) = local_server(2, dir.path()).await;

        let store: Arc<dyn ServerStore> =
            Arc::new(InMemoryServerStore::new(vec![first.info().clone()]));
        let cancel = CancellationToken::new();

        second.join(store.clone(), None, &cancel).await.unwrap();
        assert_eq!(first_engine.role(2).await, Some(NodeRole::Voter));
        assert_eq!(first.cluster().await.unwrap().len(), 2);
        assert_eq!(first.leader().await, Some(first.info().clone()));

        membership::leave(2, store, None, &cancel).await.unwrap();
        assert_eq!(first_engine.role(2).await, None);

        second.close().await.unwrap();
        first.close().await.unwrap();
        assert_eq!(first.cluster().await, Err(KsError::Stopped));
    }

    #[tokio::test]
    async fn test_dump_through_server() {
        let data = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        std::fs::write(data.path().join("app.db"), b"pages").unwrap();
        std::fs::write(data.path().join("app.db-wal"), b"frames").unwrap();

        let (mut server, _) = local_server(1, data.path()).await;
        server.dump("app.db", out.path()).await.unwrap();

        assert_eq!(std::fs::read(out.path().join("app.db")).unwrap(), b"pages");
        assert_eq!(std::fs::read(out.path().join("app.db-wal")).unwrap(), b"frames");
        server.close().await.unwrap();
    }
}
