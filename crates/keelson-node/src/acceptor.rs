//! Connection acceptor.
//!
//! The accept loop runs in its own task: it accepts connections in order
//! and hands each one to the engine. When it stops, it reports exactly once
//! through a oneshot channel, which is what [`Server::close`](crate::Server::close)
//! waits on.

use std::sync::Arc;
use std::time::Duration;

use keelson_core::Listener;
use keelson_proto::{KsError, KsResult};
use tokio::sync::oneshot;
use tracing::{debug, error};

use crate::engine::Engine;
use crate::error::ServerError;

/// A running accept loop.
pub struct Acceptor {
    listener: Arc<dyn Listener>,
    done: oneshot::Receiver<KsResult<()>>,
}

impl Acceptor {
    /// Spawn the accept loop and return immediately.
    pub fn start(listener: Arc<dyn Listener>, engine: Arc<dyn Engine>) -> Self {
        let (done_tx, done) = oneshot::channel();
        let loop_listener = listener.clone();
        tokio::spawn(async move {
            let result = accept_loop(loop_listener, engine).await;
            // The receiver is gone if the server was dropped without closing.
            let _ = done_tx.send(result);
        });
        Self { listener, done }
    }

    /// Close the listener, which makes the loop's pending accept fail.
    pub fn close_listener(&self) -> std::io::Result<()> {
        self.listener.close()
    }

    /// Wait up to `timeout` for the loop to report how it ended.
    pub async fn wait(self, timeout: Duration) -> Result<(), ServerError> {
        match tokio::time::timeout(timeout, self.done).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(e))) => Err(ServerError::AcceptLoop(e)),
            // Sender dropped without reporting: the loop task panicked.
            Ok(Err(_)) => Err(ServerError::AcceptLoop(KsError::SystemError)),
            Err(_) => Err(ServerError::AcceptTimeout(timeout)),
        }
    }
}

async fn accept_loop(listener: Arc<dyn Listener>, engine: Arc<dyn Engine>) -> KsResult<()> {
    loop {
        let conn = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                // Listener closed: normal termination.
                debug!("accept loop: listener closed: {}", e);
                return Ok(());
            }
        };

        match engine.handle(conn).await {
            Ok(()) => {}
            Err(KsError::Stopped) => {
                debug!("accept loop: engine {} stopped", engine.name());
                return Ok(());
            }
            Err(e) => {
                error!("accept loop: engine {} failed to handle connection: {}", engine.name(), e);
                return Err(e);
            }
        }
    }
}
