//! In-process fakes shared by the node tests.

use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use keelson_core::net::DialFuture;
use keelson_core::{Conn, DialFn, Listener};
use keelson_proto::defaults::DEFAULT_MESSAGE_CAPACITY;
use keelson_proto::{KsError, KsResult, Message, Request, Response, ServerInfo};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio_util::sync::CancellationToken;

use crate::engine::{Engine, WatchFn};
use crate::logging::LogFn;

/// A listener fed through a channel. Closing makes `accept` fail.
pub(crate) struct FakeListener {
    conns: AsyncMutex<mpsc::UnboundedReceiver<Conn>>,
    closed: CancellationToken,
    fail_close: bool,
}

impl FakeListener {
    pub(crate) fn new() -> (Arc<Self>, mpsc::UnboundedSender<Conn>) {
        Self::build(false)
    }

    /// A listener whose `close` always fails.
    pub(crate) fn failing_close() -> (Arc<Self>, mpsc::UnboundedSender<Conn>) {
        Self::build(true)
    }

    fn build(fail_close: bool) -> (Arc<Self>, mpsc::UnboundedSender<Conn>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let listener = Arc::new(Self {
            conns: AsyncMutex::new(rx),
            closed: CancellationToken::new(),
            fail_close,
        });
        (listener, tx)
    }
}

#[async_trait]
impl Listener for FakeListener {
    async fn accept(&self) -> io::Result<Conn> {
        let mut conns = self.conns.lock().await;
        tokio::select! {
            _ = self.closed.cancelled() => Err(io::Error::new(io::ErrorKind::NotConnected, "closed")),
            conn = conns.recv() => conn.ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "no more connections")),
        }
    }

    fn close(&self) -> io::Result<()> {
        if self.fail_close {
            return Err(io::Error::new(io::ErrorKind::Other, "close failed"));
        }
        if self.closed.is_cancelled() {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "already closed"));
        }
        self.closed.cancel();
        Ok(())
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(SocketAddr::from(([127, 0, 0, 1], 0)))
    }
}

/// What [`FakeEngine::handle`] does with a connection.
pub(crate) enum HandleMode {
    /// Read a one-byte tag from the connection and record it.
    RecordTag,
    /// Sleep before returning.
    Block(Duration),
    /// Fail with the given error.
    Fail(KsError),
}

pub(crate) struct FakeEngine {
    mode: HandleMode,
    close_result: KsResult<()>,
    pub(crate) tags: Mutex<Vec<u8>>,
    pub(crate) closed: AtomicBool,
    pub(crate) dumps: Mutex<Vec<String>>,
    /// Names for which `dump` fails.
    pub(crate) dump_failures: Vec<String>,
    pub(crate) log_set: AtomicBool,
}

impl FakeEngine {
    pub(crate) fn new(mode: HandleMode) -> Self {
        Self {
            mode,
            close_result: Ok(()),
            tags: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            dumps: Mutex::new(Vec::new()),
            dump_failures: Vec::new(),
            log_set: AtomicBool::new(false),
        }
    }

    pub(crate) fn with_close_result(mut self, result: KsResult<()>) -> Self {
        self.close_result = result;
        self
    }

    pub(crate) fn with_dump_failure(mut self, name: &str) -> Self {
        self.dump_failures.push(name.to_string());
        self
    }
}

#[async_trait]
impl Engine for FakeEngine {
    fn name(&self) -> &str {
        "fake"
    }

    async fn cluster(&self) -> KsResult<Vec<ServerInfo>> {
        Ok(Vec::new())
    }

    async fn leader(&self) -> Option<ServerInfo> {
        None
    }

    async fn handle(&self, mut conn: Conn) -> KsResult<()> {
        match &self.mode {
            HandleMode::RecordTag => {
                let tag = conn.read_u8().await.map_err(KsError::from)?;
                self.tags.lock().unwrap().push(tag);
                Ok(())
            }
            HandleMode::Block(d) => {
                tokio::time::sleep(*d).await;
                Ok(())
            }
            HandleMode::Fail(e) => Err(*e),
        }
    }

    async fn dump(&self, name: &str) -> KsResult<Vec<u8>> {
        if self.dump_failures.iter().any(|n| n == name) {
            return Err(KsError::Eio);
        }
        self.dumps.lock().unwrap().push(name.to_string());
        Ok(format!("content of {}", name).into_bytes())
    }

    async fn close(&self) -> KsResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.close_result
    }

    fn set_log_fn(&self, _log: LogFn) {
        self.log_set.store(true, Ordering::SeqCst);
    }

    fn set_watch_fn(&self, _watch: WatchFn) {}
}

/// Open an in-process connection whose server end starts with `tag`.
pub(crate) async fn tagged_conn(tag: u8) -> (Conn, Conn) {
    let (mut client, server) = tokio::io::duplex(64);
    client.write_u8(tag).await.unwrap();
    (Box::new(client), Box::new(server))
}

/// A fake leader reachable through a dial function.
///
/// It answers `Leader` with itself and records every membership request.
/// Requests listed in `reject` are answered with the paired error.
pub(crate) struct FakeLeader {
    pub(crate) info: ServerInfo,
    pub(crate) requests: Mutex<Vec<Request>>,
    reject: Mutex<VecDeque<(Request, KsError)>>,
}

impl FakeLeader {
    pub(crate) fn new(info: ServerInfo) -> Arc<Self> {
        Arc::new(Self {
            info,
            requests: Mutex::new(Vec::new()),
            reject: Mutex::new(VecDeque::new()),
        })
    }

    pub(crate) fn reject(&self, request: Request, err: KsError) {
        self.reject.lock().unwrap().push_back((request, err));
    }

    pub(crate) fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn dial_fn(self: &Arc<Self>) -> DialFn {
        let leader = self.clone();
        Arc::new(move |address: String| -> DialFuture {
            let leader = leader.clone();
            Box::pin(async move {
                if address != leader.info.address {
                    return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"));
                }
                let (client, server) = tokio::io::duplex(64 * 1024);
                tokio::spawn(async move { leader.serve(Box::new(server)).await });
                Ok(Box::new(client) as Conn)
            })
        })
    }

    async fn serve(&self, mut conn: Conn) {
        let mut request = Message::with_capacity(DEFAULT_MESSAGE_CAPACITY);
        let mut response = Message::with_capacity(DEFAULT_MESSAGE_CAPACITY);
        while request.read_from(&mut conn).await.is_ok() {
            let reply = match request.decode_request() {
                Ok(Request::Leader) => Response::Leader(Some(self.info.clone())),
                Ok(req) => self.record(req),
                Err(e) => Response::failure(e),
            };
            if response.encode_response(&reply).is_err() || response.write_to(&mut conn).await.is_err() {
                return;
            }
        }
    }

    fn record(&self, req: Request) -> Response {
        self.requests.lock().unwrap().push(req.clone());
        let mut reject = self.reject.lock().unwrap();
        match reject.iter().position(|(r, _)| *r == req) {
            Some(i) => {
                let (_, err) = reject.remove(i).unwrap_or((req, KsError::Unknown));
                Response::failure(err)
            }
            None => Response::Empty,
        }
    }
}
