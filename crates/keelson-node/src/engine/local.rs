//! Local (single-node) engine.
//!
//! Designed for development and testing. There is no replication: the
//! membership table lives in memory and every change is applied as soon as
//! the leader accepts it. Once bootstrapped the node is its own leader, so a
//! second node can join it through the regular membership protocol.

use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, RwLock as StdRwLock};

use async_trait::async_trait;
use keelson_core::Conn;
use keelson_proto::constants::KS_WAL_SUFFIX;
use keelson_proto::defaults::DEFAULT_MESSAGE_CAPACITY;
use keelson_proto::{KsError, KsResult, Message, NodeRole, NodeState, Request, Response, ServerInfo};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{Engine, WatchFn};
use crate::logging::{LogFn, LogLevel};

/// Internal state of the local engine.
struct LocalState {
    /// Members keyed by id, with the role each one holds.
    members: BTreeMap<u64, (ServerInfo, NodeRole)>,
    state: NodeState,
    stopped: bool,
}

struct Inner {
    info: ServerInfo,
    /// Directory holding the database files served by `dump`.
    dir: PathBuf,
    state: RwLock<LocalState>,
    log: StdRwLock<Option<LogFn>>,
    watch: StdRwLock<Option<WatchFn>>,
    /// Cancelled on close; every connection task watches a child token.
    shutdown: CancellationToken,
}

/// A single-node engine serving the membership protocol in-process.
pub struct LocalEngine {
    inner: Arc<Inner>,
}

impl LocalEngine {
    /// Create an engine for `info`, serving database files out of `dir`.
    ///
    /// The engine starts `Unavailable` with an empty membership; call
    /// [`bootstrap`](Self::bootstrap) to make it a one-member cluster.
    pub fn new(info: ServerInfo, dir: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(Inner {
                info,
                dir: dir.into(),
                state: RwLock::new(LocalState {
                    members: BTreeMap::new(),
                    state: NodeState::Unavailable,
                    stopped: false,
                }),
                log: StdRwLock::new(None),
                watch: StdRwLock::new(None),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Become the leader of a cluster whose only member is this node.
    pub async fn bootstrap(&self) -> KsResult<()> {
        let old = {
            let mut state = self.inner.state.write().await;
            if state.stopped {
                return Err(KsError::Stopped);
            }
            if !state.members.is_empty() {
                return Err(KsError::InvalidParms);
            }
            let info = self.inner.info.clone();
            state.members.insert(info.id, (info, NodeRole::Voter));
            std::mem::replace(&mut state.state, NodeState::Leader)
        };

        self.inner.log(
            LogLevel::Info,
            &format!("bootstrapped cluster with {}", self.inner.info),
        );
        self.inner.notify(old, NodeState::Leader);
        Ok(())
    }

    /// Role of member `id`, if it belongs to the cluster.
    pub async fn role(&self, id: u64) -> Option<NodeRole> {
        let state = self.inner.state.read().await;
        state.members.get(&id).map(|(_, role)| *role)
    }

    pub async fn state(&self) -> NodeState {
        self.inner.state.read().await.state
    }
}

impl Inner {
    fn log(&self, level: LogLevel, msg: &str) {
        let log = self.log.read().ok().and_then(|guard| guard.clone());
        if let Some(log) = log {
            log(level, msg);
        }
    }

    fn notify(&self, old: NodeState, new: NodeState) {
        if old == new {
            return;
        }
        let watch = self.watch.read().ok().and_then(|guard| guard.clone());
        if let Some(watch) = watch {
            watch(old, new);
        }
    }

    /// Serve requests on `conn` until the peer hangs up.
    async fn serve(&self, mut conn: Conn) -> KsResult<()> {
        let mut request = Message::with_capacity(DEFAULT_MESSAGE_CAPACITY);
        let mut response = Message::with_capacity(DEFAULT_MESSAGE_CAPACITY);

        loop {
            match request.read_from(&mut conn).await {
                Ok(()) => {}
                Err(KsError::NetworkError) => return Ok(()),
                Err(e) => return Err(e),
            }

            let reply = match request.decode_request() {
                Ok(req) => self.process(req).await,
                Err(e) => Response::failure(e),
            };
            response.encode_response(&reply)?;
            response.write_to(&mut conn).await?;
        }
    }

    async fn process(&self, request: Request) -> Response {
        match request {
            Request::Leader => Response::Leader(self.leader().await),
            Request::Cluster => {
                let state = self.state.read().await;
                Response::Servers(state.members.values().map(|(s, _)| s.clone()).collect())
            }
            Request::Add { id, address } => self.apply(|members| {
                if members.contains_key(&id) || members.values().any(|(s, _)| s.address == address) {
                    return Err(KsError::DuplicateId);
                }
                members.insert(id, (ServerInfo::new(id, address.clone()), NodeRole::Standby));
                Ok(format!("added {}@{} as standby", id, address))
            })
            .await,
            Request::Promote { id } => self.apply(|members| {
                let (_, role) = members.get_mut(&id).ok_or(KsError::NotFound)?;
                *role = NodeRole::Voter;
                Ok(format!("promoted {} to voter", id))
            })
            .await,
            Request::Remove { id } => self.apply(|members| {
                members.remove(&id).ok_or(KsError::NotFound)?;
                Ok(format!("removed {}", id))
            })
            .await,
        }
    }

    /// Apply a membership change. Only the leader accepts changes.
    async fn apply<F>(&self, change: F) -> Response
    where
        F: FnOnce(&mut BTreeMap<u64, (ServerInfo, NodeRole)>) -> KsResult<String>,
    {
        let result = {
            let mut state = self.state.write().await;
            if state.state != NodeState::Leader {
                Err(KsError::NotLeader)
            } else {
                change(&mut state.members)
            }
        };

        match result {
            Ok(msg) => {
                self.log(LogLevel::Info, &msg);
                Response::Empty
            }
            Err(e) => {
                self.log(LogLevel::Warn, &format!("membership change rejected: {}", e));
                Response::failure(e)
            }
        }
    }

    async fn leader(&self) -> Option<ServerInfo> {
        let state = self.state.read().await;
        (state.state == NodeState::Leader).then(|| self.info.clone())
    }
}

#[async_trait]
impl Engine for LocalEngine {
    fn name(&self) -> &str {
        "local"
    }

    async fn cluster(&self) -> KsResult<Vec<ServerInfo>> {
        let state = self.inner.state.read().await;
        if state.stopped {
            return Err(KsError::Stopped);
        }
        Ok(state.members.values().map(|(s, _)| s.clone()).collect())
    }

    async fn leader(&self) -> Option<ServerInfo> {
        self.inner.leader().await
    }

    async fn handle(&self, conn: Conn) -> KsResult<()> {
        if self.inner.state.read().await.stopped {
            return Err(KsError::Stopped);
        }

        let inner = self.inner.clone();
        let cancel = self.inner.shutdown.child_token();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => debug!("local engine: connection dropped on close"),
                result = inner.serve(conn) => {
                    if let Err(e) = result {
                        debug!("local engine: connection closed: {}", e);
                    }
                }
            }
        });
        Ok(())
    }

    async fn dump(&self, name: &str) -> KsResult<Vec<u8>> {
        let path = self.inner.dir.join(name);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                if name.ends_with(KS_WAL_SUFFIX) {
                    Ok(Vec::new())
                } else {
                    Err(KsError::NoDatabase)
                }
            }
            Err(e) => Err(KsError::from(e)),
        }
    }

    async fn close(&self) -> KsResult<()> {
        let old = {
            let mut state = self.inner.state.write().await;
            if state.stopped {
                return Ok(());
            }
            state.stopped = true;
            std::mem::replace(&mut state.state, NodeState::Unavailable)
        };

        self.inner.shutdown.cancel();
        self.inner.log(LogLevel::Info, &format!("stopped {}", self.inner.info));
        self.inner.notify(old, NodeState::Unavailable);
        Ok(())
    }

    fn set_log_fn(&self, log: LogFn) {
        if let Ok(mut guard) = self.inner.log.write() {
            *guard = Some(log);
        }
    }

    fn set_watch_fn(&self, watch: WatchFn) {
        if let Ok(mut guard) = self.inner.watch.write() {
            *guard = Some(watch);
        }
    }
}
