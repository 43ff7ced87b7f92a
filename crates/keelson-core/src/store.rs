//! Stores of candidate server addresses used for leader discovery.
//!
//! The connector only ever reads from a store, and re-reads it on every
//! connect attempt so that updates made while it is retrying are seen.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use keelson_proto::{KsError, KsResult, ServerInfo};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, error};

/// Source of candidate addresses for leader discovery.
#[async_trait]
pub trait ServerStore: Send + Sync {
    /// Return the current list of known servers.
    async fn get(&self) -> KsResult<Vec<ServerInfo>>;

    /// Replace the list of known servers.
    async fn set(&self, servers: Vec<ServerInfo>) -> KsResult<()>;
}

/// A store that keeps the server list in memory.
#[derive(Debug, Default)]
pub struct InMemoryServerStore {
    servers: RwLock<Vec<ServerInfo>>,
}

impl InMemoryServerStore {
    pub fn new(servers: Vec<ServerInfo>) -> Self {
        Self {
            servers: RwLock::new(servers),
        }
    }

    /// Build a store from bare addresses. IDs are unknown and left at zero.
    pub fn from_addresses<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            addresses
                .into_iter()
                .map(|a| ServerInfo::new(0, a))
                .collect(),
        )
    }
}

#[async_trait]
impl ServerStore for InMemoryServerStore {
    async fn get(&self) -> KsResult<Vec<ServerInfo>> {
        Ok(self.servers.read().await.clone())
    }

    async fn set(&self, servers: Vec<ServerInfo>) -> KsResult<()> {
        *self.servers.write().await = servers;
        Ok(())
    }
}

/// A store persisted as a YAML list of `{id, address}` entries.
///
/// The file is read once on open; `set` rewrites it through a temporary
/// file and a rename.
#[derive(Debug)]
pub struct YamlServerStore {
    path: PathBuf,
    servers: RwLock<Vec<ServerInfo>>,
}

impl YamlServerStore {
    /// Open the store at `path`. A missing file yields an empty store.
    pub async fn open(path: impl AsRef<Path>) -> KsResult<Self> {
        let path = path.as_ref().to_path_buf();
        let servers = if fs::try_exists(&path).await.unwrap_or(false) {
            let data = fs::read_to_string(&path).await.map_err(|e| {
                error!("failed to read server store {}: {}", path.display(), e);
                KsError::Eio
            })?;
            if data.trim().is_empty() {
                Vec::new()
            } else {
                serde_yaml::from_str(&data).map_err(|e| {
                    error!("corrupt server store {}: {}", path.display(), e);
                    KsError::Decode
                })?
            }
        } else {
            Vec::new()
        };
        debug!("opened server store {} ({} servers)", path.display(), servers.len());
        Ok(Self {
            path,
            servers: RwLock::new(servers),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ServerStore for YamlServerStore {
    async fn get(&self) -> KsResult<Vec<ServerInfo>> {
        Ok(self.servers.read().await.clone())
    }

    async fn set(&self, servers: Vec<ServerInfo>) -> KsResult<()> {
        let mut guard = self.servers.write().await;
        let data = serde_yaml::to_string(&servers).map_err(|_| KsError::Encode)?;

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, data.as_bytes()).await.map_err(|e| {
            error!("failed to write server store {}: {}", tmp.display(), e);
            KsError::Eio
        })?;
        fs::rename(&tmp, &self.path).await.map_err(|e| {
            error!("failed to replace server store {}: {}", self.path.display(), e);
            KsError::Eio
        })?;

        *guard = servers;
        Ok(())
    }
}
