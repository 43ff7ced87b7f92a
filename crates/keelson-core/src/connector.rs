//! Leader discovery with retry.
//!
//! A [`Connector`] reads candidate addresses from a [`ServerStore`], asks
//! each candidate who the leader is, and returns a [`Client`] connected to
//! the leader. Failed attempts are retried with the configured
//! [`RetryStrategy`] until one succeeds, the strategy's limit is reached, or
//! the caller's cancellation token fires.

use std::sync::Arc;
use std::time::Duration;

use keelson_proto::defaults::DEFAULT_ATTEMPT_TIMEOUT;
use keelson_proto::{KsError, KsResult};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::Client;
use crate::net::{tcp_dial, DialFn};
use crate::retry::RetryStrategy;
use crate::store::ServerStore;

/// Connector settings.
#[derive(Clone)]
pub struct Config {
    /// Function used to open connections.
    pub dial: DialFn,
    /// Budget for one dial or one request/response round trip.
    pub attempt_timeout: Duration,
    /// Backoff between failed connect attempts.
    pub retry: RetryStrategy,
}

impl Config {
    /// Default settings with a custom dial function.
    pub fn with_dial(dial: DialFn) -> Self {
        Self {
            dial,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            retry: RetryStrategy::default(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::with_dial(tcp_dial())
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("attempt_timeout", &self.attempt_timeout)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

/// Finds and connects to the current cluster leader.
pub struct Connector {
    /// ID of the server on whose behalf we connect (0 for tools).
    id: u64,
    store: Arc<dyn ServerStore>,
    config: Config,
}

impl Connector {
    pub fn new(id: u64, store: Arc<dyn ServerStore>, config: Config) -> Self {
        Self { id, store, config }
    }

    /// Connect to the leader, retrying until success, the retry limit, or
    /// cancellation.
    pub async fn connect(&self, cancel: &CancellationToken) -> KsResult<Client> {
        let mut attempt: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(KsError::Cancelled);
            }
            attempt += 1;

            let err = match self.connect_attempt(cancel).await {
                Ok(client) => {
                    info!(
                        "connector {}: connected to leader {} (attempt {})",
                        self.id,
                        client.address(),
                        attempt
                    );
                    return Ok(client);
                }
                Err(KsError::Cancelled) => return Err(KsError::Cancelled),
                Err(e) => e,
            };

            if !self.config.retry.should_retry(attempt) {
                warn!(
                    "connector {}: giving up after {} attempts: {}",
                    self.id, attempt, err
                );
                return Err(err);
            }

            let delay = self.config.retry.delay(attempt);
            debug!(
                "connector {}: attempt {} failed ({}), retrying in {:?}",
                self.id, attempt, err, delay
            );
            tokio::select! {
                _ = cancel.cancelled() => return Err(KsError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// One pass over the store. The store is re-read every time.
    async fn connect_attempt(&self, cancel: &CancellationToken) -> KsResult<Client> {
        let servers = self.store.get().await?;
        if servers.is_empty() {
            return Err(KsError::NoLeader);
        }

        let mut last_err = KsError::NoLeader;
        for server in &servers {
            match self.connect_via(&server.address, cancel).await {
                Ok(client) => return Ok(client),
                Err(KsError::Cancelled) => return Err(KsError::Cancelled),
                Err(e) => {
                    debug!(
                        "connector {}: no leader via {}: {}",
                        self.id, server.address, e
                    );
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }

    /// Ask `address` for the leader and follow one redirect.
    async fn connect_via(&self, address: &str, cancel: &CancellationToken) -> KsResult<Client> {
        let mut client = self.dial(address, cancel).await?;
        let leader = client.leader(cancel).await?.ok_or(KsError::NoLeader)?;
        if leader.address == address {
            return Ok(client);
        }
        drop(client);

        debug!(
            "connector {}: {} reports leader {}",
            self.id, address, leader
        );
        let mut client = self.dial(&leader.address, cancel).await?;
        match client.leader(cancel).await? {
            Some(l) if l.address == leader.address => Ok(client),
            _ => Err(KsError::NoLeader),
        }
    }

    async fn dial(&self, address: &str, cancel: &CancellationToken) -> KsResult<Client> {
        let dial = (self.config.dial)(address.to_string());
        let conn = tokio::select! {
            _ = cancel.cancelled() => return Err(KsError::Cancelled),
            result = tokio::time::timeout(self.config.attempt_timeout, dial) => {
                result.map_err(|_| KsError::Timeout)?.map_err(KsError::from)?
            }
        };
        Ok(Client::new(conn, address, self.config.attempt_timeout))
    }
}
