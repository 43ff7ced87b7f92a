//! Shared utilities for keelctl.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use keelson_core::{Client, Config, Connector, InMemoryServerStore, ServerStore};
use keelson_proto::constants::KS_ANONYMOUS_ID;
use keelson_proto::KsResult;
use tokio_util::sync::CancellationToken;

/// What every subcommand needs: where the cluster is and how long to try.
pub struct Context {
    pub store: Arc<dyn ServerStore>,
    pub timeout: Duration,
    pub cancel: CancellationToken,
}

impl Context {
    pub fn new(addresses: &[String], timeout_secs: u64) -> Self {
        Self {
            store: Arc::new(InMemoryServerStore::from_addresses(addresses)),
            timeout: Duration::from_secs(timeout_secs),
            cancel: CancellationToken::new(),
        }
    }

    /// Connect to the current leader.
    pub async fn connect(&self) -> KsResult<Client> {
        let connector = Connector::new(KS_ANONYMOUS_ID, self.store.clone(), Config::default());
        connector.connect(&self.cancel).await
    }

    /// Run `op`, cancelling it once the timeout expires.
    pub async fn run<T, F>(&self, op: F) -> T
    where
        F: Future<Output = KsResult<T>>,
    {
        let cancel = self.cancel.clone();
        let timeout = self.timeout;
        let watchdog = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            cancel.cancel();
        });

        let result = op.await;
        watchdog.abort();
        match result {
            Ok(v) => v,
            Err(e) => exit_error(&e.to_string()),
        }
    }
}

/// Print an error message and exit.
pub fn exit_error(msg: &str) -> ! {
    eprintln!("Error: {}", msg);
    std::process::exit(1);
}
