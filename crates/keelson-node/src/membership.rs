//! Membership changes, executed against the current leader.
//!
//! Joining is two calls on one leader connection: Add (the node enters the
//! cluster as a standby) followed by Promote (it becomes a voter). Leaving
//! is a single Remove. Nothing is rolled back if Promote fails; the node
//! simply stays a standby.

use std::sync::Arc;

use keelson_core::{tcp_dial, Client, Config, Connector, DialFn, RetryStrategy, ServerStore};
use keelson_proto::constants::KS_ANONYMOUS_ID;
use keelson_proto::defaults::{DEFAULT_ATTEMPT_TIMEOUT, DEFAULT_MESSAGE_CAPACITY, DEFAULT_RETRY_BASE};
use keelson_proto::{KsError, KsResult, Message, Response, ServerInfo};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Connector settings used for membership changes.
pub fn connector_config(dial: Option<DialFn>) -> Config {
    Config {
        dial: dial.unwrap_or_else(tcp_dial),
        attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        retry: RetryStrategy::binary_exponential(DEFAULT_RETRY_BASE),
    }
}

/// Add `info` to the cluster, then promote it to voter.
pub async fn join(
    info: &ServerInfo,
    store: Arc<dyn ServerStore>,
    dial: Option<DialFn>,
    cancel: &CancellationToken,
) -> KsResult<()> {
    let connector = Connector::new(KS_ANONYMOUS_ID, store, connector_config(dial));
    let mut client = connector.connect(cancel).await?;

    let mut request = Message::new();
    let mut response = Message::new();
    request.init(DEFAULT_MESSAGE_CAPACITY);
    response.init(DEFAULT_MESSAGE_CAPACITY);

    request.encode_add(info.id, &info.address)?;
    expect_empty(&mut client, &request, &mut response, cancel)
        .await
        .map_err(|e| {
            warn!("failed to add {} via {}: {}", info, client.address(), e);
            e
        })?;
    info!("server {} added to the cluster as standby", info);

    request.encode_promote(info.id)?;
    expect_empty(&mut client, &request, &mut response, cancel)
        .await
        .map_err(|e| {
            warn!("failed to promote {} via {}: {}", info.id, client.address(), e);
            e
        })?;
    info!("server {} promoted to voter", info.id);
    Ok(())
}

/// Remove server `id` from the cluster.
pub async fn leave(
    id: u64,
    store: Arc<dyn ServerStore>,
    dial: Option<DialFn>,
    cancel: &CancellationToken,
) -> KsResult<()> {
    let connector = Connector::new(KS_ANONYMOUS_ID, store, connector_config(dial));
    let mut client = connector.connect(cancel).await?;

    let mut request = Message::with_capacity(DEFAULT_MESSAGE_CAPACITY);
    let mut response = Message::with_capacity(DEFAULT_MESSAGE_CAPACITY);
    request.encode_remove(id)?;
    expect_empty(&mut client, &request, &mut response, cancel).await?;
    info!("server {} removed from the cluster", id);
    Ok(())
}

async fn expect_empty(
    client: &mut Client,
    request: &Message,
    response: &mut Message,
    cancel: &CancellationToken,
) -> KsResult<()> {
    match client.call(request, response, cancel).await? {
        Response::Empty => Ok(()),
        _ => Err(KsError::UnexpectedResponse),
    }
}
