//! Request/response client over a single connection.

use std::time::Duration;

use keelson_proto::defaults::DEFAULT_MESSAGE_CAPACITY;
use keelson_proto::{KsError, KsResult, Message, Response, ServerInfo};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::net::Conn;

/// A connection to a node, speaking the membership protocol.
///
/// Dropping the client closes the connection.
pub struct Client {
    conn: Conn,
    address: String,
    attempt_timeout: Duration,
}

impl Client {
    pub fn new(conn: Conn, address: impl Into<String>, attempt_timeout: Duration) -> Self {
        Self {
            conn,
            address: address.into(),
            attempt_timeout,
        }
    }

    /// Address this client is connected to.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Send `request` and read the reply into `response`.
    ///
    /// The round trip is bounded by the attempt timeout and by `cancel`.
    /// A `Failure` reply is returned as the error it carries.
    pub async fn call(
        &mut self,
        request: &Message,
        response: &mut Message,
        cancel: &CancellationToken,
    ) -> KsResult<Response> {
        let conn = &mut self.conn;
        let exchange = async move {
            request.write_to(conn).await?;
            response.read_from(conn).await?;
            response.decode_response()
        };

        let reply = tokio::select! {
            _ = cancel.cancelled() => return Err(KsError::Cancelled),
            result = tokio::time::timeout(self.attempt_timeout, exchange) => {
                result.map_err(|_| {
                    debug!("request to {} timed out", self.address);
                    KsError::Timeout
                })??
            }
        };
        reply.into_result()
    }

    /// Ask the remote node which server it considers the leader.
    pub async fn leader(&mut self, cancel: &CancellationToken) -> KsResult<Option<ServerInfo>> {
        let mut request = Message::with_capacity(DEFAULT_MESSAGE_CAPACITY);
        let mut response = Message::with_capacity(DEFAULT_MESSAGE_CAPACITY);
        request.encode_leader()?;
        match self.call(&request, &mut response, cancel).await? {
            Response::Leader(leader) => Ok(leader),
            _ => Err(KsError::UnexpectedResponse),
        }
    }

    /// Fetch the cluster member list from the remote node.
    pub async fn cluster(&mut self, cancel: &CancellationToken) -> KsResult<Vec<ServerInfo>> {
        let mut request = Message::with_capacity(DEFAULT_MESSAGE_CAPACITY);
        let mut response = Message::with_capacity(DEFAULT_MESSAGE_CAPACITY);
        request.encode_cluster()?;
        match self.call(&request, &mut response, cancel).await? {
            Response::Servers(servers) => Ok(servers),
            _ => Err(KsError::UnexpectedResponse),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keelson_proto::Request;
    use tokio::io::DuplexStream;

    /// Answer every request on `stream` with `reply(request)`.
    async fn serve(mut stream: DuplexStream, reply: fn(Request) -> Response) {
        let mut req = Message::with_capacity(DEFAULT_MESSAGE_CAPACITY);
        let mut resp = Message::with_capacity(DEFAULT_MESSAGE_CAPACITY);
        while req.read_from(&mut stream).await.is_ok() {
            let r = reply(req.decode_request().unwrap());
            resp.encode_response(&r).unwrap();
            if resp.write_to(&mut stream).await.is_err() {
                break;
            }
        }
    }

    fn client_for(stream: DuplexStream) -> Client {
        Client::new(Box::new(stream), "test", Duration::from_millis(200))
    }

    #[tokio::test]
    async fn test_call_success() {
        let (a, b) = tokio::io::duplex(4096);
        tokio::spawn(serve(b, |_| Response::Empty));

        let mut client = client_for(a);
        let mut request = Message::with_capacity(DEFAULT_MESSAGE_CAPACITY);
        let mut response = Message::with_capacity(DEFAULT_MESSAGE_CAPACITY);
        request.encode_remove(4).unwrap();

        let reply = client
            .call(&request, &mut response, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(reply, Response::Empty);
    }

    #[tokio::test]
    async fn test_remote_rejection_is_verbatim() {
        let (a, b) = tokio::io::duplex(4096);
        tokio::spawn(serve(b, |_| Response::failure(KsError::NotFound)));

        let mut client = client_for(a);
        let mut request = Message::with_capacity(DEFAULT_MESSAGE_CAPACITY);
        let mut response = Message::with_capacity(DEFAULT_MESSAGE_CAPACITY);
        request.encode_promote(4).unwrap();

        let result = client
            .call(&request, &mut response, &CancellationToken::new())
            .await;
        assert_eq!(result, Err(KsError::NotFound));
    }

    #[tokio::test]
    async fn test_call_times_out() {
        // Keep the peer end alive but never answer.
        let (a, _b) = tokio::io::duplex(4096);

        let mut client = client_for(a);
        let mut request = Message::with_capacity(DEFAULT_MESSAGE_CAPACITY);
        let mut response = Message::with_capacity(DEFAULT_MESSAGE_CAPACITY);
        request.encode_leader().unwrap();

        let result = client
            .call(&request, &mut response, &CancellationToken::new())
            .await;
        assert_eq!(result, Err(KsError::Timeout));
    }

    #[tokio::test]
    async fn test_call_cancelled() {
        let (a, _b) = tokio::io::duplex(4096);

        let mut client = client_for(a);
        let mut request = Message::with_capacity(DEFAULT_MESSAGE_CAPACITY);
        let mut response = Message::with_capacity(DEFAULT_MESSAGE_CAPACITY);
        request.encode_leader().unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = client.call(&request, &mut response, &cancel).await;
        assert_eq!(result, Err(KsError::Cancelled));
    }

    #[tokio::test]
    async fn test_leader_and_cluster_helpers() {
        let (a, b) = tokio::io::duplex(4096);
        tokio::spawn(serve(b, |req| match req {
            Request::Leader => Response::Leader(Some(ServerInfo::new(1, "n1:9000"))),
            Request::Cluster => Response::Servers(vec![
                ServerInfo::new(1, "n1:9000"),
                ServerInfo::new(2, "n2:9000"),
            ]),
            _ => Response::Empty,
        }));

        let mut client = client_for(a);
        let cancel = CancellationToken::new();
        assert_eq!(
            client.leader(&cancel).await.unwrap(),
            Some(ServerInfo::new(1, "n1:9000"))
        );
        assert_eq!(client.cluster(&cancel).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unexpected_response() {
        let (a, b) = tokio::io::duplex(4096);
        tokio::spawn(serve(b, |_| Response::Empty));

        let mut client = client_for(a);
        let result = client.leader(&CancellationToken::new()).await;
        assert_eq!(result, Err(KsError::UnexpectedResponse));
    }
}
