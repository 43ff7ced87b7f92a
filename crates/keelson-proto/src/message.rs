/// Request/response types and the reusable message buffer.
///
/// Every exchange is one frame each way:
///   `u32 length prefix (big-endian) + bincode(Request)` from the caller,
///   `u32 length prefix (big-endian) + bincode(Response)` back.
///
/// A [`Message`] owns the frame payload. It is allocated once with
/// [`Message::init`] and reused, so a Join can send Add and Promote through
/// the same pair of buffers.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::defaults::DEFAULT_MAX_MESSAGE_SIZE;
use crate::error::{KsError, KsResult};
use crate::node::ServerInfo;

/// Requests understood by a node's engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    /// Ask which server the receiver believes is the leader.
    Leader,
    /// List all cluster members.
    Cluster,
    /// Add a new non-voting member.
    Add { id: u64, address: String },
    /// Turn an existing non-voting member into a voter.
    Promote { id: u64 },
    /// Remove a member from the cluster.
    Remove { id: u64 },
}

/// Responses sent back by a node's engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    /// The request succeeded and carries no payload.
    Empty,
    /// Current leader, if the receiver knows one.
    Leader(Option<ServerInfo>),
    /// Cluster member list.
    Servers(Vec<ServerInfo>),
    /// The request was rejected.
    Failure { code: u32, message: String },
}

impl Response {
    /// Build a failure response for the given error.
    pub fn failure(err: KsError) -> Self {
        Response::Failure {
            code: err.to_code(),
            message: err.to_string(),
        }
    }

    /// Turn a `Failure` back into the error it was raised with.
    pub fn into_result(self) -> KsResult<Response> {
        match self {
            Response::Failure { code, .. } => {
                Err(KsError::from_code(code).unwrap_or(KsError::Unknown))
            }
            other => Ok(other),
        }
    }
}

/// A reusable, pre-allocated frame buffer.
#[derive(Debug, Default)]
pub struct Message {
    buf: Vec<u8>,
    initialized: bool,
}

impl Message {
    /// Create an uninitialized message. Call [`Message::init`] before use.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a message and initialize it with `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        let mut msg = Self::new();
        msg.init(capacity);
        msg
    }

    /// Allocate the buffer. Any previous contents are discarded.
    pub fn init(&mut self, capacity: usize) {
        self.buf = Vec::with_capacity(capacity);
        self.initialized = true;
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Drop the contents while keeping the allocation.
    pub fn reset(&mut self) {
        self.buf.clear();
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    fn encode<T: Serialize>(&mut self, value: &T) -> KsResult<()> {
        if !self.initialized {
            return Err(KsError::MessageNotInitialized);
        }
        self.buf.clear();
        bincode::serialize_into(&mut self.buf, value).map_err(|_| {
            self.buf.clear();
            KsError::Encode
        })?;
        if self.buf.len() > DEFAULT_MAX_MESSAGE_SIZE {
            self.buf.clear();
            return Err(KsError::MessageTooLarge);
        }
        Ok(())
    }

    fn decode<'a, T: Deserialize<'a>>(&'a self) -> KsResult<T> {
        if !self.initialized {
            return Err(KsError::MessageNotInitialized);
        }
        bincode::deserialize(&self.buf).map_err(|_| KsError::Decode)
    }

    /// Encode an arbitrary request, overwriting the current contents.
    pub fn encode_request(&mut self, req: &Request) -> KsResult<()> {
        self.encode(req)
    }

    pub fn encode_leader(&mut self) -> KsResult<()> {
        self.encode(&Request::Leader)
    }

    pub fn encode_cluster(&mut self) -> KsResult<()> {
        self.encode(&Request::Cluster)
    }

    pub fn encode_add(&mut self, id: u64, address: &str) -> KsResult<()> {
        self.encode(&Request::Add {
            id,
            address: address.to_string(),
        })
    }

    pub fn encode_promote(&mut self, id: u64) -> KsResult<()> {
        self.encode(&Request::Promote { id })
    }

    pub fn encode_remove(&mut self, id: u64) -> KsResult<()> {
        self.encode(&Request::Remove { id })
    }

    pub fn encode_response(&mut self, resp: &Response) -> KsResult<()> {
        self.encode(resp)
    }

    pub fn decode_request(&self) -> KsResult<Request> {
        self.decode()
    }

    pub fn decode_response(&self) -> KsResult<Response> {
        self.decode()
    }

    /// Write the contents as one length-prefixed frame.
    pub async fn write_to<W>(&self, w: &mut W) -> KsResult<()>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        if !self.initialized {
            return Err(KsError::MessageNotInitialized);
        }
        w.write_u32(self.buf.len() as u32)
            .await
            .map_err(|_| KsError::NetworkError)?;
        w.write_all(&self.buf)
            .await
            .map_err(|_| KsError::NetworkError)?;
        w.flush().await.map_err(|_| KsError::NetworkError)?;
        Ok(())
    }

    /// Replace the contents with the next length-prefixed frame.
    pub async fn read_from<R>(&mut self, r: &mut R) -> KsResult<()>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        if !self.initialized {
            return Err(KsError::MessageNotInitialized);
        }
        let len = r.read_u32().await.map_err(|_| KsError::NetworkError)? as usize;
        if len > DEFAULT_MAX_MESSAGE_SIZE {
            return Err(KsError::MessageTooLarge);
        }
        self.buf.clear();
        self.buf.resize(len, 0);
        r.read_exact(&mut self.buf)
            .await
            .map_err(|_| KsError::NetworkError)?;
        Ok(())
    }
}
