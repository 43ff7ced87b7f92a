//! Async connections, dial functions and listeners for keelson.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use keelson_proto::{KsError, KsResult};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tracing::{debug, error};

/// A bidirectional byte stream between two nodes.
pub trait Stream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Stream for T {}

/// An owned connection. Ownership moves to whoever serves it.
pub type Conn = Box<dyn Stream>;

/// Future returned by a [`DialFn`].
pub type DialFuture = Pin<Box<dyn Future<Output = io::Result<Conn>> + Send>>;

/// Pluggable dial function: open a connection to `address`.
pub type DialFn = Arc<dyn Fn(String) -> DialFuture + Send + Sync>;

/// The default dial function: plain TCP with Nagle disabled.
pub fn tcp_dial() -> DialFn {
    Arc::new(|address: String| -> DialFuture {
        Box::pin(async move {
            let stream = connect_to(&address).await?;
            Ok(Box::new(stream) as Conn)
        })
    })
}

/// Connect to a remote node by address.
pub async fn connect_to(address: &str) -> io::Result<TcpStream> {
    debug!("connecting to {}", address);
    let stream = TcpStream::connect(address).await?;
    stream.set_nodelay(true).ok();
    Ok(stream)
}

/// A listening socket that hands out inbound connections.
///
/// `close` must make a pending or future `accept` fail, which is how the
/// owner of an accept loop tells it to stop.
#[async_trait]
pub trait Listener: Send + Sync + 'static {
    /// Accept the next inbound connection. Blocks (async) until one arrives
    /// or the listener is closed.
    async fn accept(&self) -> io::Result<Conn>;

    /// Close the listener. Closing twice is an error.
    fn close(&self) -> io::Result<()>;

    /// Address the listener is bound to.
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

/// TCP implementation of [`Listener`].
///
/// `close` releases the socket at once: a pending `accept` holds its own
/// handle only while it waits, and an accept loop busy elsewhere holds none.
pub struct TcpNodeListener {
    inner: Mutex<Option<Arc<TcpListener>>>,
    local_addr: Option<SocketAddr>,
    close_notify: Notify,
}

impl TcpNodeListener {
    /// Bind a TCP listener on `address` (`host:port`).
    pub async fn bind(address: &str) -> KsResult<Self> {
        let inner = TcpListener::bind(address).await.map_err(|e| {
            error!("failed to bind to {}: {}", address, e);
            KsError::SystemError
        })?;
        debug!("listening on {}", address);
        Ok(Self::from_listener(inner))
    }

    /// Wrap an already bound tokio listener.
    pub fn from_listener(inner: TcpListener) -> Self {
        Self {
            local_addr: inner.local_addr().ok(),
            inner: Mutex::new(Some(Arc::new(inner))),
            close_notify: Notify::new(),
        }
    }

    fn socket(&self) -> io::Result<Option<Arc<TcpListener>>> {
        let guard = self
            .inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "listener lock poisoned"))?;
        Ok(guard.clone())
    }
}

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "listener closed")
}

#[async_trait]
impl Listener for TcpNodeListener {
    async fn accept(&self) -> io::Result<Conn> {
        let socket = self.socket()?.ok_or_else(closed_error)?;
        tokio::select! {
            _ = self.close_notify.notified() => Err(closed_error()),
            result = socket.accept() => {
                let (stream, peer) = result?;
                debug!("accepted connection from {}", peer);
                stream.set_nodelay(true).ok();
                Ok(Box::new(stream) as Conn)
            }
        }
    }

    fn close(&self) -> io::Result<()> {
        let socket = self
            .inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "listener lock poisoned"))?
            .take();
        if socket.is_none() {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "listener already closed",
            ));
        }
        // notify_one stores a permit, so an accept that has not yet
        // registered interest still observes the close and drops its handle.
        self.close_notify.notify_one();
        Ok(())
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.local_addr.ok_or_else(closed_error)
    }
}
