//! # Connector Capability
//!
//! The client never opens sockets itself; it asks a `Connector` for a duplex
//! byte stream. `TcpConnector` covers plain TCP. TLS or in-memory transports
//! plug in through the same trait.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use crate::error::{ClientError, ClientResult};

/// Boxed future returned by connectors.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Any bidirectional async byte stream.
pub trait DuplexStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> DuplexStream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

/// Type-erased stream handed to the connection.
pub type BoxedStream = Box<dyn DuplexStream>;

/// Where to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub host: String,
    pub port: u16,
}

/// How to connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Negotiate a secure transport.
    pub secure_transport: bool,
    /// Keep the write side open after the peer ends its side.
    pub half_open: bool,
}

/// Produces duplex streams for the client.
pub trait Connector: Send + Sync + 'static {
    /// Opens a new stream to `target`.
    fn connect(&self, target: Target, options: ConnectOptions) -> BoxFuture<'static, ClientResult<BoxedStream>>;
}

/// Plain TCP connector.
#[derive(Debug, Clone, Default)]
pub struct TcpConnector {
    connect_timeout: Option<Duration>,
}

impl TcpConnector {
    pub fn new(connect_timeout: Option<Duration>) -> Self {
        TcpConnector { connect_timeout }
    }
}

impl Connector for TcpConnector {
    fn connect(&self, target: Target, options: ConnectOptions) -> BoxFuture<'static, ClientResult<BoxedStream>> {
        let timeout = self.connect_timeout;
        Box::pin(async move {
            if options.secure_transport {
                return Err(ClientError::Unsupported(
                    "secure transport needs a TLS-capable connector",
                ));
            }

            let connect = TcpStream::connect((target.host.as_str(), target.port));
            let stream = match timeout {
                Some(timeout) => tokio::time::timeout(timeout, connect)
                    .await
                    .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))??,
                None => connect.await?,
            };
            // Disable Nagle to keep request latency low for small payloads.
            stream.set_nodelay(true)?;

            let stream: BoxedStream = Box::new(stream);
            Ok(stream)
        })
    }
}
