//! Error types for the async client.

use std::io;
use std::sync::Arc;

use pkv_common::{ProtocolError, ReplyError};
use thiserror::Error;

/// Result type for the async client.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced by the async client.
///
/// `Clone` so a single close reason can reject every pending request.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// Network or IO failure while connecting, reading or writing.
    #[error("io error: {0}")]
    Io(Arc<io::Error>),

    /// Malformed bytes in the reply stream.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Server returned an error reply.
    #[error("server error: {0}")]
    Server(String),

    /// Connection closed before the reply arrived.
    #[error("connection closed")]
    ConnectionClosed,

    /// Connection URL could not be parsed.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// The connector cannot satisfy the requested options.
    #[error("unsupported: {0}")]
    Unsupported(&'static str),
}

impl ClientError {
    /// True for an application-level error reply. These fail one request and
    /// leave the connection usable.
    pub fn is_server(&self) -> bool {
        matches!(self, ClientError::Server(_))
    }
}

impl From<io::Error> for ClientError {
    fn from(err: io::Error) -> Self {
        ClientError::Io(Arc::new(err))
    }
}

impl From<ReplyError> for ClientError {
    fn from(err: ReplyError) -> Self {
        match err {
            ReplyError::Server(message) => ClientError::Server(message),
            ReplyError::Protocol(err) => ClientError::Protocol(err),
        }
    }
}
