//! # Async Client API
//!
//! Purpose: Expose "send a command, get a reply" over a lazily established,
//! pipelined connection.
//!
//! ## Design Principles
//! 1. **Facade Pattern**: `KVClient` hides connecting, the handshake and
//!    reconnecting after a close.
//! 2. **Ordered Submission**: The link lock is held only while queueing, so
//!    lock order is submission order and callers await replies concurrently.
//! 3. **Fail the Connection, Not the Client**: Transport and protocol
//!    failures close the current connection; the next `send` reconnects.

use std::sync::Arc;

use pkv_common::{Arg, ReassemblyPool, RespValue, TextValue};
use tokio::sync::Mutex;

use crate::config::ClientConfig;
use crate::connection::{Connection, ConnectionState, PendingReply};
use crate::connector::{Connector, TcpConnector};
use crate::error::{ClientError, ClientResult};

/// One command: a verb followed by its arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    args: Vec<Arg>,
}

impl Command {
    pub fn new(verb: impl Into<Arg>) -> Self {
        Command {
            args: vec![verb.into()],
        }
    }

    /// Appends one argument.
    pub fn arg(mut self, arg: impl Into<Arg>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends every argument yielded by `args`.
    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<Arg>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn as_args(&self) -> &[Arg] {
        &self.args
    }
}

impl From<Vec<Arg>> for Command {
    fn from(args: Vec<Arg>) -> Self {
        Command { args }
    }
}

struct Link {
    conn: Connection,
    handshake_sent: bool,
}

/// Pipelined client over one logical connection.
///
/// Concurrent `send` calls share the connection; replies come back in the
/// order the calls queued their commands.
pub struct KVClient {
    config: ClientConfig,
    connector: Arc<dyn Connector>,
    pool: Arc<ReassemblyPool>,
    link: Mutex<Option<Link>>,
}

impl KVClient {
    /// Creates a client that connects over plain TCP.
    pub fn new(config: ClientConfig) -> Self {
        let connector = TcpConnector::new(config.connect_timeout());
        Self::with_connector(config, Arc::new(connector))
    }

    /// Creates a TCP client from a `redis://` or `rediss://` URL.
    pub fn from_url(url: &str) -> ClientResult<Self> {
        Ok(Self::new(ClientConfig::from_url(url)?))
    }

    /// Creates a client that obtains streams from `connector`.
    pub fn with_connector(config: ClientConfig, connector: Arc<dyn Connector>) -> Self {
        KVClient {
            config,
            connector,
            pool: Arc::new(ReassemblyPool::new()),
            link: Mutex::new(None),
        }
    }

    /// Uses `pool` for reassembling large replies instead of a private pool.
    pub fn with_pool(mut self, pool: Arc<ReassemblyPool>) -> Self {
        self.pool = pool;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn pool(&self) -> &Arc<ReassemblyPool> {
        &self.pool
    }

    /// Sends `command` and returns the reply with payloads decoded as text.
    pub async fn send(&self, command: Command) -> ClientResult<TextValue> {
        self.send_raw(command).await.map(RespValue::into_text)
    }

    /// Sends `command` and returns the reply as decoded.
    pub async fn send_raw(&self, command: Command) -> ClientResult<RespValue> {
        let (conn, handshake, replies) = self.submit(command).await?;

        // The first failure wins; otherwise the caller gets its own reply.
        let mut outcome = None;
        for (index, reply) in replies.into_iter().enumerate() {
            let result = match reply.await {
                Ok(result) => result,
                // Slot dropped without an answer: the connection went away.
                Err(_) => Err(ClientError::ConnectionClosed),
            };

            // Handshake failures are closed by the connection itself.
            if let Err(err) = &result {
                if index >= handshake && !err.is_server() {
                    conn.close(Some(err.clone()));
                }
            }
            if !matches!(outcome, Some(Err(_))) {
                outcome = Some(result);
            }
        }
        outcome.unwrap_or(Err(ClientError::ConnectionClosed))
    }

    /// Opens a connection, sends `command`, then closes the connection.
    pub async fn send_once(&self, command: Command) -> ClientResult<TextValue> {
        self.send_once_raw(command).await.map(RespValue::into_text)
    }

    /// Raw variant of [`KVClient::send_once`].
    pub async fn send_once_raw(&self, command: Command) -> ClientResult<RespValue> {
        let result = self.send_raw(command).await;
        self.close().await;
        result
    }

    /// Closes the current connection, rejecting everything still pending.
    /// A later `send` reconnects.
    pub async fn close(&self) {
        if let Some(link) = self.link.lock().await.take() {
            link.conn.close(None);
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.state().await == ConnectionState::Open
    }

    pub async fn state(&self) -> ConnectionState {
        match self.link.lock().await.as_ref() {
            Some(link) => link.conn.state(),
            None => ConnectionState::Unconnected,
        }
    }

    /// Queues the handshake (first use only) and `command` on the current
    /// connection, connecting first when needed.
    async fn submit(&self, command: Command) -> ClientResult<(Connection, usize, Vec<PendingReply>)> {
        let mut current = self.link.lock().await;

        let reusable = current.as_ref().map_or(false, |link| !link.conn.is_closed());
        if !reusable {
            let conn = Connection::open(self.connector.as_ref(), &self.config, self.pool.clone()).await?;
            *current = Some(Link {
                conn,
                handshake_sent: false,
            });
        }
        let Some(link) = current.as_mut() else {
            return Err(ClientError::ConnectionClosed);
        };

        let mut commands = Vec::new();
        if !link.handshake_sent {
            commands = self.config.handshake_commands();
            if !commands.is_empty() {
                tracing::debug!(commands = commands.len(), "sending handshake");
            }
            link.handshake_sent = true;
        }
        let handshake = commands.len();

        tracing::debug!(args = ?command.as_args(), "sending command");
        commands.push(command.args);
        let replies = link.conn.submit(&commands, handshake)?;
        Ok((link.conn.clone(), handshake, replies))
    }
}

impl Drop for KVClient {
    fn drop(&mut self) {
        if let Some(link) = self.link.get_mut().take() {
            link.conn.close(None);
        }
    }
}
