//! # Pipelined Connection
//!
//! Purpose: Run one duplex stream as a request/reply pipeline shared by any
//! number of concurrent callers.
//!
//! ## Design Principles
//! 1. **FIFO Matching**: Each submitted command pushes a oneshot slot to the
//!    tail of the queue; each decoded reply resolves the head.
//! 2. **Single Writer**: A dedicated task owns the write half and drains an
//!    unbounded channel in order, so wire order equals submission order.
//! 3. **Single Reader**: A dedicated task owns the read half and the decoder.
//! 4. **Uniform Teardown**: Stream end, stream error and explicit close all
//!    funnel into `Shared::close`, which rejects every pending slot once.
//!
//! ## Structure Overview
//!
//! ```text
//! submit ──▶ queue.push_back(slot) ──▶ writer channel ──▶ write task ──▶ stream
//!                                                                      │
//! slot.send(reply) ◀── queue.pop_front() ◀── decoder ◀── read task ◀──┘
//! ```

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use pkv_common::{encode_command_into, Arg, ReassemblyPool, ReplyError, RespDecoder, RespValue};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::config::ClientConfig;
use crate::connector::Connector;
use crate::error::{ClientError, ClientResult};
use crate::shrink::spawn_shrinker;

/// Lifecycle of a logical connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No stream has been requested yet (or the last one was discarded).
    Unconnected,
    /// Waiting for the connector.
    Connecting,
    /// Read and write tasks are running.
    Open,
    /// Pending requests are being rejected and tasks stopped.
    Closing,
    /// Terminal; a new connection is needed.
    Closed,
}

/// Receiver side of one pending reply.
pub(crate) type PendingReply = oneshot::Receiver<ClientResult<RespValue>>;

type ReplySlot = oneshot::Sender<ClientResult<RespValue>>;

struct Pending {
    slot: ReplySlot,
    // AUTH/SELECT sent ahead of a caller's command.
    handshake: bool,
}

struct Queue {
    slots: VecDeque<Pending>,
    closed: bool,
}

struct Shared {
    queue: Mutex<Queue>,
    state: Mutex<ConnectionState>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Shared {
    fn new() -> Self {
        Shared {
            queue: Mutex::new(Queue {
                slots: VecDeque::new(),
                closed: false,
            }),
            state: Mutex::new(ConnectionState::Connecting),
            tasks: Mutex::new(Vec::new()),
        }
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.lock() = state;
    }

    fn track(&self, task: JoinHandle<()>) {
        if self.queue.lock().closed {
            task.abort();
            return;
        }
        self.tasks.lock().push(task);
    }

    /// Resolves the oldest pending slot with `reply`.
    ///
    /// Returns the error the connection must close with: a protocol error,
    /// or any error answering a handshake command.
    fn resolve_next(&self, reply: Result<RespValue, ReplyError>) -> Option<ClientError> {
        let pending = self.queue.lock().slots.pop_front();
        match &reply {
            Ok(value) => tracing::debug!(reply = ?value, "received reply"),
            Err(err) => tracing::warn!(error = %err, "received error reply"),
        }
        let reply = reply.map_err(ClientError::from);

        let fatal = match (&reply, &pending) {
            (Err(err @ ClientError::Protocol(_)), _) => Some(err.clone()),
            (Err(err), Some(pending)) if pending.handshake => {
                tracing::warn!(error = %err, "handshake failed");
                Some(err.clone())
            }
            _ => None,
        };
        match pending {
            // The caller may have stopped waiting; the reply is dropped.
            Some(pending) => {
                let _ = pending.slot.send(reply);
            }
            None => tracing::warn!("reply arrived with no pending request"),
        }
        fatal
    }

    /// Rejects every pending slot and stops both tasks. Idempotent.
    fn close(&self, reason: Option<ClientError>) {
        let slots = {
            let mut queue = self.queue.lock();
            if queue.closed {
                return;
            }
            queue.closed = true;
            std::mem::take(&mut queue.slots)
        };
        self.set_state(ConnectionState::Closing);

        match &reason {
            Some(err) => tracing::info!(error = %err, pending = slots.len(), "closing connection"),
            None => tracing::debug!(pending = slots.len(), "closing connection"),
        }

        let reason = reason.unwrap_or(ClientError::ConnectionClosed);
        for pending in slots {
            let _ = pending.slot.send(Err(reason.clone()));
        }

        // Dropping the tasks' halves releases the stream in both directions.
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        self.set_state(ConnectionState::Closed);
    }
}

/// Handle to one open pipeline. Clones share the same stream.
#[derive(Clone)]
pub(crate) struct Connection {
    shared: Arc<Shared>,
    writer: mpsc::UnboundedSender<Vec<Bytes>>,
}

impl Connection {
    /// Connects through `connector` and starts the read and write tasks.
    pub(crate) async fn open(
        connector: &dyn Connector,
        config: &ClientConfig,
        pool: Arc<ReassemblyPool>,
    ) -> ClientResult<Self> {
        let shared = Arc::new(Shared::new());
        tracing::debug!(host = %config.host, port = config.port, tls = config.tls, "connecting");

        let stream = connector
            .connect(config.target(), config.connect_options())
            .await
            .map_err(|err| {
                tracing::warn!(error = %err, "connect failed");
                err
            })?;
        let (reader, writer) = tokio::io::split(stream);

        let (tx, rx) = mpsc::unbounded_channel();
        shared.set_state(ConnectionState::Open);
        shared.track(tokio::spawn(write_loop(rx, writer, shared.clone())));
        shared.track(tokio::spawn(read_loop(
            reader,
            RespDecoder::new(pool),
            shared.clone(),
            config.read_buffer_size.max(1),
        )));
        tracing::debug!(host = %config.host, port = config.port, "connection open");

        Ok(Connection { shared, writer: tx })
    }

    pub(crate) fn state(&self) -> ConnectionState {
        *self.shared.state.lock()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.shared.queue.lock().closed
    }

    /// Queues one reply slot per command and hands the encoded commands to
    /// the writer as a single job. The first `handshake` commands are
    /// handshake commands; an error reply to any of them closes the
    /// connection.
    pub(crate) fn submit(&self, commands: &[Vec<Arg>], handshake: usize) -> ClientResult<Vec<PendingReply>> {
        let mut chunks = Vec::new();
        let mut replies = Vec::with_capacity(commands.len());

        let mut queue = self.shared.queue.lock();
        if queue.closed {
            return Err(ClientError::ConnectionClosed);
        }
        for (index, args) in commands.iter().enumerate() {
            let (slot, reply) = oneshot::channel();
            queue.slots.push_back(Pending {
                slot,
                handshake: index < handshake,
            });
            replies.push(reply);
            encode_command_into(args, &mut chunks);
        }

        // Sent under the queue lock so slot order and write order agree.
        if self.writer.send(chunks).is_err() {
            let keep = queue.slots.len() - commands.len();
            queue.slots.truncate(keep);
            return Err(ClientError::ConnectionClosed);
        }
        Ok(replies)
    }

    /// Closes the pipeline, rejecting pending requests with `reason`.
    pub(crate) fn close(&self, reason: Option<ClientError>) {
        self.shared.close(reason);
    }
}

async fn write_loop<W>(mut rx: mpsc::UnboundedReceiver<Vec<Bytes>>, mut writer: W, shared: Arc<Shared>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(job) = rx.recv().await {
        let mut result = write_chunks(&mut writer, &job).await;
        // Drain whatever queued up meanwhile, then flush once.
        while result.is_ok() {
            match rx.try_recv() {
                Ok(job) => result = write_chunks(&mut writer, &job).await,
                Err(_) => break,
            }
        }
        if let Ok(()) = result {
            result = writer.flush().await;
        }

        if let Err(err) = result {
            tracing::warn!(error = %err, "stream write failed");
            shared.close(Some(err.into()));
            return;
        }
    }
}

async fn write_chunks<W>(writer: &mut W, chunks: &[Bytes]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    for chunk in chunks {
        writer.write_all(chunk).await?;
    }
    Ok(())
}

async fn read_loop<R>(mut reader: R, mut decoder: RespDecoder, shared: Arc<Shared>, buffer_size: usize)
where
    R: AsyncRead + Unpin,
{
    let mut buffer = BytesMut::with_capacity(buffer_size);

    let reason = loop {
        buffer.reserve(buffer_size);
        match reader.read_buf(&mut buffer).await {
            Ok(0) => {
                tracing::debug!("stream reached end of input");
                break None;
            }
            Ok(bytes) => {
                tracing::trace!(bytes, "received chunk");
                let chunk = buffer.split().freeze();
                let mut fatal = None;
                decoder.feed(chunk, |reply| {
                    if let Some(err) = shared.resolve_next(reply) {
                        fatal.get_or_insert(err);
                    }
                });
                if decoder.pool().take_arm_request() {
                    spawn_shrinker(decoder.pool().clone());
                }
                if let Some(err) = fatal {
                    break Some(err);
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "stream read failed");
                break Some(ClientError::from(err));
            }
        }
    };

    shared.close(reason);
}
