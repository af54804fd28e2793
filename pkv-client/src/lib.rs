//! # PipeKV Async Client
//!
//! Purpose: Provide a pipelined, Redis-compatible client over any duplex byte
//! stream, matching concurrently issued commands to their replies.
//!
//! ## Design Principles
//! 1. **Facade Pattern**: `KVClient` hides connection lifecycle and protocol details.
//! 2. **Actor-Owned Writes**: One writer task owns the write half, so wire
//!    order is submission order by construction.
//! 3. **FIFO Matching**: Replies resolve pending requests strictly in order.
//! 4. **Pluggable Transport**: The byte stream comes from a `Connector`.

mod client;
mod config;
mod connection;
mod connector;
mod error;
mod shrink;

pub use client::{Command, KVClient};
pub use config::{ClientConfig, DEFAULT_PORT, DEFAULT_READ_BUFFER_SIZE};
pub use connection::ConnectionState;
pub use connector::{BoxFuture, BoxedStream, ConnectOptions, Connector, DuplexStream, Target, TcpConnector};
pub use error::{ClientError, ClientResult};
pub use shrink::spawn_shrinker;

pub use pkv_common::{Arg, ReassemblyPool, RespValue, TextValue};
