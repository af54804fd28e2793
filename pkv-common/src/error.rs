//! # Protocol Errors
//!
//! Errors surfaced by the frame decoder. Both kinds are reported per value
//! and never invalidate the decoder itself.

use thiserror::Error;

/// Malformed input detected while decoding a reply stream.
///
/// The decoder discards the rest of the current input when it reports one of
/// these, then accepts fresh input on the next `feed`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// First byte of a token is not one of `+ - : $ *`.
    #[error("unexpected type byte {found:?} at offset {offset}")]
    UnexpectedType { found: char, offset: usize },
    /// A length or integer token contained a non-digit byte.
    #[error("invalid digit {found:?} in number at offset {offset}")]
    InvalidNumber { found: char, offset: usize },
    /// A length or integer token does not fit in an `i64`.
    #[error("number starting at offset {offset} overflows i64")]
    NumberOverflow { offset: usize },
}

/// A failure reported through the decoder's error path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplyError {
    /// Top-level `-` reply sent by the server.
    #[error("{0}")]
    Server(String),
    /// Malformed bytes on the wire.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}
