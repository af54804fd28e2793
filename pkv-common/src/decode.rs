//! # Resumable RESP2 Decoder
//!
//! Purpose: Turn a reply stream that arrives in arbitrarily split chunks into
//! a sequence of complete values, without re-scanning work already done.
//!
//! ## Design Principles
//! 1. **State Machine**: `feed` never blocks. Each token parse yields a value,
//!    an "incomplete" signal, or a protocol error.
//! 2. **Explicit Resume Stack**: Partially filled arrays live on a frame
//!    stack, so nesting depth is not tied to the call stack and a resumed
//!    decode continues at the exact slot it stopped at.
//! 3. **Token Rewind**: An incomplete scalar token is rewound and re-read
//!    whole on the next chunk; completed array elements are never re-read.
//! 4. **Chunk Caching for Bulk Payloads**: Once a `$<len>` header is read,
//!    the payload bytes are cached chunk by chunk (no re-scan) and stitched
//!    together through the [`ReassemblyPool`] when the last byte arrives.
//!
//! ## States
//!
//! ```text
//! Idle ──feed──▶ Scanning ──value──▶ (emit) ──buffer drained──▶ Idle
//!                   │  ▲
//!        $len read, │  │ target length reached:
//!        bytes short▼  │ stitch, splice into resume stack
//!                LargePayload (chunks cached, nothing parsed)
//! ```

use std::sync::Arc;

use bytes::{Bytes, BytesMut};

use crate::error::{ProtocolError, ReplyError};
use crate::pool::ReassemblyPool;
use crate::value::RespValue;

/// Upper bound on slots pre-allocated from an array header.
///
/// Larger arrays still decode; their storage grows as elements arrive.
const MAX_PREALLOC: usize = 4096;

/// Array waiting for more elements.
#[derive(Debug)]
struct ArrayFrame {
    items: Vec<RespValue>,
    len: usize,
}

/// Outcome of scanning one token.
enum Token {
    Value(RespValue),
    /// Array header with a positive element count.
    Array(usize),
    /// Bulk header read but the payload runs past the buffer.
    PartialBulk { payload_start: usize, end: usize },
    Incomplete,
    Invalid(ProtocolError),
}

/// Outcome of one top-level decode attempt.
enum Step {
    Value(RespValue),
    Incomplete,
    Invalid(ProtocolError),
}

/// Streaming decoder for one connection.
///
/// The decoder owns all of its state except the reassembly pool, which may be
/// shared with other decoders.
pub struct RespDecoder {
    /// Undispatched input; `None` when idle or while caching a large payload.
    buffer: Option<Bytes>,
    /// Cursor into `buffer`, or the payload start within `chunks[0]` while a
    /// large payload is pending.
    offset: usize,
    /// End of the pending payload plus CRLF, measured from the start of
    /// `chunks[0]`. Zero when no payload is pending.
    big_len: usize,
    /// Total length of `chunks`.
    cached_len: usize,
    chunks: Vec<Bytes>,
    /// Innermost unfinished array last.
    stack: Vec<ArrayFrame>,
    pool: Arc<ReassemblyPool>,
}

impl RespDecoder {
    /// Creates a decoder that stitches split payloads through `pool`.
    pub fn new(pool: Arc<ReassemblyPool>) -> Self {
        RespDecoder {
            buffer: None,
            offset: 0,
            big_len: 0,
            cached_len: 0,
            chunks: Vec::new(),
            stack: Vec::new(),
            pool,
        }
    }

    /// Returns the reassembly pool used by this decoder.
    pub fn pool(&self) -> &Arc<ReassemblyPool> {
        &self.pool
    }

    /// True when no partial input, payload or array is held.
    pub fn is_idle(&self) -> bool {
        self.buffer.is_none() && self.big_len == 0 && self.stack.is_empty()
    }

    /// Number of arrays currently waiting for elements.
    pub fn resume_depth(&self) -> usize {
        self.stack.len()
    }

    /// Consumes one chunk, calling `emit` once per complete top-level value.
    ///
    /// Top-level `-` replies and malformed input are passed as `Err`. After a
    /// protocol error the rest of the buffered input is discarded; the next
    /// call starts fresh.
    pub fn feed<F>(&mut self, chunk: Bytes, mut emit: F)
    where
        F: FnMut(Result<RespValue, ReplyError>),
    {
        if chunk.is_empty() {
            return;
        }

        if self.big_len > 0 {
            if self.cached_len + chunk.len() < self.big_len {
                self.cached_len += chunk.len();
                self.chunks.push(chunk);
                return;
            }

            let payload = self.finish_large_payload(chunk);
            if let Some(value) = self.complete(RespValue::Bulk(payload)) {
                emit(Ok(value));
            }
        } else {
            let joined = match self.buffer.take() {
                None => chunk,
                Some(rest) => join(&rest[self.offset.min(rest.len())..], chunk),
            };
            self.buffer = Some(joined);
            self.offset = 0;
        }

        self.drain(&mut emit);
    }

    /// Feeds one chunk and collects everything it completes.
    pub fn decode(&mut self, chunk: Bytes) -> Vec<Result<RespValue, ReplyError>> {
        let mut out = Vec::new();
        self.feed(chunk, |reply| out.push(reply));
        out
    }

    /// Drops all partial state.
    pub fn reset(&mut self) {
        self.buffer = None;
        self.offset = 0;
        self.big_len = 0;
        self.cached_len = 0;
        self.chunks.clear();
        self.stack.clear();
    }

    fn drain<F>(&mut self, emit: &mut F)
    where
        F: FnMut(Result<RespValue, ReplyError>),
    {
        loop {
            match self.next_value() {
                Step::Value(RespValue::Error(message)) => emit(Err(ReplyError::Server(message))),
                Step::Value(value) => emit(Ok(value)),
                Step::Incomplete => break,
                Step::Invalid(err) => {
                    tracing::warn!(error = %err, "discarding reply buffer");
                    self.reset();
                    emit(Err(ReplyError::Protocol(err)));
                    return;
                }
            }
        }

        let drained = match &self.buffer {
            Some(buffer) => self.offset >= buffer.len(),
            None => false,
        };
        if drained {
            self.buffer = None;
            self.offset = 0;
        }
    }

    /// Decodes tokens until one top-level value completes or input runs out.
    fn next_value(&mut self) -> Step {
        loop {
            let Some(buffer) = self.buffer.as_ref() else {
                return Step::Incomplete;
            };
            let start = self.offset;
            if start >= buffer.len() {
                return Step::Incomplete;
            }

            let mut cursor = start + 1;
            let token = scan_token(buffer, start, &mut cursor);

            match token {
                Token::Value(value) => {
                    self.offset = cursor;
                    if let Some(done) = self.complete(value) {
                        return Step::Value(done);
                    }
                }
                Token::Array(len) => {
                    self.offset = cursor;
                    self.stack.push(ArrayFrame {
                        items: Vec::with_capacity(len.min(MAX_PREALLOC)),
                        len,
                    });
                }
                Token::PartialBulk { payload_start, end } => {
                    // Keep the header consumed; the payload bytes are cached
                    // as they arrive instead of being re-scanned.
                    self.offset = payload_start;
                    self.big_len = end;
                    if let Some(buffer) = self.buffer.take() {
                        self.cached_len = buffer.len();
                        self.chunks.push(buffer);
                    }
                    tracing::trace!(target_len = end, "caching split bulk payload");
                    return Step::Incomplete;
                }
                Token::Incomplete => {
                    self.offset = start;
                    return Step::Incomplete;
                }
                Token::Invalid(err) => return Step::Invalid(err),
            }
        }
    }

    /// Places a finished value into the innermost pending array, closing
    /// arrays as they fill. Returns the value once nothing encloses it.
    fn complete(&mut self, mut value: RespValue) -> Option<RespValue> {
        loop {
            let Some(frame) = self.stack.last_mut() else {
                return Some(value);
            };
            frame.items.push(value);
            if frame.items.len() < frame.len {
                return None;
            }
            let items = self.stack.pop().map(|frame| frame.items).unwrap_or_default();
            value = RespValue::Array(items);
        }
    }

    /// Stitches the cached chunks plus `last` into the pending payload and
    /// makes `last` the current buffer, positioned after the payload's CRLF.
    fn finish_large_payload(&mut self, last: Bytes) -> Bytes {
        let payload_len = self.big_len.saturating_sub(self.offset + 2);
        let tail = self.big_len - self.cached_len;

        let mut chunks = std::mem::take(&mut self.chunks);
        chunks.push(last.clone());

        let mut pieces: Vec<Bytes> = Vec::with_capacity(chunks.len());
        let mut remaining = payload_len;
        let mut skip = self.offset;
        for chunk in &chunks {
            if remaining == 0 {
                break;
            }
            let begin = skip.min(chunk.len());
            let take = (chunk.len() - begin).min(remaining);
            if take > 0 {
                pieces.push(chunk.slice(begin..begin + take));
            }
            remaining -= take;
            skip = 0;
        }

        let payload = match pieces.len() {
            0 => Bytes::new(),
            // Only the trailing CRLF spilled over; no stitching needed.
            1 => pieces.pop().unwrap_or_default(),
            _ => {
                let parts: Vec<&[u8]> = pieces.iter().map(|piece| piece.as_ref()).collect();
                self.pool.write(&parts)
            }
        };
        tracing::trace!(len = payload.len(), chunks = chunks.len(), "reassembled bulk payload");

        self.big_len = 0;
        self.cached_len = 0;
        self.buffer = Some(last);
        self.offset = tail;
        payload
    }
}

impl Default for RespDecoder {
    fn default() -> Self {
        Self::new(Arc::new(ReassemblyPool::new()))
    }
}

fn join(rest: &[u8], chunk: Bytes) -> Bytes {
    if rest.is_empty() {
        return chunk;
    }
    let mut joined = BytesMut::with_capacity(rest.len() + chunk.len());
    joined.extend_from_slice(rest);
    joined.extend_from_slice(&chunk);
    joined.freeze()
}

/// Scans the token whose type byte sits at `start`. `cursor` starts just past
/// the type byte and ends past the token when one is produced.
fn scan_token(buffer: &Bytes, start: usize, cursor: &mut usize) -> Token {
    match buffer[start] {
        b'+' => match read_line(buffer, cursor) {
            Some(line) => Token::Value(RespValue::Simple(line)),
            None => Token::Incomplete,
        },
        b'-' => match read_line(buffer, cursor) {
            Some(line) if line.is_empty() => Token::Value(RespValue::Error("Unknown error".to_string())),
            Some(line) => Token::Value(RespValue::Error(String::from_utf8_lossy(&line).into_owned())),
            None => Token::Incomplete,
        },
        b':' => match read_number(buffer, cursor) {
            Ok(Some(value)) => Token::Value(RespValue::Integer(value)),
            Ok(None) => Token::Incomplete,
            Err(err) => Token::Invalid(err),
        },
        b'$' => match read_number(buffer, cursor) {
            Ok(Some(len)) if len < 0 => Token::Value(RespValue::Null),
            Ok(Some(len)) => {
                let payload_start = *cursor;
                let end = payload_start.saturating_add(len as usize);
                if end.saturating_add(2) > buffer.len() {
                    return Token::PartialBulk { payload_start, end: end.saturating_add(2) };
                }
                *cursor = end + 2;
                Token::Value(RespValue::Bulk(buffer.slice(payload_start..end)))
            }
            Ok(None) => Token::Incomplete,
            Err(err) => Token::Invalid(err),
        },
        b'*' => match read_number(buffer, cursor) {
            Ok(Some(len)) if len < 0 => Token::Value(RespValue::Null),
            Ok(Some(0)) => Token::Value(RespValue::Array(Vec::new())),
            Ok(Some(len)) => Token::Array(len as usize),
            Ok(None) => Token::Incomplete,
            Err(err) => Token::Invalid(err),
        },
        other => Token::Invalid(ProtocolError::UnexpectedType {
            found: char::from(other),
            offset: start,
        }),
    }
}

/// Reads raw bytes up to CRLF. `None` when the terminator has not arrived.
fn read_line(buffer: &Bytes, cursor: &mut usize) -> Option<Bytes> {
    let start = *cursor;
    let last = buffer.len().checked_sub(1)?;
    let mut idx = start;
    while idx < last {
        if buffer[idx] == b'\r' {
            *cursor = idx + 2;
            return Some(buffer.slice(start..idx));
        }
        idx += 1;
    }
    None
}

/// Reads an optionally signed decimal up to CRLF.
///
/// `Ok(None)` means the terminator has not arrived yet, which is distinct
/// from both zero and a negative length.
fn read_number(buffer: &[u8], cursor: &mut usize) -> Result<Option<i64>, ProtocolError> {
    let Some(last) = buffer.len().checked_sub(1) else {
        return Ok(None);
    };
    let start = *cursor;
    let mut idx = start;
    let mut negative = false;
    if idx < last && buffer[idx] == b'-' {
        negative = true;
        idx += 1;
    }

    let mut value: i64 = 0;
    while idx < last {
        let b = buffer[idx];
        if b == b'\r' {
            *cursor = idx + 2;
            return Ok(Some(value));
        }
        if !b.is_ascii_digit() {
            return Err(ProtocolError::InvalidNumber {
                found: char::from(b),
                offset: idx,
            });
        }
        // Negatives accumulate downwards so `i64::MIN` is reachable.
        let digit = i64::from(b - b'0');
        value = value
            .checked_mul(10)
            .and_then(|value| {
                if negative {
                    value.checked_sub(digit)
                } else {
                    value.checked_add(digit)
                }
            })
            .ok_or(ProtocolError::NumberOverflow { offset: start })?;
        idx += 1;
    }
    Ok(None)
}
