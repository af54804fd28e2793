//! # RESP2 Command Encoding
//!
//! Purpose: Frame an outbound command as an array of bulk strings, ready for
//! in-order submission to the stream.
//!
//! ## Design Principles
//! 1. **Zero-Copy Payloads**: Raw byte arguments are emitted as their own
//!    chunk, sharing the caller's `Bytes` allocation.
//! 2. **Batched Framing**: Headers and text arguments are packed together
//!    into as few chunks as possible.
//! 3. **Byte-Accurate Lengths**: `$<len>` counts encoded UTF-8 bytes.

use bytes::{BufMut, Bytes, BytesMut};

use crate::value::Arg;

const CRLF: &[u8] = b"\r\n";

/// Encodes one command into wire chunks.
///
/// Concatenating the returned chunks yields
/// `*<argc>\r\n` followed by `$<len>\r\n<arg>\r\n` per argument.
pub fn encode_command(args: &[Arg]) -> Vec<Bytes> {
    let mut chunks = Vec::new();
    encode_command_into(args, &mut chunks);
    chunks
}

/// Appends the chunks of one command to `out`.
///
/// Used to pipeline several commands into a single write job.
pub fn encode_command_into(args: &[Arg], out: &mut Vec<Bytes>) {
    let mut head = BytesMut::with_capacity(64);
    head.put_u8(b'*');
    push_usize(&mut head, args.len());
    head.extend_from_slice(CRLF);

    for arg in args {
        head.put_u8(b'$');
        push_usize(&mut head, arg.len());
        head.extend_from_slice(CRLF);
        match arg {
            Arg::Text(text) => {
                head.extend_from_slice(text.as_bytes());
            }
            Arg::Bytes(data) if !data.is_empty() => {
                out.push(head.split().freeze());
                out.push(data.clone());
            }
            Arg::Bytes(_) => {}
        }
        head.extend_from_slice(CRLF);
    }

    out.push(head.freeze());
}

fn push_usize(out: &mut BytesMut, mut value: usize) {
    // Write digits into a small stack buffer to avoid heap allocations.
    let mut buf = [0u8; 20];
    let mut len = 0;
    if value == 0 {
        buf[0] = b'0';
        len = 1;
    } else {
        while value > 0 {
            buf[len] = b'0' + (value % 10) as u8;
            value /= 10;
            len += 1;
        }
    }
    buf[..len].reverse();
    out.extend_from_slice(&buf[..len]);
}
