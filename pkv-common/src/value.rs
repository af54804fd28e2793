//! # RESP2 Values
//!
//! Purpose: Model decoded replies and outbound command arguments.
//!
//! ## Design Principles
//! 1. **Binary-Safe**: Payloads stay as raw bytes; text decoding is opt-in.
//! 2. **Cheap Sharing**: `Bytes` lets decoded payloads slice the read buffer
//!    instead of copying it.
//! 3. **Unbounded Nesting**: Arrays hold values of any shape, arrays included.

use std::fmt;

use bytes::Bytes;

/// Decoded RESP2 reply value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// +OK or +PONG style responses.
    Simple(Bytes),
    /// $... bulk strings.
    Bulk(Bytes),
    /// :123 responses.
    Integer(i64),
    /// -ERR ... responses nested inside an array.
    ///
    /// A top-level error reply is reported through the decoder's error path
    /// instead of as a value.
    Error(String),
    /// `$-1` and `*-1`.
    Null,
    /// *... arrays.
    Array(Vec<RespValue>),
}

impl RespValue {
    /// Returns the payload of a simple or bulk string.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            RespValue::Simple(data) | RespValue::Bulk(data) => Some(data),
            _ => None,
        }
    }

    /// Returns true for `$-1` / `*-1`.
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, RespValue::Null)
    }

    /// Converts the value into its text form, decoding byte payloads as
    /// UTF-8 (lossy) and mapping arrays element by element.
    pub fn into_text(self) -> TextValue {
        match self {
            RespValue::Simple(data) | RespValue::Bulk(data) => {
                TextValue::Text(String::from_utf8_lossy(&data).into_owned())
            }
            RespValue::Integer(value) => TextValue::Integer(value),
            RespValue::Error(message) => TextValue::Error(message),
            RespValue::Null => TextValue::Null,
            RespValue::Array(items) => {
                TextValue::Array(items.into_iter().map(RespValue::into_text).collect())
            }
        }
    }
}

/// Reply with every byte payload decoded to text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextValue {
    Text(String),
    Integer(i64),
    Error(String),
    Null,
    Array(Vec<TextValue>),
}

impl TextValue {
    /// Returns the string for `Text`, `None` otherwise.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            TextValue::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// One command argument: text or raw bytes.
///
/// Text is measured in encoded UTF-8 bytes on the wire. Raw bytes are
/// forwarded to the stream without copying.
#[derive(Clone, PartialEq, Eq)]
pub enum Arg {
    Text(String),
    Bytes(Bytes),
}

impl Arg {
    /// Encoded length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        match self {
            Arg::Text(text) => text.len(),
            Arg::Bytes(data) => data.len(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Text(text) => write!(f, "Text({:?})", text),
            Arg::Bytes(data) => write!(f, "Bytes({} bytes)", data.len()),
        }
    }
}

impl From<&str> for Arg {
    fn from(value: &str) -> Self {
        Arg::Text(value.to_string())
    }
}

impl From<String> for Arg {
    fn from(value: String) -> Self {
        Arg::Text(value)
    }
}

impl From<&[u8]> for Arg {
    fn from(value: &[u8]) -> Self {
        Arg::Bytes(Bytes::copy_from_slice(value))
    }
}

impl<const N: usize> From<&[u8; N]> for Arg {
    fn from(value: &[u8; N]) -> Self {
        Arg::Bytes(Bytes::copy_from_slice(value))
    }
}

impl From<Vec<u8>> for Arg {
    fn from(value: Vec<u8>) -> Self {
        Arg::Bytes(Bytes::from(value))
    }
}

impl From<Bytes> for Arg {
    fn from(value: Bytes) -> Self {
        Arg::Bytes(value)
    }
}

// Numbers travel as their decimal text.
macro_rules! arg_from_number {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Arg {
                fn from(value: $ty) -> Self {
                    Arg::Text(value.to_string())
                }
            }
        )*
    };
}

arg_from_number!(i32, i64, u32, u64, usize, f64);
