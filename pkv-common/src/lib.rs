// pkv-common - Protocol core for the PipeKV client
//
// This crate holds the RESP2 value model, the command encoder, the resumable
// frame decoder and the reassembly pool. It has no async runtime dependency.

pub mod decode;
pub mod encode;
pub mod error;
pub mod pool;
pub mod value;

// Re-export for convenience
pub use decode::*;
pub use encode::*;
pub use error::*;
pub use pool::*;
pub use value::*;
