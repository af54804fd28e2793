//! # Decoder Benchmark Harness
//!
//! Purpose: Provide a repeatable driver for the frame decoder so throughput on
//! whole, randomly split and reassembled replies can be compared over time.
//!
//! ## Design Principles
//! 1. **Deterministic Workload**: Use a fixed PRNG seed for stable split points.
//! 2. **Allocation Control**: Pre-build the reply stream so setup stays off the hot path.
//! 3. **Zero-Cost Dispatch**: Call the concrete decoder directly.
//!
//! Usage: `cargo run -p pkv-common --features bench --release --bin bench_decoder -- [replies] [payload_size] [max_chunk]`

use std::env;
use std::hint::black_box;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{ensure, Result};
use bytes::Bytes;
use pkv_common::{ReassemblyPool, RespDecoder};

const DEFAULT_REPLY_COUNT: usize = 100_000;
const DEFAULT_PAYLOAD_SIZE: usize = 128;
const DEFAULT_MAX_CHUNK: usize = 16 * 1024;

struct BenchConfig {
    reply_count: usize,
    payload_size: usize,
    max_chunk: usize,
}

impl BenchConfig {
    fn from_args() -> Self {
        let mut args = env::args().skip(1);
        BenchConfig {
            reply_count: parse_usize(args.next(), DEFAULT_REPLY_COUNT),
            payload_size: parse_usize(args.next(), DEFAULT_PAYLOAD_SIZE),
            max_chunk: parse_usize(args.next(), DEFAULT_MAX_CHUNK).max(1),
        }
    }
}

fn parse_usize(value: Option<String>, fallback: usize) -> usize {
    value.and_then(|raw| raw.parse().ok()).unwrap_or(fallback)
}

/// Tiny deterministic PRNG for chunk split points.
struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    #[inline]
    fn next_below(&mut self, bound: usize) -> usize {
        (self.next_u64() as usize) % bound
    }
}

/// Builds `count` arrays of `[bulk payload, integer]`.
fn build_stream(count: usize, payload_size: usize) -> Bytes {
    let payload: Vec<u8> = (0..payload_size).map(|idx| b'a' + (idx % 26) as u8).collect();
    let mut stream = Vec::with_capacity(count * (payload_size + 32));
    for idx in 0..count {
        stream.extend_from_slice(format!("*2\r\n${}\r\n", payload_size).as_bytes());
        stream.extend_from_slice(&payload);
        stream.extend_from_slice(format!("\r\n:{}\r\n", idx).as_bytes());
    }
    Bytes::from(stream)
}

fn split_stream(stream: &Bytes, max_chunk: usize, seed: u64) -> Vec<Bytes> {
    let mut rng = XorShift64::new(seed);
    let mut chunks = Vec::new();
    let mut offset = 0;
    while offset < stream.len() {
        let len = (rng.next_below(max_chunk) + 1).min(stream.len() - offset);
        chunks.push(stream.slice(offset..offset + len));
        offset += len;
    }
    chunks
}

fn decode_chunks(label: &str, chunks: &[Bytes], expected: usize) -> Result<()> {
    let pool = Arc::new(ReassemblyPool::new());
    let mut decoder = RespDecoder::new(pool.clone());
    let mut replies = 0usize;
    let mut errors = 0usize;

    let start = Instant::now();
    for chunk in chunks {
        decoder.feed(chunk.clone(), |reply| match reply {
            Ok(value) => {
                replies += 1;
                black_box(value);
            }
            Err(_) => errors += 1,
        });
    }
    let elapsed = start.elapsed();

    ensure!(errors == 0, "{label}: decoder reported {errors} errors");
    ensure!(replies == expected, "{label}: decoded {replies} of {expected} replies");
    report(label, replies, chunks.len(), elapsed);
    tracing::info!(label, pool = ?pool.stats(), "pool after run");
    Ok(())
}

fn report(label: &str, ops: usize, chunks: usize, elapsed: std::time::Duration) {
    let secs = elapsed.as_secs_f64();
    let ops_per_sec = (ops as f64) / secs;
    let nanos_per_op = (secs * 1e9) / (ops as f64);
    println!(
        "{label}: {ops} replies from {chunks} chunks in {secs:.3}s ({ops_per_sec:.0} replies/s, {nanos_per_op:.1} ns/reply)"
    );
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    if let Err(err) = run() {
        eprintln!("bench_decoder failed: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let config = BenchConfig::from_args();
    let stream = build_stream(config.reply_count, config.payload_size);

    println!(
        "replies={}, payload_size={}, max_chunk={}, stream_bytes={}",
        config.reply_count,
        config.payload_size,
        config.max_chunk,
        stream.len()
    );

    decode_chunks("whole", std::slice::from_ref(&stream), config.reply_count)?;

    let chunks = split_stream(&stream, config.max_chunk, 0x1234_5678_9ABC_DEF0);
    decode_chunks("random-split", &chunks, config.reply_count)?;

    // Tiny reads force most payloads through the reassembly pool.
    let chunks = split_stream(&stream, 64, 0x0FED_CBA9_8765_4321);
    decode_chunks("tiny-reads", &chunks, config.reply_count)?;

    Ok(())
}
