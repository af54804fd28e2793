//! # Reassembly Pool
//!
//! Purpose: Provide contiguous scratch space for bulk payloads that arrive
//! split across several stream reads, without allocating a fresh buffer for
//! every large reply.
//!
//! ## Design Principles
//! 1. **Arena Pattern**: One growable region; payloads are carved off its
//!    front and the write offset advances.
//! 2. **Shared, Not Global**: The pool is an explicit object. Decoders hold an
//!    `Arc` to it, so a process can share one pool or give each connection
//!    its own.
//! 3. **Refcounted Hand-Out**: Payloads are frozen `Bytes` views into the
//!    region. Growing or shrinking swaps in a new region; views already handed
//!    out keep the old one alive, so they never need to be copied out.
//! 4. **Idle Shrink**: Growth raises an arm request. An external driver calls
//!    [`ReassemblyPool::maybe_shrink`] on a timer until the pool disarms.
//!
//! ## Sizing Rules
//!
//! ```text
//! grow:   size = len * (len > 75 MiB ? 2 : 3) + offset
//!         (offset first reset to 50 MiB when above 111 MiB)
//! shrink: only above 50 KiB; cut max(size / 10, offset) bytes
//!         when growths == 1 or not_shrunk > growths * 2,
//!         else not_shrunk += 1 and growths -= 1
//! disarm: at or below 50 KiB
//! ```

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;

const MIB: usize = 1024 * 1024;

/// Payloads larger than this grow the pool by 2x instead of 3x.
pub const LARGE_PAYLOAD_THRESHOLD: usize = 75 * MIB;

/// Offset above which growth resets the carried-over offset.
pub const OFFSET_CAP: usize = 111 * MIB;

/// Offset carried into a new region once the cap is exceeded.
pub const OFFSET_CARRY_OVER: usize = 50 * MIB;

/// Pool size at or below which the shrink driver disarms.
pub const SHRINK_FLOOR: usize = 50 * 1024;

/// Period between shrink passes.
pub const SHRINK_INTERVAL: Duration = Duration::from_millis(50);

/// Result of a shrink pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShrinkTick {
    /// The pool shrank this round.
    Shrunk,
    /// The pool looked busy and was left alone.
    Skipped,
    /// The pool is at or below the floor; stop calling `maybe_shrink`.
    Disarmed,
}

/// Point-in-time view of the pool bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Size of the current region in bytes.
    pub size: usize,
    /// Bytes handed out from the current region.
    pub offset: usize,
    /// Growth counter used by the shrink heuristic.
    pub growths: usize,
    /// Rounds the shrink pass skipped.
    pub not_shrunk: usize,
    /// True while a shrink driver should be running.
    pub armed: bool,
}

struct PoolState {
    // Unused tail of the current region; `capacity()` is what is left.
    free: BytesMut,
    size: usize,
    offset: usize,
    growths: usize,
    not_shrunk: usize,
    armed: bool,
    arm_requested: bool,
}

/// Growable scratch region shared by decoders.
pub struct ReassemblyPool {
    state: Mutex<PoolState>,
}

impl ReassemblyPool {
    /// Creates an empty pool. Nothing is allocated until the first reserve.
    pub fn new() -> Self {
        ReassemblyPool {
            state: Mutex::new(PoolState {
                free: BytesMut::new(),
                size: 0,
                offset: 0,
                growths: 0,
                not_shrunk: 0,
                armed: false,
                arm_requested: false,
            }),
        }
    }

    /// Guarantees at least `len` contiguous writable bytes at the current
    /// offset, replacing the region with a larger one when needed.
    pub fn reserve(&self, len: usize) {
        let mut state = self.state.lock();
        state.reserve(len);
    }

    /// Copies `parts` back to back into the pool and returns the written
    /// region as one contiguous payload.
    pub fn write(&self, parts: &[&[u8]]) -> Bytes {
        let total = parts.iter().map(|part| part.len()).sum();
        let mut state = self.state.lock();
        state.reserve(total);
        for part in parts {
            state.free.extend_from_slice(part);
        }
        state.offset += total;
        state.free.split().freeze()
    }

    /// Runs one shrink pass.
    pub fn maybe_shrink(&self) -> ShrinkTick {
        let mut state = self.state.lock();
        if state.size <= SHRINK_FLOOR {
            state.growths = 0;
            state.not_shrunk = 0;
            state.armed = false;
            state.arm_requested = false;
            return ShrinkTick::Disarmed;
        }

        if state.growths == 1 || state.not_shrunk > state.growths * 2 {
            let cut = (state.size / 10).max(state.offset);
            let size = state.size - cut;
            state.free = BytesMut::with_capacity(size);
            state.size = size;
            state.offset = 0;
            ShrinkTick::Shrunk
        } else {
            state.not_shrunk += 1;
            state.growths = state.growths.saturating_sub(1);
            ShrinkTick::Skipped
        }
    }

    /// Returns true once after the pool grows while no driver is armed.
    ///
    /// The caller that receives `true` owns starting the shrink driver.
    pub fn take_arm_request(&self) -> bool {
        let mut state = self.state.lock();
        std::mem::take(&mut state.arm_requested)
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.state.lock();
        PoolStats {
            size: state.size,
            offset: state.offset,
            growths: state.growths,
            not_shrunk: state.not_shrunk,
            armed: state.armed,
        }
    }
}

impl Default for ReassemblyPool {
    fn default() -> Self {
        Self::new()
    }
}

impl PoolState {
    fn reserve(&mut self, len: usize) {
        if self.free.capacity() >= len {
            return;
        }

        let multiplier = if len > LARGE_PAYLOAD_THRESHOLD { 2 } else { 3 };
        if self.offset > OFFSET_CAP {
            self.offset = OFFSET_CARRY_OVER;
        }

        let size = len * multiplier + self.offset;
        tracing::trace!(len, size, "growing reassembly pool");
        self.free = BytesMut::with_capacity(size);
        self.size = size;
        self.offset = 0;
        self.growths += 1;
        if !self.armed {
            self.armed = true;
            self.arm_requested = true;
        }
    }
}
