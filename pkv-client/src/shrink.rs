//! Idle-shrink driver for the reassembly pool.

use std::sync::Arc;

use pkv_common::{ReassemblyPool, ShrinkTick, SHRINK_INTERVAL};
use tokio::task::JoinHandle;

/// Spawns a task that runs a shrink pass every [`SHRINK_INTERVAL`] until the
/// pool reports it is back at its floor.
///
/// Call this when [`ReassemblyPool::take_arm_request`] returns true.
pub fn spawn_shrinker(pool: Arc<ReassemblyPool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SHRINK_INTERVAL);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match pool.maybe_shrink() {
                ShrinkTick::Disarmed => break,
                ShrinkTick::Shrunk => tracing::trace!(stats = ?pool.stats(), "reassembly pool shrunk"),
                ShrinkTick::Skipped => {}
            }
        }
        tracing::debug!("reassembly pool shrinker disarmed");
    })
}
