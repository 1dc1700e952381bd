//! Bounded-observation FIFO between region producer and drainer
//!
//! One coarse mutex guards every access (push, batched drain, length
//! snapshot). The queue itself is unbounded; backpressure comes from the
//! producer's rate governor, and the drainer only starts pulling once the
//! backlog passes [`DRAIN_THRESHOLD`], then takes at most
//! [`DRAIN_BATCH_MAX`] regions per call. Insertion order is drain order.

use crate::region::MappedRegion;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Maximum regions removed by one `drain_batch` call.
pub const DRAIN_BATCH_MAX: usize = 100;

/// Backlog size above which the drain loop starts taking batches.
pub const DRAIN_THRESHOLD: usize = 100;

#[derive(Debug, Default)]
pub struct HandoffQueue {
    pending: Mutex<VecDeque<MappedRegion>>,
}

impl HandoffQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue one region (producer side).
    pub fn push(&self, region: MappedRegion) {
        self.pending.lock().expect("handoff queue poisoned").push_back(region);
    }

    /// Number of regions awaiting drain.
    pub fn len(&self) -> usize {
        self.pending.lock().expect("handoff queue poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove up to [`DRAIN_BATCH_MAX`] regions in FIFO order.
    ///
    /// The whole batch is taken under one lock acquisition so the consumer
    /// never races a backlog that grows while it collects. Returns an
    /// empty vector when nothing is pending.
    pub fn drain_batch(&self) -> Vec<MappedRegion> {
        let mut pending = self.pending.lock().expect("handoff queue poisoned");
        let take = pending.len().min(DRAIN_BATCH_MAX);
        pending.drain(..take).collect()
    }
}
