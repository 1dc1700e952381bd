//! Cooperative cancellation shared by all long-running loops
//!
//! One token is created per process run. SIGINT (via the `ctrlc` handler in
//! `main`) and the throughput harness's time budget both fire the same
//! token, so interactive interrupt and normal timeout take the identical
//! save/shutdown path. The mapped-region pipeline observes the same token,
//! giving every background loop a symmetric, testable way to stop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Cloneable cancellation flag.
///
/// Cheap to clone (one `Arc`); `cancel` is idempotent and visible to every
/// clone. Loops poll `is_cancelled` between units of work.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Safe to call from any thread, including a
    /// signal handler context.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Sleep for `total`, waking early if the token fires. Polls in short
    /// slices so a SIGINT never waits out a long sampler interval.
    ///
    /// Returns `true` if cancellation was observed during the wait.
    pub fn sleep_cancellable(&self, total: Duration) -> bool {
        const SLICE: Duration = Duration::from_millis(100);
        let start = Instant::now();
        loop {
            if self.is_cancelled() {
                return true;
            }
            // Single clock read per iteration; the deadline can pass
            // between any two reads, so the remainder must saturate.
            let left = total.saturating_sub(start.elapsed());
            if left.is_zero() {
                return self.is_cancelled();
            }
            std::thread::sleep(left.min(SLICE));
        }
    }
}
