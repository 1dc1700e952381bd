//! Live statistics for the throughput benchmark
//!
//! Byte totals and the rolling throughput figure are plain atomics so the
//! writer hot path never takes a lock for counter updates; only the
//! per-write measurement append shares one mutex. A sampler thread
//! recomputes the rolling figure every 10 seconds as
//! `(bytes_now - bytes_at_last_sample) / 10`.
//!
//! A disk-full cleanup deletes previously written files, which would make
//! the next naive sample wildly wrong. The cleanup path sets a flag that
//! makes the sampler skip one computation and just re-baseline, so the
//! rolling figure never goes negative after a cleanup.

use crate::cancel::CancelToken;
use chrono::{DateTime, Local};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

const MB: u64 = 1024 * 1024;

/// Interval between rolling-throughput samples.
pub const SAMPLE_INTERVAL: Duration = Duration::from_secs(10);

/// One completed file write, captured by the writer that performed it.
/// Never mutated after creation; appended to the shared log under a lock,
/// so each thread's own measurements stay in its chronological order.
#[derive(Debug, Clone)]
pub struct WriteMeasurement {
    /// Wall-clock completion time.
    pub complete_time: DateTime<Local>,
    /// Whole seconds since the harness started writing.
    pub elapsed_secs: u64,
    pub create_secs: f64,
    pub write_secs: f64,
    pub close_secs: f64,
    pub total_secs: f64,
    /// Cumulative MB written by the whole harness, including this write.
    pub total_mb_written: u64,
    /// Rolling 10 s throughput observed when this write completed.
    pub mb_per_sec_10s: u64,
    pub file_name: String,
}

/// Shared counters plus the measurement log.
#[derive(Debug)]
pub struct StatsAggregator {
    started: Instant,
    total_bytes: AtomicU64,
    sampled_bytes: AtomicU64,
    mb_per_sec_10s: AtomicU64,
    cleanup_pending: AtomicBool,
    log: Mutex<Vec<WriteMeasurement>>,
}

impl Default for StatsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            total_bytes: AtomicU64::new(0),
            sampled_bytes: AtomicU64::new(0),
            mb_per_sec_10s: AtomicU64::new(0),
            cleanup_pending: AtomicBool::new(false),
            log: Mutex::new(Vec::new()),
        }
    }

    /// Account `n` freshly written bytes; returns the new cumulative total.
    pub fn add_bytes(&self, n: u64) -> u64 {
        self.total_bytes.fetch_add(n, Ordering::Relaxed) + n
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes.load(Ordering::Relaxed)
    }

    pub fn total_mb(&self) -> u64 {
        self.total_bytes() / MB
    }

    /// Most recently sampled rolling throughput in MB/s.
    pub fn mb_per_sec_10s(&self) -> u64 {
        self.mb_per_sec_10s.load(Ordering::Relaxed)
    }

    /// Whole seconds since the aggregator was created.
    pub fn elapsed_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    /// Note that the disk-full cleanup hook ran; the next sample only
    /// re-baselines instead of computing a throughput figure.
    pub fn mark_cleanup(&self) {
        self.cleanup_pending.store(true, Ordering::SeqCst);
    }

    /// One sampling step. Called by the sampler thread every
    /// [`SAMPLE_INTERVAL`]; exposed so tests can drive it directly.
    pub fn sample(&self) {
        let total = self.total_bytes();
        let prev = self.sampled_bytes.swap(total, Ordering::SeqCst);
        if self.cleanup_pending.swap(false, Ordering::SeqCst) {
            return;
        }
        let rate = total.saturating_sub(prev) / MB / SAMPLE_INTERVAL.as_secs();
        self.mb_per_sec_10s.store(rate, Ordering::Relaxed);
    }

    /// Append one completed measurement to the shared log.
    pub fn record(&self, measurement: WriteMeasurement) {
        self.log.lock().expect("measurement log poisoned").push(measurement);
    }

    /// Account `bytes` and append the measurement in one step under the
    /// log lock, so the cumulative column is monotone in log order even
    /// when writers race. Returns the new cumulative byte total.
    pub fn record_write(&self, bytes: u64, mut measurement: WriteMeasurement) -> u64 {
        let mut log = self.log.lock().expect("measurement log poisoned");
        let total = self.add_bytes(bytes);
        measurement.total_mb_written = total / MB;
        log.push(measurement);
        total
    }

    /// Snapshot of the full measurement log, in append order.
    pub fn measurements(&self) -> Vec<WriteMeasurement> {
        self.log.lock().expect("measurement log poisoned").clone()
    }

    /// Number of completed writes recorded so far.
    pub fn write_count(&self) -> usize {
        self.log.lock().expect("measurement log poisoned").len()
    }

    /// Start the 10-second sampler thread; it stops when the token fires.
    pub fn spawn_sampler(self: &Arc<Self>, token: CancelToken) -> JoinHandle<()> {
        let stats = Arc::clone(self);
        std::thread::Builder::new()
            .name("stats-sampler".into())
            .spawn(move || {
                while !token.sleep_cancellable(SAMPLE_INTERVAL) {
                    stats.sample();
                }
            })
            .expect("spawn stats sampler")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_bytes_is_cumulative() {
        let stats = StatsAggregator::new();
        assert_eq!(stats.add_bytes(MB), MB);
        assert_eq!(stats.add_bytes(2 * MB), 3 * MB);
        assert_eq!(stats.total_mb(), 3);
    }

    #[test]
    fn test_sample_computes_rolling_rate() {
        let stats = StatsAggregator::new();
        stats.add_bytes(100 * MB);
        stats.sample();
        // 100 MB over one 10 s window.
        assert_eq!(stats.mb_per_sec_10s(), 10);
    }

    #[test]
    fn test_sample_uses_delta_not_total() {
        let stats = StatsAggregator::new();
        stats.add_bytes(100 * MB);
        stats.sample();
        stats.add_bytes(50 * MB);
        stats.sample();
        assert_eq!(stats.mb_per_sec_10s(), 5);
    }

    #[test]
    fn test_cleanup_resets_baseline_without_negative_rate() {
        let stats = StatsAggregator::new();
        stats.add_bytes(200 * MB);
        stats.sample();
        let before = stats.mb_per_sec_10s();
        stats.mark_cleanup();
        stats.sample();
        // The skipped sample leaves the previous figure in place and the
        // baseline re-anchored; the following sample is a clean delta.
        assert_eq!(stats.mb_per_sec_10s(), before);
        stats.add_bytes(30 * MB);
        stats.sample();
        assert_eq!(stats.mb_per_sec_10s(), 3);
    }

    #[test]
    fn test_record_write_fills_monotone_cumulative_mb() {
        let stats = StatsAggregator::new();
        for _ in 0..3 {
            stats.record_write(
                MB,
                WriteMeasurement {
                    complete_time: Local::now(),
                    elapsed_secs: 0,
                    create_secs: 0.0,
                    write_secs: 0.0,
                    close_secs: 0.0,
                    total_secs: 0.0,
                    total_mb_written: 0,
                    mb_per_sec_10s: 0,
                    file_name: "f".to_string(),
                },
            );
        }
        let totals: Vec<u64> = stats.measurements().iter().map(|m| m.total_mb_written).collect();
        assert_eq!(totals, [1, 2, 3]);
    }

    #[test]
    fn test_record_preserves_insertion_order() {
        let stats = StatsAggregator::new();
        for i in 0..5u64 {
            stats.record(WriteMeasurement {
                complete_time: Local::now(),
                elapsed_secs: i,
                create_secs: 0.0,
                write_secs: 0.0,
                close_secs: 0.0,
                total_secs: 0.0,
                total_mb_written: i,
                mb_per_sec_10s: 0,
                file_name: format!("file-{i}"),
            });
        }
        let log = stats.measurements();
        assert_eq!(log.len(), 5);
        assert!(log.windows(2).all(|w| w[0].total_mb_written <= w[1].total_mb_written));
        assert_eq!(stats.write_count(), 5);
    }
}
