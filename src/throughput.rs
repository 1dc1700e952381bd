//! Multi-threaded file-write throughput benchmark
//!
//! `run` launches three concurrent activities: the shared-buffer refresher,
//! the 10-second throughput sampler, and N writer loops. Each writer
//! iteration builds a collision-resistant random file name, then times file
//! creation, the full buffer write, and close separately, and appends one
//! measurement to the shared log. The run ends when the time budget
//! elapses or the cancellation token fires (SIGINT takes the same path);
//! the measurement log is then serialized to the result file.
//!
//! Writer failure policy: a disk-full error triggers the external cleanup
//! hook and the loop continues without penalty; any other I/O error is
//! retried; after five consecutive failures the loop gives up without
//! affecting sibling writers.

use crate::buffer::{spawn_refresher, SharedBuffer};
use crate::cancel::CancelToken;
use crate::csv_output;
use crate::error::{is_disk_full, Result, WRITE_RETRY_BUDGET};
use crate::stats::{StatsAggregator, WriteMeasurement};
use chrono::Local;
use rand::Rng;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const MB: u64 = 1024 * 1024;

/// Baseline rate assumed by the pre-run free-space advisory.
const ASSUMED_RATE_MB_S: u64 = 100;

/// Immutable run parameters, captured at start.
#[derive(Debug, Clone)]
pub struct ThroughputConfig {
    /// Folder the benchmark files are written into.
    pub folder: PathBuf,
    pub runtime_minutes: f32,
    pub file_size_mb: f32,
    pub thread_count: usize,
    /// Random data defeats controller-level compression; the alternative
    /// is a constant `A` pattern.
    pub use_random_data: bool,
}

impl ThroughputConfig {
    pub fn file_size_bytes(&self) -> usize {
        (self.file_size_mb as f64 * MB as f64) as usize
    }

    pub fn time_budget(&self) -> Duration {
        Duration::from_secs_f64(self.runtime_minutes as f64 * 60.0)
    }
}

/// Sub-durations of one completed write.
#[derive(Debug, Clone, Copy)]
pub struct WriteTiming {
    pub create: Duration,
    pub write: Duration,
    pub close: Duration,
    pub total: Duration,
}

/// The benchmark driver. The cleanup hook is invoked on disk-full and is
/// expected to free space (e.g. delete a prior run's files).
pub struct ThroughputHarness {
    cfg: ThroughputConfig,
    stats: Arc<StatsAggregator>,
    buffer: Arc<SharedBuffer>,
    token: CancelToken,
    cleanup: Box<dyn Fn() + Send + Sync>,
}

impl ThroughputHarness {
    pub fn new(
        cfg: ThroughputConfig,
        token: CancelToken,
        cleanup: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        let buffer = Arc::new(SharedBuffer::new(cfg.file_size_bytes()));
        Self {
            cfg,
            stats: Arc::new(StatsAggregator::new()),
            buffer,
            token,
            cleanup: Box::new(cleanup),
        }
    }

    pub fn stats(&self) -> Arc<StatsAggregator> {
        Arc::clone(&self.stats)
    }

    /// Execute the benchmark and write the result log. Returns the result
    /// file's path.
    pub fn run(&self) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.cfg.folder)?;
        self.advise_free_space();

        // Deterministic mode fills synchronously so the very first write
        // already carries the pattern; random mode refreshes continuously
        // on its own thread.
        let refresher = if self.cfg.use_random_data {
            Some(spawn_refresher(
                Arc::clone(&self.buffer),
                true,
                self.token.clone(),
            ))
        } else {
            self.buffer.fill(crate::buffer::FILL_BYTE);
            None
        };
        let sampler = self.stats.spawn_sampler(self.token.clone());

        info!(threads = self.cfg.thread_count, "executing throughput test");
        std::thread::scope(|s| {
            for _ in 0..self.cfg.thread_count {
                s.spawn(|| self.writer_loop());
            }
            let budget = self.cfg.time_budget();
            info!(budget_ms = budget.as_millis() as u64, "run started");
            self.token.sleep_cancellable(budget);
            self.token.cancel();
        });

        if let Some(handle) = refresher {
            if handle.join().is_err() {
                warn!("buffer refresher panicked");
            }
        }
        if sampler.join().is_err() {
            warn!("stats sampler panicked");
        }

        let path = csv_output::save_results(
            &self.cfg.folder,
            self.cfg.runtime_minutes,
            self.cfg.file_size_mb,
            self.cfg.thread_count,
            &self.stats.measurements(),
        )?;
        info!(path = %path.display(), "details written");
        Ok(path)
    }

    /// Advisory only: compare free space against the bytes a full-length
    /// run would produce at an assumed 100 MB/s. Never blocks the run.
    fn advise_free_space(&self) {
        let stat = match nix::sys::statvfs::statvfs(&self.cfg.folder) {
            Ok(stat) => stat,
            Err(e) => {
                debug!(error = %e, "statvfs failed; skipping free-space check");
                return;
            }
        };
        let available = stat.blocks_available() as u64 * stat.fragment_size() as u64;
        let estimated =
            (self.cfg.runtime_minutes as f64 * 60.0 * (ASSUMED_RATE_MB_S * MB) as f64) as u64;
        if estimated > available {
            warn!(
                available_gb = available / (1024 * MB),
                estimated_gb = estimated / (1024 * MB),
                "test may fill the volume before the time budget elapses"
            );
        } else {
            info!(
                available_gb = available / (1024 * MB),
                estimated_gb = estimated / (1024 * MB),
                "free-space check passed"
            );
        }
    }

    fn writer_loop(&self) {
        let mut rng = rand::thread_rng();
        self.writer_loop_with(|path| self.write_one(path), &mut rng);
    }

    /// Writer loop over an injected write operation; the production loop
    /// passes [`write_one`](Self::write_one), tests inject failures.
    fn writer_loop_with<F>(&self, mut write_file: F, rng: &mut impl Rng)
    where
        F: FnMut(&Path) -> io::Result<WriteTiming>,
    {
        let mut failures = 0u32;
        while !self.token.is_cancelled() && failures < WRITE_RETRY_BUDGET {
            let file_name = self
                .cfg
                .folder
                .join(format!("ThroughputTests_{}{}.txt", rng.gen::<u32>(), rng.gen::<u32>()));
            match write_file(&file_name) {
                Ok(timing) => {
                    failures = 0;
                    self.record(&file_name, timing);
                }
                Err(e) if is_disk_full(&e) => {
                    warn!("disk full; deleting old data");
                    self.stats.mark_cleanup();
                    (self.cleanup)();
                }
                Err(e) => {
                    failures += 1;
                    warn!(error = %e, attempt = failures, "i/o failure; retrying");
                }
            }
        }
    }

    /// Create, write, and close one file, timing each step.
    fn write_one(&self, path: &Path) -> io::Result<WriteTiming> {
        let started = Instant::now();
        let mut file = File::options().write(true).create_new(true).open(path)?;
        let create = started.elapsed();
        file.write_all(self.buffer.as_slice())?;
        let written = started.elapsed();
        drop(file);
        let total = started.elapsed();
        Ok(WriteTiming {
            create,
            write: written - create,
            close: total - written,
            total,
        })
    }

    fn record(&self, file_name: &Path, timing: WriteTiming) {
        let rate = self.stats.mb_per_sec_10s();
        self.stats.record_write(
            self.buffer.len() as u64,
            WriteMeasurement {
                complete_time: Local::now(),
                elapsed_secs: self.stats.elapsed_secs(),
                create_secs: timing.create.as_secs_f64(),
                write_secs: timing.write.as_secs_f64(),
                close_secs: timing.close.as_secs_f64(),
                total_secs: timing.total.as_secs_f64(),
                // Filled in under the log lock.
                total_mb_written: 0,
                mb_per_sec_10s: rate,
                file_name: file_name.display().to_string(),
            },
        );
        info!(
            open_ms = timing.create.as_millis() as u64,
            write_ms = timing.write.as_millis() as u64,
            close_ms = timing.close.as_millis() as u64,
            last_10s_mb_s = rate,
            "file written"
        );
    }
}
