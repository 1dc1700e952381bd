//! Mapped-region pipeline: rate-governed producer, batching drainer
//!
//! The producer thread creates filled regions at a caller-specified rate
//! and hands them to the [`HandoffQueue`]; the drain loop takes batches and
//! persists each region to a new file with raw `write(2)` calls. The two
//! sides share only the queue lock and the cancellation token.
//!
//! Rate control is an open-loop governor: produce while the per-second
//! counter is below target, otherwise idle in 1 ms slices, and reset
//! counter and timer every second. If one production call overruns its
//! slice the next slice is correspondingly shorter; there is no token
//! bucket catching up afterwards.

use crate::cancel::CancelToken;
use crate::error::{Result, StressError};
use crate::handoff::{HandoffQueue, DRAIN_THRESHOLD};
use crate::region::{MappedRegion, RegionFactory};
use nix::fcntl::{open, OFlag};
use nix::sys::stat::Mode;
use rand::Rng;
use std::os::fd::AsFd;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Backoff used by both loops when there is nothing to do.
pub const IDLE_BACKOFF: Duration = Duration::from_millis(1);

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Fixed byte length of every produced region.
    pub region_len: usize,
    /// Release the producer mapping right after filling. `false` keeps the
    /// produced pages in the process working set until drain time.
    pub unmap_after_fill: bool,
    /// When `false`, the drain side never writes and the queue only grows:
    /// the pipeline models a memory leak instead of producing files.
    pub write_files: bool,
}

/// Producer/consumer pipeline over one shared handoff queue.
pub struct MappedPipeline {
    cfg: PipelineConfig,
    queue: Arc<HandoffQueue>,
    produced: Arc<AtomicU64>,
    token: CancelToken,
}

impl MappedPipeline {
    pub fn new(cfg: PipelineConfig, token: CancelToken) -> Self {
        Self {
            cfg,
            queue: Arc::new(HandoffQueue::new()),
            produced: Arc::new(AtomicU64::new(0)),
            token,
        }
    }

    pub fn queue(&self) -> Arc<HandoffQueue> {
        Arc::clone(&self.queue)
    }

    /// Total regions produced since `start`.
    pub fn produced(&self) -> u64 {
        self.produced.load(Ordering::Relaxed)
    }

    /// Start the producer thread at `regions_per_second`. Mapping failure
    /// is fatal to the producer and is returned through the join handle.
    pub fn start(&self, regions_per_second: u32) -> JoinHandle<Result<()>> {
        let cfg = self.cfg.clone();
        let queue = Arc::clone(&self.queue);
        let produced = Arc::clone(&self.produced);
        let token = self.token.clone();
        std::thread::Builder::new()
            .name("region-producer".into())
            .spawn(move || {
                info!(rate = regions_per_second, "creating regions");
                let mut rng = rand::thread_rng();
                let mut factory = RegionFactory::new(cfg.region_len, cfg.unmap_after_fill, &mut rng);
                while !token.is_cancelled() {
                    let slice = Instant::now();
                    let mut counter = 0u32;
                    while slice.elapsed() < Duration::from_secs(1) && !token.is_cancelled() {
                        if counter < regions_per_second {
                            let region = factory.produce(&mut rng).map_err(|e| {
                                error!(error = %e, "region production failed");
                                e
                            })?;
                            queue.push(region);
                            counter += 1;
                            produced.fetch_add(1, Ordering::Relaxed);
                        } else {
                            std::thread::sleep(IDLE_BACKOFF);
                        }
                    }
                }
                Ok(())
            })
            .expect("spawn region producer")
    }

    /// Drain loop. Blocks until the token fires: either persisting batches
    /// to `folder` or, with `write_files` off, idling while the backlog
    /// (and the process working set) grows. On cancellation any remaining
    /// backlog is flushed so every enqueued region is drained exactly once.
    pub fn write(&self, folder: &Path) -> Result<()> {
        std::fs::create_dir_all(folder)?;
        let mut rng = rand::thread_rng();

        if !self.cfg.write_files {
            info!("write disabled; holding regions in memory until exit");
            while !self.token.sleep_cancellable(Duration::from_millis(100)) {}
            return Ok(());
        }

        while !self.token.is_cancelled() {
            if self.queue.len() > DRAIN_THRESHOLD {
                let batch = self.queue.drain_batch();
                self.persist_batch(folder, batch, &mut rng)?;
            } else {
                std::thread::sleep(IDLE_BACKOFF);
            }
        }

        // Final flush after cancellation.
        loop {
            let batch = self.queue.drain_batch();
            if batch.is_empty() {
                break;
            }
            self.persist_batch(folder, batch, &mut rng)?;
        }
        Ok(())
    }

    fn persist_batch(
        &self,
        folder: &Path,
        batch: Vec<MappedRegion>,
        rng: &mut impl Rng,
    ) -> Result<()> {
        debug!(batch = batch.len(), pending = self.queue.len(), "draining regions");
        let started = Instant::now();
        let count = batch.len();
        for region in batch {
            let file_name =
                folder.join(format!("MemoryMap_{}{}.txt", rng.gen::<u32>(), rng.gen::<u32>()));
            persist_region(&file_name, &region)?;
            // Region dropped here: the mapping (if still live) and the
            // shared-memory handle are released exactly once.
        }
        info!(
            files = count,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "batch written"
        );
        Ok(())
    }
}

/// Write one region's full content to a newly created file using raw
/// `write(2)`. The file is opened for exclusive creation; name collisions
/// are effectively impossible with randomized names.
fn persist_region(path: &Path, region: &MappedRegion) -> Result<()> {
    let fd = open(
        path,
        OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_EXCL | OFlag::O_CLOEXEC,
        Mode::from_bits_truncate(0o644),
    )
    .map_err(|e| StressError::Io(e.into()))?;
    let view = region.view()?;
    write_all_raw(&fd, &view)
}

/// Raw write loop: retries partial writes until the whole buffer is on
/// its way to the file, surfaces zero-progress and OS errors instead of
/// silently accepting short writes.
pub fn write_all_raw<Fd: AsFd>(fd: &Fd, buf: &[u8]) -> Result<()> {
    let mut written = 0;
    while written < buf.len() {
        match nix::unistd::write(fd.as_fd(), &buf[written..]) {
            Ok(0) => {
                return Err(StressError::ShortWrite {
                    written,
                    expected: buf.len(),
                })
            }
            Ok(n) => written += n,
            Err(nix::errno::Errno::EINTR) => continue,
            Err(e) => return Err(StressError::Io(e.into())),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const REGION_LEN: usize = 64 * 1024;

    fn test_config(write_files: bool) -> PipelineConfig {
        PipelineConfig {
            region_len: REGION_LEN,
            unmap_after_fill: true,
            write_files,
        }
    }

    #[test]
    fn test_producer_respects_cancellation() {
        let token = CancelToken::new();
        let pipeline = MappedPipeline::new(test_config(true), token.clone());
        let handle = pipeline.start(1000);
        std::thread::sleep(Duration::from_millis(150));
        token.cancel();
        handle.join().unwrap().unwrap();
        assert!(pipeline.produced() > 0);
        assert_eq!(pipeline.queue().len() as u64, pipeline.produced());
    }

    #[test]
    fn test_drain_writes_every_enqueued_region() {
        let dir = tempdir().unwrap();
        let token = CancelToken::new();
        let pipeline = MappedPipeline::new(test_config(true), token.clone());

        let queue = pipeline.queue();
        for i in 0..150 {
            queue.push(MappedRegion::create(&format!("r{i}"), REGION_LEN).unwrap());
        }

        let folder = dir.path().join("out");
        let writer = {
            let folder = folder.clone();
            let pipeline = MappedPipeline {
                cfg: test_config(true),
                queue: pipeline.queue(),
                produced: Arc::new(AtomicU64::new(0)),
                token: token.clone(),
            };
            std::thread::spawn(move || pipeline.write(&folder))
        };

        std::thread::sleep(Duration::from_millis(200));
        token.cancel();
        writer.join().unwrap().unwrap();

        let written: Vec<_> = std::fs::read_dir(&folder).unwrap().collect();
        assert_eq!(written.len(), 150);
        for entry in written {
            let meta = entry.unwrap().metadata().unwrap();
            assert_eq!(meta.len() as usize, REGION_LEN);
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn test_write_files_disabled_keeps_backlog() {
        let dir = tempdir().unwrap();
        let token = CancelToken::new();
        let pipeline = MappedPipeline::new(test_config(false), token.clone());
        pipeline
            .queue()
            .push(MappedRegion::create("leaked", REGION_LEN).unwrap());

        let folder = dir.path().join("out");
        let writer = {
            let folder = folder.clone();
            let pipeline = MappedPipeline {
                cfg: test_config(false),
                queue: pipeline.queue(),
                produced: Arc::new(AtomicU64::new(0)),
                token: token.clone(),
            };
            std::thread::spawn(move || pipeline.write(&folder))
        };
        std::thread::sleep(Duration::from_millis(150));
        token.cancel();
        writer.join().unwrap().unwrap();

        assert_eq!(pipeline.queue().len(), 1);
        assert_eq!(std::fs::read_dir(&folder).unwrap().count(), 0);
    }

    #[test]
    fn test_write_all_raw_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("raw.bin");
        let data: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
        let fd = open(
            &path,
            OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_EXCL,
            Mode::from_bits_truncate(0o644),
        )
        .unwrap();
        write_all_raw(&fd, &data).unwrap();
        drop(fd);
        assert_eq!(std::fs::read(&path).unwrap(), data);
    }

    #[test]
    fn test_persist_region_fails_on_existing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("exists.txt");
        std::fs::write(&path, b"already here").unwrap();
        let region = MappedRegion::create("dup", 4096).unwrap();
        assert!(persist_region(&path, &region).is_err());
    }
}
