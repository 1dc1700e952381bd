//! Single-threaded sequential read-throughput reporter
//!
//! Opens every file in a directory up front, then reads them back to back
//! through one large buffer, printing the rate of the last slice at every
//! GiB boundary and the overall average at the end.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;

const GIB: u64 = 1_000_000_000;
const MB: u64 = 1024 * 1024;

pub struct ReadPerf {
    files: Vec<PathBuf>,
    buffer: Vec<u8>,
}

/// Totals reported after a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReadTotals {
    pub bytes_read: u64,
    pub mb_per_sec: f64,
}

impl ReadPerf {
    pub fn new(directory: &Path, buffer_size_kb: usize) -> io::Result<Self> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(directory)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .collect();
        files.sort();
        Ok(Self {
            files,
            buffer: vec![0u8; buffer_size_kb * 1024],
        })
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn run(&mut self) -> io::Result<ReadTotals> {
        let mut total_bytes: u64 = 0;
        let mut gib_boundary: u64 = 0;
        let mut slice_bytes: u64 = 0;

        let started = Instant::now();
        let mut slice_started = Instant::now();
        for path in &self.files {
            let mut file = File::open(path)?;
            loop {
                let read = file.read(&mut self.buffer)?;
                if read == 0 {
                    break;
                }
                total_bytes += read as u64;
                if total_bytes / GIB != gib_boundary {
                    gib_boundary = total_bytes / GIB;
                    let slice_mb = (total_bytes - slice_bytes) / MB;
                    let slice_secs = slice_started.elapsed().as_secs_f64();
                    info!(
                        slice_mb,
                        mb_per_sec = (slice_mb as f64 / slice_secs) as u64,
                        current_file = %path.display(),
                        "read progress"
                    );
                    slice_started = Instant::now();
                    slice_bytes = total_bytes;
                }
            }
        }

        let elapsed = started.elapsed().as_secs_f64().max(f64::EPSILON);
        let totals = ReadTotals {
            bytes_read: total_bytes,
            mb_per_sec: (total_bytes / MB) as f64 / elapsed,
        };
        info!(
            mb_read = total_bytes / MB,
            mb_per_sec = totals.mb_per_sec as u64,
            "total read performance"
        );
        Ok(totals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_reads_every_byte_of_every_file() {
        let dir = tempdir().unwrap();
        for i in 0..4 {
            std::fs::write(dir.path().join(format!("file-{i}.dat")), vec![i as u8; 100_000])
                .unwrap();
        }
        let mut perf = ReadPerf::new(dir.path(), 64).unwrap();
        assert_eq!(perf.file_count(), 4);
        let totals = perf.run().unwrap();
        assert_eq!(totals.bytes_read, 400_000);
        assert!(totals.mb_per_sec >= 0.0);
    }

    #[test]
    fn test_empty_directory_reads_nothing() {
        let dir = tempdir().unwrap();
        let mut perf = ReadPerf::new(dir.path(), 16).unwrap();
        assert_eq!(perf.file_count(), 0);
        assert_eq!(perf.run().unwrap().bytes_read, 0);
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        assert!(ReadPerf::new(Path::new("/nonexistent-dir-for-readperf"), 16).is_err());
    }
}
