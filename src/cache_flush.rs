//! Page-cache eviction for a file or directory tree
//!
//! Collects the target file list (optionally recursing into
//! subdirectories; unreadable directories are skipped so the walk stays
//! best-effort complete), then fans the flushes out over a small fixed
//! pool of worker threads. Per file: `fdatasync` so dirty pages cannot
//! linger, then `posix_fadvise(POSIX_FADV_DONTNEED)` to drop the cached
//! pages.

use std::fs::File;
use std::io;
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

/// Worker threads used for the fan-out.
const FLUSH_WORKERS: usize = 4;

#[derive(Debug)]
pub struct CacheFlush {
    files: Vec<PathBuf>,
}

impl CacheFlush {
    /// Build the flush list from a single file or a directory.
    pub fn new(file_or_dir: &Path, recursive: bool) -> io::Result<Self> {
        let mut files = Vec::new();
        if file_or_dir.is_dir() {
            collect_files(file_or_dir, recursive, &mut files);
        } else if file_or_dir.is_file() {
            files.push(file_or_dir.to_path_buf());
        } else {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("file or directory {} does not exist", file_or_dir.display()),
            ));
        }
        Ok(Self { files })
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Flush every collected file; returns how many were flushed.
    /// Individual failures are logged and skipped.
    pub fn flush(&self) -> usize {
        let queue = Mutex::new(self.files.iter());
        let flushed = std::sync::atomic::AtomicUsize::new(0);
        std::thread::scope(|s| {
            for _ in 0..FLUSH_WORKERS.min(self.files.len().max(1)) {
                s.spawn(|| loop {
                    let Some(path) = queue.lock().expect("flush queue poisoned").next() else {
                        break;
                    };
                    match flush_one(path) {
                        Ok(()) => {
                            flushed.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                        }
                        Err(e) => debug!(file = %path.display(), error = %e, "flush skipped"),
                    }
                });
            }
        });
        let count = flushed.load(std::sync::atomic::Ordering::Relaxed);
        info!(files = count, "file system cache flushed");
        count
    }
}

/// Best-effort directory walk; traversal errors are silently skipped.
fn collect_files(dir: &Path, recursive: bool, out: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            if recursive {
                collect_files(&path, true, out);
            }
        } else if path.is_file() {
            out.push(path);
        }
    }
}

fn flush_one(path: &Path) -> io::Result<()> {
    let file = File::open(path)?;
    // fdatasync may fail for read-only opens on some file systems; the
    // fadvise is what actually evicts, so sync failures are non-fatal.
    unsafe { libc::fdatasync(file.as_raw_fd()) };
    let rc = unsafe { libc::posix_fadvise(file.as_raw_fd(), 0, 0, libc::POSIX_FADV_DONTNEED) };
    if rc != 0 {
        return Err(io::Error::from_raw_os_error(rc));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_flushes_all_files_in_directory() {
        let dir = tempdir().unwrap();
        for i in 0..5 {
            std::fs::write(dir.path().join(format!("f{i}")), b"data").unwrap();
        }
        let flush = CacheFlush::new(dir.path(), false).unwrap();
        assert_eq!(flush.file_count(), 5);
        assert_eq!(flush.flush(), 5);
    }

    #[test]
    fn test_recursive_walk_includes_subdirectories() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("top"), b"x").unwrap();
        std::fs::write(dir.path().join("sub/nested"), b"y").unwrap();

        let flat = CacheFlush::new(dir.path(), false).unwrap();
        assert_eq!(flat.file_count(), 1);
        let deep = CacheFlush::new(dir.path(), true).unwrap();
        assert_eq!(deep.file_count(), 2);
    }

    #[test]
    fn test_single_file_target() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("single");
        std::fs::write(&path, b"z").unwrap();
        let flush = CacheFlush::new(&path, false).unwrap();
        assert_eq!(flush.file_count(), 1);
    }

    #[test]
    fn test_missing_target_is_an_error() {
        let err = CacheFlush::new(Path::new("/no/such/path"), false).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
