//! Error types and the disk-full / transient failure taxonomy
//!
//! Three classes of failure exist in the write paths:
//! 1. Fatal: OS-level allocation or mapping failure. Not retried; the
//!    owning loop terminates.
//! 2. Resource exhaustion: the target volume is out of space or quota.
//!    Handled by invoking a cleanup hook and continuing; never counted
//!    against a writer's retry budget.
//! 3. Transient I/O: anything else surfaced by a write. Retried up to a
//!    per-writer budget before that writer gives up.

use std::io;
use thiserror::Error;

/// Consecutive non-disk-full I/O failures a writer loop tolerates before
/// giving up.
pub const WRITE_RETRY_BUDGET: u32 = 5;

#[derive(Debug, Error)]
pub enum StressError {
    /// OS-level region allocation or mapping failure (fatal).
    #[error("mapped region allocation failed: {0}")]
    Mapping(#[source] io::Error),

    /// A raw write reported success for fewer bytes than requested and
    /// could not make further progress.
    #[error("short write: {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, StressError>;

/// `true` when the error means the target volume has no space or quota
/// left. ENOSPC and EDQUOT are the two platform codes that mean "disk
/// full" here; everything else is treated as transient.
pub fn is_disk_full(err: &io::Error) -> bool {
    matches!(err.raw_os_error(), Some(libc::ENOSPC) | Some(libc::EDQUOT))
}

impl StressError {
    /// Disk-full classification lifted over the error enum. Only the
    /// underlying I/O variants can carry a disk-full code.
    pub fn is_disk_full(&self) -> bool {
        match self {
            StressError::Io(err) => is_disk_full(err),
            StressError::Mapping(err) => is_disk_full(err),
            StressError::ShortWrite { .. } => false,
        }
    }
}
