//! Anonymous-memory commit/touch stress
//!
//! Commits N GiB of anonymous read-write memory before other tests start,
//! optionally touching one byte per page so every page is actually faulted
//! in. The allocation is held until the returned block is dropped, which
//! in practice means process exit; combined with `--wait-for-enter` this
//! puts the machine under sustained memory pressure interactively.

use crate::error::{Result, StressError};
use std::io;
use std::ptr::NonNull;
use std::time::Instant;
use tracing::info;

const PAGE: usize = 4096;
const GIB: usize = 1024 * 1024 * 1024;

/// One live anonymous mapping; unmapped on drop.
#[derive(Debug)]
pub struct CommittedBlock {
    ptr: NonNull<u8>,
    len: usize,
}

// The block is a plain byte range with no thread affinity.
unsafe impl Send for CommittedBlock {}

impl CommittedBlock {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Write one byte into every page so the kernel must back the whole
    /// range with real memory.
    pub fn touch(&mut self) {
        info!("touching memory");
        let started = Instant::now();
        let mut offset = 0;
        while offset < self.len {
            unsafe { self.ptr.as_ptr().add(offset).write_volatile(1) };
            offset += PAGE;
        }
        info!(elapsed_ms = started.elapsed().as_millis() as u64, "touching memory done");
    }
}

impl Drop for CommittedBlock {
    fn drop(&mut self) {
        if self.len > 0 {
            unsafe { libc::munmap(self.ptr.as_ptr().cast(), self.len) };
        }
    }
}

/// Commit `gb` GiB of anonymous memory; touch every page when requested.
pub fn allocate_memory(gb: usize, touch: bool) -> Result<CommittedBlock> {
    let len = gb * GIB;
    info!(gb, bytes = len, "committing memory");
    if len == 0 {
        return Ok(CommittedBlock {
            ptr: NonNull::dangling(),
            len: 0,
        });
    }
    let ptr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            len,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
            -1,
            0,
        )
    };
    if ptr == libc::MAP_FAILED {
        return Err(StressError::Mapping(io::Error::last_os_error()));
    }
    let ptr = NonNull::new(ptr.cast::<u8>())
        .ok_or_else(|| StressError::Mapping(io::Error::last_os_error()))?;
    let mut block = CommittedBlock { ptr, len };
    if touch {
        block.touch();
    }
    Ok(block)
}
