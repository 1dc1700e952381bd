//! Shared write buffer with background refresh
//!
//! All writer threads of the throughput benchmark write the same buffer to
//! their files. In random mode a single refresher thread re-randomizes the
//! buffer every 15 ms so no two files carry identical content, which keeps
//! SSD controllers and dedup/compression layers honest. In deterministic
//! mode the buffer is filled once with a fixed pattern byte.
//!
//! Writers read the buffer while the refresher mutates it, without
//! synchronization. That tearing is deliberate: a benchmarked file may
//! contain a mid-mutation snapshot, but writers never block on the
//! refresher. If downstream consumers of the written files ever need
//! stable content, run in deterministic mode.

use crate::cancel::CancelToken;
use rand::RngCore;
use std::cell::UnsafeCell;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Pattern byte used in deterministic (non-random) mode.
pub const FILL_BYTE: u8 = b'A';

/// Interval between buffer re-randomizations in random mode.
pub const REFRESH_INTERVAL: Duration = Duration::from_millis(15);

/// Fixed-size byte buffer shared read-side by all writer threads and
/// mutated by exactly one refresher thread.
///
/// Mutation goes through raw pointers only, so no `&mut [u8]` ever
/// aliases the readers' shared view.
pub struct SharedBuffer {
    data: Box<[UnsafeCell<u8>]>,
}

// One mutator, many torn readers, by explicit design (see module docs).
unsafe impl Sync for SharedBuffer {}

impl SharedBuffer {
    pub fn new(len: usize) -> Self {
        Self {
            data: (0..len).map(|_| UnsafeCell::new(0)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn base(&self) -> *mut u8 {
        UnsafeCell::raw_get(self.data.as_ptr())
    }

    /// Read-side view. The contents may change underneath the returned
    /// slice while the refresher runs; callers must tolerate torn reads.
    pub fn as_slice(&self) -> &[u8] {
        // UnsafeCell<u8> is repr(transparent) over u8.
        unsafe { std::slice::from_raw_parts(self.base(), self.data.len()) }
    }

    /// Fill the whole buffer with one byte value (deterministic mode).
    pub fn fill(&self, byte: u8) {
        unsafe { std::ptr::write_bytes(self.base(), byte, self.data.len()) }
    }

    /// Overwrite the whole buffer with fresh random bytes (random mode).
    /// Generates into a scratch buffer, then copies in, so the rng never
    /// holds a mutable reference into the shared storage.
    pub fn randomize(&self, rng: &mut dyn RngCore) {
        let mut scratch = vec![0u8; self.data.len()];
        rng.fill_bytes(&mut scratch);
        unsafe { std::ptr::copy_nonoverlapping(scratch.as_ptr(), self.base(), scratch.len()) }
    }
}

/// Start the refresher thread for `buffer`.
///
/// Random mode re-randomizes every [`REFRESH_INTERVAL`] until the token
/// fires; deterministic mode fills once with [`FILL_BYTE`] and exits.
pub fn spawn_refresher(
    buffer: Arc<SharedBuffer>,
    use_random_data: bool,
    token: CancelToken,
) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name("buffer-refresh".into())
        .spawn(move || {
            if use_random_data {
                let mut rng = rand::thread_rng();
                while !token.is_cancelled() {
                    buffer.randomize(&mut rng);
                    std::thread::sleep(REFRESH_INTERVAL);
                }
            } else {
                buffer.fill(FILL_BYTE);
            }
        })
        .expect("spawn buffer refresher")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_sets_every_byte() {
        let buffer = SharedBuffer::new(4096);
        buffer.fill(FILL_BYTE);
        assert!(buffer.as_slice().iter().all(|&b| b == b'A'));
    }

    #[test]
    fn test_randomize_changes_content() {
        let buffer = SharedBuffer::new(4096);
        buffer.fill(0);
        let mut rng = rand::thread_rng();
        buffer.randomize(&mut rng);
        // 4096 random bytes being all zero is not going to happen.
        assert!(buffer.as_slice().iter().any(|&b| b != 0));
    }

    #[test]
    fn test_deterministic_refresher_fills_once_and_exits() {
        let buffer = Arc::new(SharedBuffer::new(1024));
        let token = CancelToken::new();
        let handle = spawn_refresher(Arc::clone(&buffer), false, token);
        handle.join().unwrap();
        assert!(buffer.as_slice().iter().all(|&b| b == FILL_BYTE));
    }

    #[test]
    fn test_random_refresher_stops_on_cancel() {
        let buffer = Arc::new(SharedBuffer::new(1024));
        let token = CancelToken::new();
        let handle = spawn_refresher(Arc::clone(&buffer), true, token.clone());
        std::thread::sleep(Duration::from_millis(40));
        token.cancel();
        handle.join().unwrap();
    }

    #[test]
    fn test_len_matches_construction() {
        let buffer = SharedBuffer::new(1024 * 1024);
        assert_eq!(buffer.len(), 1024 * 1024);
        assert!(!buffer.is_empty());
    }

    #[test]
    fn test_zero_length_buffer_accessors() {
        let buffer = SharedBuffer::new(0);
        assert!(buffer.is_empty());
        assert!(buffer.as_slice().is_empty());
        buffer.fill(FILL_BYTE);
        buffer.randomize(&mut rand::thread_rng());
    }

    #[test]
    fn test_reads_proceed_while_refresher_mutates() {
        let buffer = Arc::new(SharedBuffer::new(64 * 1024));
        let token = CancelToken::new();
        let handle = spawn_refresher(Arc::clone(&buffer), true, token.clone());
        let mut copies = 0usize;
        for _ in 0..50 {
            copies += buffer.as_slice().to_vec().len();
        }
        token.cancel();
        handle.join().unwrap();
        assert_eq!(copies, 50 * 64 * 1024);
    }
}
