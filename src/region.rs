//! Memory-mapped regions and the factory that produces them
//!
//! A [`MappedRegion`] is an anonymous shared-memory object (`memfd`) of a
//! fixed size, mapped into the process and filled with non-repeating data.
//! Regions flow producer -> queue -> drainer; the drainer persists them to
//! regular files and drops them.
//!
//! # Mapping state
//!
//! Whether the producer keeps a region mapped until drain time is a
//! configuration choice: keeping it mapped holds the freshly written pages
//! in the process working set, which is exactly the memory pressure the
//! `-nounmap` mode wants to generate. The mapping state travels with the
//! region as an explicit [`RegionState`] tag, so the drainer's release
//! logic is a total function of that state rather than a protocol spread
//! across two call sites. Unmapping happens exactly once, when the
//! `MmapMut` inside the `Mapped` variant is dropped; the `Unmapped` path
//! re-maps read-only from the retained memfd handle at drain time.
//!
//! # Fill data
//!
//! Re-randomizing a whole region on every produce call would dominate the
//! production budget. Instead the factory precomputes one random block and
//! fills each region by XOR-combining two offsets of it, advancing the
//! second offset per region. Every region differs from every other in
//! every 8-byte word, so memory compression and storage dedup get no
//! shortcuts, at a fraction of the cost of a full re-randomization.

use crate::error::{Result, StressError};
use memmap2::{Mmap, MmapMut};
use rand::Rng;
use std::ffi::CString;
use std::fs::File;
use std::io;
use std::ops::Deref;
use std::os::fd::FromRawFd;

/// Mapping state carried with every region.
#[derive(Debug)]
pub enum RegionState {
    /// The producer's read-write mapping is still live.
    Mapped(MmapMut),
    /// The producer released its mapping after filling; only the memfd
    /// handle remains.
    Unmapped,
}

/// One anonymous shared-memory region awaiting persistence.
#[derive(Debug)]
pub struct MappedRegion {
    name: String,
    len: usize,
    backing: File,
    state: RegionState,
}

impl MappedRegion {
    /// Allocate a new shared-memory object of `len` bytes and map it
    /// read-write. Allocation or mapping failure is fatal to the caller.
    pub fn create(name: &str, len: usize) -> Result<Self> {
        let c_name = CString::new(name)
            .map_err(|e| StressError::Mapping(io::Error::new(io::ErrorKind::InvalidInput, e)))?;
        let fd = unsafe { libc::memfd_create(c_name.as_ptr(), libc::MFD_CLOEXEC) };
        if fd < 0 {
            return Err(StressError::Mapping(io::Error::last_os_error()));
        }
        let backing = unsafe { File::from_raw_fd(fd) };
        backing.set_len(len as u64).map_err(StressError::Mapping)?;
        let map = unsafe { MmapMut::map_mut(&backing) }.map_err(StressError::Mapping)?;
        Ok(Self {
            name: name.to_string(),
            len,
            backing,
            state: RegionState::Mapped(map),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_mapped(&self) -> bool {
        matches!(self.state, RegionState::Mapped(_))
    }

    /// Release the producer-side mapping. Idempotent; the underlying
    /// shared-memory object stays alive for the drainer.
    pub fn unmap(&mut self) {
        self.state = RegionState::Unmapped;
    }

    /// Mutable access to the region's bytes while the producer mapping is
    /// live. `None` after [`unmap`](Self::unmap).
    pub fn as_mut_slice(&mut self) -> Option<&mut [u8]> {
        match self.state {
            RegionState::Mapped(ref mut map) => Some(&mut map[..]),
            RegionState::Unmapped => None,
        }
    }

    /// Read view for draining. Borrows the live mapping when the region is
    /// still mapped; otherwise maps a fresh read-only accessor from the
    /// memfd handle, which is dropped with the returned view.
    pub fn view(&self) -> Result<RegionView<'_>> {
        match self.state {
            RegionState::Mapped(ref map) => Ok(RegionView::Resident(&map[..])),
            RegionState::Unmapped => {
                let map = unsafe { Mmap::map(&self.backing) }.map_err(StressError::Mapping)?;
                Ok(RegionView::Fresh(map))
            }
        }
    }
}

/// Byte view of a region's content at drain time.
pub enum RegionView<'a> {
    Resident(&'a [u8]),
    Fresh(Mmap),
}

impl Deref for RegionView<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            RegionView::Resident(slice) => slice,
            RegionView::Fresh(map) => &map[..],
        }
    }
}

/// Produces filled regions at the producer's request.
///
/// `unmap_after_fill=false` ("no unmap") keeps every produced region's
/// pages resident until the drainer writes them out.
pub struct RegionFactory {
    region_len: usize,
    unmap_after_fill: bool,
    block: Box<[u64]>,
    seq: u64,
}

impl RegionFactory {
    /// `region_len` must be a positive multiple of 8 bytes (file sizes are
    /// whole megabytes in practice).
    pub fn new(region_len: usize, unmap_after_fill: bool, rng: &mut impl Rng) -> Self {
        assert!(region_len > 0 && region_len % 8 == 0, "region length must be a positive multiple of 8");
        let mut block = vec![0u64; region_len / 8].into_boxed_slice();
        rng.fill(&mut block[..]);
        Self {
            region_len,
            unmap_after_fill,
            block,
            // Offset zero would XOR the block with itself and fill the
            // first region with zeros, so the sequence starts at one.
            seq: 1,
        }
    }

    /// Create, fill, and (depending on configuration) unmap one region.
    pub fn produce(&mut self, rng: &mut impl Rng) -> Result<MappedRegion> {
        let name = format!("region-{}{}", rng.gen::<u32>(), rng.gen::<u32>());
        let mut region = MappedRegion::create(&name, self.region_len)?;

        let words = self.block.len();
        // Advance by an odd stride so successive regions pick well-spread
        // second offsets even for power-of-two block sizes. A zero offset
        // would XOR the block with itself and emit an all-zero region, so
        // those sequence points are skipped.
        let mut off = (self.seq as usize).wrapping_mul(0x9E37) % words;
        self.seq = self.seq.wrapping_add(1);
        while off == 0 && words > 1 {
            off = (self.seq as usize).wrapping_mul(0x9E37) % words;
            self.seq = self.seq.wrapping_add(1);
        }

        if let RegionState::Mapped(ref mut map) = region.state {
            for (i, chunk) in map.chunks_exact_mut(8).enumerate() {
                let value = self.block[i] ^ self.block[(i + off) % words];
                chunk.copy_from_slice(&value.to_ne_bytes());
            }
        }

        if self.unmap_after_fill {
            region.unmap();
        }
        Ok(region)
    }
}
