//! Coherent buffers and the regions carved out of them.
//!
//! A `CoherentBuffer` is the single owned handle to one coherent allocation. It is neither
//! `Clone` nor `Copy`, and the platform's release call consumes it, so an allocation is
//! released at most once. `BufferRegion` is a borrowed-by-value view (virtual base, physical
//! base, length) used to describe DMA sources and destinations; the halves of a buffer are
//! derived by splitting, which keeps them disjoint and keeps virtual and physical offsets in
//! step.

use super::addr::{PhysAddr, VirtAddr};

/// A contiguous range of host memory described in both address spaces.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferRegion {
    /// CPU-visible start of the range.
    pub virt: VirtAddr,
    /// Device-visible start of the range.
    pub phys: PhysAddr,
    /// Length in bytes.
    pub len: usize,
}

impl BufferRegion {
    /// Creates a new region.
    pub const fn new(virt: VirtAddr, phys: PhysAddr, len: usize) -> Self {
        Self { virt, phys, len }
    }

    /// Splits the region at `mid` bytes.
    ///
    /// # Arguments
    ///
    /// * `mid` - Length of the first part; clamped to the region length.
    ///
    /// # Returns
    ///
    /// `(head, tail)` where `head` covers `[0, mid)` and `tail` covers `[mid, len)`.
    pub fn split_at(self, mid: usize) -> (Self, Self) {
        let mid = mid.min(self.len);
        let head = Self::new(self.virt, self.phys, mid);
        let tail = Self::new(
            self.virt.offset(mid as u64),
            self.phys.offset(mid as u64),
            self.len - mid,
        );
        (head, tail)
    }

    /// Returns the first physical address past the end of the region.
    pub const fn phys_end(&self) -> PhysAddr {
        self.phys.offset(self.len as u64)
    }

    /// Returns `true` if the two regions share any byte in either address space.
    pub const fn overlaps(&self, other: &Self) -> bool {
        let virt = self.virt.0 < other.virt.0 + other.len as u64
            && other.virt.0 < self.virt.0 + self.len as u64;
        let phys = self.phys.0 < other.phys.0 + other.len as u64
            && other.phys.0 < self.phys.0 + self.len as u64;
        virt || phys
    }
}

/// An owned coherent allocation returned by the platform allocator.
#[derive(Debug, PartialEq, Eq)]
pub struct CoherentBuffer {
    region: BufferRegion,
}

impl CoherentBuffer {
    /// Wraps a fresh allocation. Only allocators should call this.
    pub const fn new(virt: VirtAddr, phys: PhysAddr, len: usize) -> Self {
        Self {
            region: BufferRegion::new(virt, phys, len),
        }
    }

    /// CPU-visible base address.
    pub const fn virt(&self) -> VirtAddr {
        self.region.virt
    }

    /// Device-visible base address.
    pub const fn phys(&self) -> PhysAddr {
        self.region.phys
    }

    /// Allocation size in bytes.
    pub const fn len(&self) -> usize {
        self.region.len
    }

    /// Returns `true` for a zero-length allocation.
    pub const fn is_empty(&self) -> bool {
        self.region.len == 0
    }

    /// The whole allocation as a region.
    pub const fn region(&self) -> BufferRegion {
        self.region
    }

    /// Splits the allocation at its midpoint into `(source, destination)`.
    ///
    /// Both halves are `len / 2` bytes; for an odd length the last byte belongs to neither.
    pub fn halves(&self) -> (BufferRegion, BufferRegion) {
        let half = self.region.len / 2;
        let (source, rest) = self.region.split_at(half);
        let (destination, _) = rest.split_at(half);
        (source, destination)
    }
}
