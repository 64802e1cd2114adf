//! Physical and Virtual Address types.
//!
//! This module defines strong types for physical and virtual addresses to prevent
//! accidental mixing of address spaces. It provides the following:
//! 1. **Type Safety:** Distinguishes the CPU view (virtual) from the device view (physical).
//! 2. **Address Arithmetic:** Offsetting and distance helpers used when splitting buffers.
//! 3. **Display:** Hexadecimal formatting for log lines and error messages.

use std::fmt;

use serde::Serialize;

/// A virtual address as seen by the processor element running the test.
///
/// The CPU accesses coherent buffers through virtual addresses; the cache model
/// and the memory attribute apply to these accesses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct VirtAddr(pub u64);

/// A physical address as programmed into an exerciser's DMA engine.
///
/// Devices access host memory through physical addresses only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PhysAddr(pub u64);

impl VirtAddr {
    /// Creates a new virtual address from a raw 64-bit value.
    #[inline(always)]
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    /// Returns the raw 64-bit address value.
    #[inline(always)]
    pub const fn val(&self) -> u64 {
        self.0
    }

    /// Returns this address advanced by `bytes`.
    ///
    /// # Arguments
    ///
    /// * `bytes` - The byte offset to add.
    ///
    /// # Returns
    ///
    /// The offset address, wrapping at the top of the 64-bit space.
    #[inline]
    pub const fn offset(&self, bytes: u64) -> Self {
        Self(self.0.wrapping_add(bytes))
    }
}

impl PhysAddr {
    /// Creates a new physical address from a raw 64-bit value.
    #[inline(always)]
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    /// Returns the raw 64-bit address value.
    #[inline(always)]
    pub const fn val(&self) -> u64 {
        self.0
    }

    /// Returns this address advanced by `bytes`.
    #[inline]
    pub const fn offset(&self, bytes: u64) -> Self {
        Self(self.0.wrapping_add(bytes))
    }
}

impl fmt::Display for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl fmt::Display for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}
