//! Host memory and the CPU's write-back cache.
//!
//! This module models the part of the host that decides whether a No-Snoop DMA observes the
//! data the CPU wrote. It provides:
//! 1. **DRAM:** A byte array backing the coherent pool, addressed physically.
//! 2. **Pool allocator:** First-fit allocation of aligned ranges with a coalescing free list.
//! 3. **CPU cache:** Write-back, write-allocate lines in front of DRAM for cacheable memory.
//! 4. **DMA paths:** Device reads and writes that either snoop the cache or go to DRAM only.
//!
//! # Coherency model
//!
//! A snooping device read returns dirty cache data; a snooping device write updates any cached
//! copy. A non-snooping access only touches DRAM, so it reads stale DRAM under dirty lines and
//! leaves stale lines over what it wrote.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{trace, warn};

use crate::common::{BufferRegion, PhysAddr, VirtAddr};
use crate::config::{MemoryAttribute, MemoryConfig};

/// Allocator and cache counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MemoryStats {
    /// Successful allocations.
    pub allocations: u64,
    /// Successful releases.
    pub releases: u64,
    /// Allocation requests that could not be satisfied.
    pub failed_allocations: u64,
    /// Releases of ranges that were not allocated.
    pub invalid_releases: u64,
    /// Bytes currently allocated.
    pub live_bytes: usize,
    /// CPU accesses that hit a cached line.
    pub cache_hits: u64,
    /// CPU accesses that filled a line from DRAM.
    pub cache_misses: u64,
}

#[derive(Clone, Debug)]
struct CacheLine {
    data: Vec<u8>,
    dirty: bool,
}

/// Write-back, write-allocate CPU data cache of unbounded capacity.
#[derive(Clone, Debug)]
pub struct CpuCache {
    line_bytes: u64,
    lines: BTreeMap<u64, CacheLine>,
}

impl CpuCache {
    /// Creates an empty cache; `line_bytes` must be a power of two.
    pub const fn new(line_bytes: usize) -> Self {
        Self {
            line_bytes: line_bytes as u64,
            lines: BTreeMap::new(),
        }
    }

    const fn line_of(&self, phys: u64) -> (u64, usize) {
        let base = phys & !(self.line_bytes - 1);
        (base, (phys - base) as usize)
    }

    /// Number of lines currently held.
    pub fn resident_lines(&self) -> usize {
        self.lines.len()
    }

    /// Number of dirty lines currently held.
    pub fn dirty_lines(&self) -> usize {
        self.lines.values().filter(|l| l.dirty).count()
    }

    /// Writes every dirty line back to DRAM and drops all lines.
    pub fn clean_invalidate(&mut self, dram: &mut Dram) {
        for (base, line) in std::mem::take(&mut self.lines) {
            if line.dirty {
                dram.write(base, &line.data);
            }
        }
    }
}

/// Physically addressed DRAM backing the coherent pool.
#[derive(Clone, Debug)]
pub struct Dram {
    base: u64,
    bytes: Vec<u8>,
}

impl Dram {
    fn new(base: u64, size: usize) -> Self {
        Self {
            base,
            bytes: vec![0; size],
        }
    }

    fn index(&self, phys: u64) -> Option<usize> {
        let offset = phys.checked_sub(self.base)?;
        let offset = usize::try_from(offset).ok()?;
        (offset < self.bytes.len()).then_some(offset)
    }

    /// Returns `true` if `[phys, phys + len)` lies inside DRAM.
    pub fn contains(&self, phys: u64, len: usize) -> bool {
        match (self.index(phys), len) {
            (Some(_), 0) => true,
            (Some(start), len) => start.checked_add(len).is_some_and(|end| end <= self.bytes.len()),
            (None, _) => false,
        }
    }

    fn read_byte(&self, phys: u64) -> u8 {
        self.index(phys).map_or(0, |i| self.bytes[i])
    }

    fn write_byte(&mut self, phys: u64, value: u8) {
        if let Some(i) = self.index(phys) {
            self.bytes[i] = value;
        }
    }

    fn write(&mut self, phys: u64, data: &[u8]) {
        for (i, byte) in data.iter().enumerate() {
            self.write_byte(phys + i as u64, *byte);
        }
    }

    /// Reads DRAM directly, bypassing any cache.
    pub fn peek(&self, phys: PhysAddr, buf: &mut [u8]) {
        for (i, byte) in buf.iter_mut().enumerate() {
            *byte = self.read_byte(phys.val() + i as u64);
        }
    }
}

/// Host memory: DRAM, the coherent pool allocator, and the CPU cache.
#[derive(Clone, Debug)]
pub struct HostMemory {
    dram: Dram,
    cache: CpuCache,
    attribute: MemoryAttribute,
    virt_offset: u64,
    align: usize,
    /// Free ranges of the pool as `offset -> len`, non-adjacent.
    free: BTreeMap<usize, usize>,
    /// Live allocations as `offset -> len`.
    live: BTreeMap<usize, usize>,
    stats: MemoryStats,
}

impl HostMemory {
    /// Creates host memory for the pool described by `config`.
    pub fn new(config: &MemoryConfig) -> Self {
        let mut free = BTreeMap::new();
        if config.pool_size > 0 {
            let _ = free.insert(0, config.pool_size);
        }
        Self {
            dram: Dram::new(config.pool_base, config.pool_size),
            cache: CpuCache::new(config.cache_line_bytes),
            attribute: config.attribute,
            virt_offset: config.virt_offset,
            align: config.alloc_align.max(1),
            free,
            live: BTreeMap::new(),
            stats: MemoryStats::default(),
        }
    }

    /// Attribute of pool allocations.
    pub const fn attribute(&self) -> MemoryAttribute {
        self.attribute
    }

    /// Allocator and cache counters.
    pub const fn stats(&self) -> MemoryStats {
        self.stats
    }

    /// The CPU cache.
    pub const fn cache(&self) -> &CpuCache {
        &self.cache
    }

    /// DRAM without the cache in front of it.
    pub const fn dram(&self) -> &Dram {
        &self.dram
    }

    /// Writes back and drops every cached line.
    pub fn flush_cache(&mut self) {
        self.cache.clean_invalidate(&mut self.dram);
    }

    /// CPU virtual address of `phys`.
    pub const fn phys_to_virt(&self, phys: PhysAddr) -> VirtAddr {
        VirtAddr(phys.val().wrapping_add(self.virt_offset))
    }

    /// Physical address behind `virt`.
    pub const fn virt_to_phys(&self, virt: VirtAddr) -> PhysAddr {
        PhysAddr(virt.val().wrapping_sub(self.virt_offset))
    }

    /// Allocates `size` bytes from the pool, first fit, aligned to the pool alignment.
    ///
    /// # Returns
    ///
    /// The allocated range in both address spaces, or `None` when `size` is zero or no free
    /// range is large enough.
    pub fn alloc(&mut self, size: usize) -> Option<BufferRegion> {
        let Some(rounded) = size
            .checked_next_multiple_of(self.align)
            .filter(|&r| r > 0)
        else {
            self.stats.failed_allocations += 1;
            return None;
        };

        let Some((&offset, &len)) = self.free.iter().find(|&(_, &len)| len >= rounded) else {
            self.stats.failed_allocations += 1;
            warn!(size, "coherent pool exhausted");
            return None;
        };

        let _ = self.free.remove(&offset);
        if len > rounded {
            let _ = self.free.insert(offset + rounded, len - rounded);
        }
        let _ = self.live.insert(offset, rounded);
        self.stats.allocations += 1;
        self.stats.live_bytes += rounded;

        let phys = PhysAddr(self.dram.base + offset as u64);
        trace!(%phys, size, rounded, "coherent alloc");
        Some(BufferRegion::new(self.phys_to_virt(phys), phys, size))
    }

    /// Returns the allocation starting at `phys` to the pool.
    ///
    /// # Returns
    ///
    /// `false` if no allocation starts at `phys`; the pool is left unchanged.
    pub fn free(&mut self, phys: PhysAddr) -> bool {
        let Some(offset) = self.dram.index(phys.val()) else {
            self.stats.invalid_releases += 1;
            return false;
        };
        let Some(len) = self.live.remove(&offset) else {
            self.stats.invalid_releases += 1;
            return false;
        };
        self.stats.releases += 1;
        self.stats.live_bytes -= len;
        trace!(%phys, len, "coherent free");

        let end = offset + len;
        let mut start = offset;
        let mut total = len;
        let prev = self.free.range(..offset).next_back().map(|(&p, &l)| (p, l));
        if let Some((prev, prev_len)) = prev.filter(|&(p, l)| p + l == offset) {
            let _ = self.free.remove(&prev);
            start = prev;
            total += prev_len;
        }
        if let Some(next_len) = self.free.remove(&end) {
            total += next_len;
        }
        let _ = self.free.insert(start, total);
        true
    }

    /// Number of live allocations.
    pub fn live_allocations(&self) -> usize {
        self.live.len()
    }

    /// CPU store through the memory attribute of the pool.
    pub fn cpu_write(&mut self, virt: VirtAddr, data: &[u8]) {
        let phys = self.virt_to_phys(virt).val();
        if !self.dram.contains(phys, data.len()) {
            warn!(%virt, len = data.len(), "CPU write outside host memory ignored");
            return;
        }
        match self.attribute {
            MemoryAttribute::NonCacheable => self.dram.write(phys, data),
            MemoryAttribute::Cacheable => {
                for (i, byte) in data.iter().enumerate() {
                    let (line, offset) = self.cached_line(phys + i as u64);
                    line.data[offset] = *byte;
                    line.dirty = true;
                }
            }
        }
    }

    /// CPU load through the memory attribute of the pool.
    pub fn cpu_read(&mut self, virt: VirtAddr, buf: &mut [u8]) {
        let phys = self.virt_to_phys(virt).val();
        if !self.dram.contains(phys, buf.len()) {
            warn!(%virt, len = buf.len(), "CPU read outside host memory returns zeros");
            buf.fill(0);
            return;
        }
        match self.attribute {
            MemoryAttribute::NonCacheable => self.dram.peek(PhysAddr(phys), buf),
            MemoryAttribute::Cacheable => {
                for (i, byte) in buf.iter_mut().enumerate() {
                    let (line, offset) = self.cached_line(phys + i as u64);
                    *byte = line.data[offset];
                }
            }
        }
    }

    fn cached_line(&mut self, phys: u64) -> (&mut CacheLine, usize) {
        let (base, offset) = self.cache.line_of(phys);
        if self.cache.lines.contains_key(&base) {
            self.stats.cache_hits += 1;
        } else {
            self.stats.cache_misses += 1;
        }
        let line_bytes = self.cache.line_bytes;
        let dram = &self.dram;
        let line = self.cache.lines.entry(base).or_insert_with(|| CacheLine {
            data: (0..line_bytes).map(|i| dram.read_byte(base + i)).collect(),
            dirty: false,
        });
        (line, offset)
    }

    /// Device read of host memory.
    ///
    /// # Arguments
    ///
    /// * `phys` - Physical start of the transfer.
    /// * `buf` - Destination in the device.
    /// * `snoop` - Whether the access is looked up in the CPU cache.
    ///
    /// # Returns
    ///
    /// `false` if the range is not backed by DRAM; `buf` is untouched.
    pub fn dma_read(&self, phys: PhysAddr, buf: &mut [u8], snoop: bool) -> bool {
        if !self.dram.contains(phys.val(), buf.len()) {
            return false;
        }
        for (i, byte) in buf.iter_mut().enumerate() {
            let addr = phys.val() + i as u64;
            let (base, offset) = self.cache.line_of(addr);
            *byte = match self.cache.lines.get(&base) {
                Some(line) if snoop && line.dirty => line.data[offset],
                _ => self.dram.read_byte(addr),
            };
        }
        true
    }

    /// Device write of host memory.
    ///
    /// A snooping write also updates any cached copy; a non-snooping write leaves cached
    /// copies as they were.
    ///
    /// # Returns
    ///
    /// `false` if the range is not backed by DRAM; memory is untouched.
    pub fn dma_write(&mut self, phys: PhysAddr, data: &[u8], snoop: bool) -> bool {
        if !self.dram.contains(phys.val(), data.len()) {
            return false;
        }
        self.dram.write(phys.val(), data);
        if snoop {
            for (i, byte) in data.iter().enumerate() {
                let (base, offset) = self.cache.line_of(phys.val() + i as u64);
                if let Some(line) = self.cache.lines.get_mut(&base) {
                    line.data[offset] = *byte;
                }
            }
        }
        true
    }
}
