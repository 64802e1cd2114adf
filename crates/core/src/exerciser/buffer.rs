//! Sentinel fill of DMA source buffers.

use crate::common::BufferRegion;
use crate::common::constants::TEST_DATA;
use crate::platform::CoherentMemory;

/// Sets every byte of `buf` to the test sentinel.
pub fn fill_pattern(buf: &mut [u8]) {
    buf.fill(TEST_DATA);
}

/// Writes the test sentinel to every byte of `region` through the CPU view of memory.
///
/// Only `[region.virt, region.virt + region.len)` is touched.
pub fn init_source_buf_data<M: CoherentMemory + ?Sized>(memory: &mut M, region: BufferRegion) {
    let mut data = vec![0; region.len];
    fill_pattern(&mut data);
    memory.write_bytes(region.virt, &data);
}
