//! Exerciser test pool.
//!
//! Tests in this module drive a PCIe exerciser card (a device whose transactions the suite can
//! script) to check platform behaviour. It provides:
//! 1. **Enumeration:** Walking exerciser functions in configuration space, one instance at a time.
//! 2. **Buffer initialization:** The sentinel pattern written to DMA source buffers.
//! 3. **e006:** Legacy INTx delivery through the root port's interrupt routing.
//! 4. **e007:** I/O coherency of No-Snoop DMA against coherent memory.

/// Sentinel fill of DMA source buffers.
pub mod buffer;
/// Legacy interrupt test (test 806).
pub mod e006;
/// No-Snoop I/O coherency test (test 807).
pub mod e007;
/// Exerciser enumeration over configuration space.
pub mod enumerator;

pub use buffer::{fill_pattern, init_source_buf_data};
pub use enumerator::ExerciserEnumerator;
