//! Common utilities and types used throughout the exerciser test suite.
//!
//! This module provides the building blocks shared by the tests, the platform boundary,
//! and the simulator. It includes:
//! 1. **Address Types:** Strong types for virtual and physical addresses.
//! 2. **BDF:** Segment/bus/device/function addressing with a monotonic successor.
//! 3. **Buffer Regions:** Coherent allocations and the non-overlapping halves derived from them.
//! 4. **Constants:** Test numbers, buffer sizes, patterns, and status codes.
//! 5. **Error Handling:** Typed errors for exerciser control, topology, interrupts, and config.

/// Address type definitions (physical and virtual addresses).
pub mod addr;

/// PCIe segment/bus/device/function addresses.
pub mod bdf;

/// Common constants used throughout the suite.
pub mod constants;

/// Error types for every collaborator concern.
pub mod error;

/// Coherent buffer and sub-range types.
pub mod region;

pub use addr::{PhysAddr, VirtAddr};
pub use bdf::Bdf;
pub use error::{ConfigError, EnumerationError, ExerciserError, IrqError, TopologyError};
pub use region::{BufferRegion, CoherentBuffer};
