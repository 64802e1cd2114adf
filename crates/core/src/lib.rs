//! PCIe exerciser conformance test library.
//!
//! This crate implements exerciser-driven PCIe compliance tests and the platform they run on:
//! 1. **Tests:** I/O coherency under No-Snoop DMA (test 807) and legacy INTx delivery (test 806).
//! 2. **Platform boundary:** Typed capability traits for PE info, topology, coherent memory,
//!    exerciser control, and interrupts.
//! 3. **Status:** Result-word encoding, per-PE status table, and suite-level verdicts.
//! 4. **Suite:** Test registry and the initialize/run/check/report driver sequence.
//! 5. **Simulation:** A software platform (host memory with a write-back cache, PCIe fabric,
//!    DMA interconnect, interrupt controller) that implements the boundary traits.

/// Common types and constants (addresses, BDFs, buffer regions, errors).
pub mod common;
/// Configuration (defaults, hierarchical config structures, validation).
pub mod config;
/// Explicit per-run test context (level, status table, device records).
pub mod context;
/// Exerciser test pool (enumerator, buffer initializer, e006, e007).
pub mod exerciser;
/// Abstraction boundary between the tests and the platform.
pub mod platform;
/// Simulated platform implementing the abstraction boundary.
pub mod sim;
/// Result words, outcomes, and suite status codes.
pub mod status;
/// Test registry, driver sequence, and reports.
pub mod suite;

/// Root configuration type; use `Config::default()` or load from JSON.
pub use crate::config::Config;
/// Per-run context threaded through every test operation.
pub use crate::context::TestContext;
/// Object-safe union of all platform capabilities.
pub use crate::platform::Platform;
/// Simulated platform; construct with `SimPlatform::new`.
pub use crate::sim::SimPlatform;
/// Suite-level status code returned by each test.
pub use crate::status::AvsStatus;
