//! Abstraction boundary between the tests and the platform.
//!
//! The tests never touch hardware directly. Everything they need is expressed as a small
//! capability trait:
//! 1. **`PeInfo`:** Which processor element is running and how many take part.
//! 2. **`PcieTopology`:** Exerciser count, ECAM base, class-code search, config reads, routing.
//! 3. **`CoherentMemory`:** Coherent allocation/release and the CPU view of memory.
//! 4. **`ExerciserControl`:** Parameter writes and commands addressed to an exerciser instance.
//! 5. **`InterruptController`:** ISR installation and delivery.
//!
//! `Platform` is the union of all five and is object safe, so tests take `&mut dyn Platform`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::common::{
    Bdf, CoherentBuffer, ExerciserError, IrqError, PhysAddr, TopologyError, VirtAddr,
};

/// Opaque platform handle for a PCIe function.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct DeviceHandle(pub u64);

/// One enumerated exerciser: where it lives and how to address it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ExerciserRef {
    /// Configuration-space address.
    pub bdf: Bdf,
    /// Instance number used for `ExerciserControl` calls.
    pub instance: u32,
    /// Platform handle used for memory allocation.
    pub handle: DeviceHandle,
}

/// Direction of an exerciser DMA relative to the device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DmaDirection {
    /// Device reads host memory into its buffer.
    ToDevice,
    /// Device writes its buffer into host memory.
    FromDevice,
}

/// Commands accepted by an exerciser.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExerciserOp {
    /// Start tagging outgoing TLPs with the No-Snoop attribute.
    NoSnoopTlpStart,
    /// Stop tagging outgoing TLPs with the No-Snoop attribute.
    NoSnoopTlpStop,
    /// Run one DMA using the last programmed attributes.
    StartDma(DmaDirection),
    /// Assert the legacy interrupt routed to this line.
    GenerateLegacyIntr(u32),
    /// Deassert the legacy interrupt routed to this line.
    ClearIntr(u32),
}

impl fmt::Display for ExerciserOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSnoopTlpStart => write!(f, "NO_SNOOP_TLP_START"),
            Self::NoSnoopTlpStop => write!(f, "NO_SNOOP_TLP_STOP"),
            Self::StartDma(DmaDirection::ToDevice) => write!(f, "START_DMA(TO_DEVICE)"),
            Self::StartDma(DmaDirection::FromDevice) => write!(f, "START_DMA(FROM_DEVICE)"),
            Self::GenerateLegacyIntr(line) => write!(f, "GENERATE_L_INTR({line})"),
            Self::ClearIntr(line) => write!(f, "CLEAR_INTR({line})"),
        }
    }
}

/// Parameters written to an exerciser ahead of a command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExerciserParam {
    /// Host buffer for the next DMA.
    DmaAttributes {
        /// Physical start of the host buffer.
        addr: PhysAddr,
        /// Transfer length in bytes.
        len: usize,
    },
}

/// Legacy INTx routing published by a root port: `irqs[n]` lists the interrupt IDs for INTA+n.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyIrqMap {
    /// Interrupt IDs per INTx pin (A, B, C, D).
    pub irqs: [Vec<u32>; 4],
}

/// Interrupt service routine. It receives the exerciser control interface so it can
/// acknowledge the device that raised the interrupt.
pub type IsrHandler = Box<dyn FnMut(&mut dyn ExerciserControl)>;

/// Processor-element information.
pub trait PeInfo {
    /// Number of processor elements in the system.
    fn num_pe(&self) -> usize;
    /// Index of the processor element executing the caller.
    fn current_pe_index(&self) -> usize;
}

/// PCIe topology queries.
pub trait PcieTopology {
    /// Number of exerciser cards present.
    fn exerciser_count(&self) -> u32;
    /// Segment of ECAM region `index`.
    fn ecam_segment(&self, index: usize) -> u16;
    /// First bus of ECAM region `index`.
    fn ecam_start_bus(&self, index: usize) -> u8;
    /// First function at or after `start` whose class code matches.
    fn find_bdf(&self, class_code: u32, start: Bdf) -> Option<Bdf>;
    /// Platform handle for a function.
    fn device_handle(&self, bdf: Bdf) -> DeviceHandle;
    /// Reads one byte of a function's configuration space.
    ///
    /// # Errors
    ///
    /// Returns `TopologyError` when the function or offset does not exist.
    fn read_config_byte(&self, bdf: Bdf, offset: u16) -> Result<u8, TopologyError>;
    /// Root port above a function.
    ///
    /// # Errors
    ///
    /// Returns `TopologyError::NoRootPort` when the function is not below a root port.
    fn root_port(&self, bdf: Bdf) -> Result<Bdf, TopologyError>;
    /// Legacy interrupt routing of a root port.
    ///
    /// # Errors
    ///
    /// Returns `TopologyError::NoLegacyIrqMap` when the platform publishes none.
    fn legacy_irq_map(&self, root_port: Bdf) -> Result<LegacyIrqMap, TopologyError>;
}

/// Coherent allocation and the CPU view of memory.
pub trait CoherentMemory {
    /// Allocates `size` bytes of DMA-visible memory for `device`.
    fn alloc_coherent(&mut self, device: &ExerciserRef, size: usize) -> Option<CoherentBuffer>;
    /// Releases an allocation made for `device`.
    fn free_coherent(&mut self, device: &ExerciserRef, buffer: CoherentBuffer);
    /// CPU store of `data` at `addr`.
    fn write_bytes(&mut self, addr: VirtAddr, data: &[u8]);
    /// CPU load of `buf.len()` bytes at `addr`.
    fn read_bytes(&mut self, addr: VirtAddr, buf: &mut [u8]);
}

/// Exerciser programming interface.
pub trait ExerciserControl {
    /// Writes a parameter set to an exerciser.
    ///
    /// # Errors
    ///
    /// Returns `ExerciserError` when the instance is unknown or rejects the write.
    fn set_param(&mut self, param: ExerciserParam, instance: u32) -> Result<(), ExerciserError>;
    /// Issues a command; DMA commands return once the transfer has completed or failed.
    ///
    /// # Errors
    ///
    /// Returns `ExerciserError` when the command fails.
    fn ops(&mut self, op: ExerciserOp, instance: u32) -> Result<(), ExerciserError>;
}

/// Interrupt controller interface.
pub trait InterruptController {
    /// Installs a handler for `line`.
    ///
    /// # Errors
    ///
    /// Returns `IrqError` when the line is out of range or already claimed.
    fn install_isr(&mut self, line: u32, handler: IsrHandler) -> Result<(), IrqError>;
    /// Removes the handler for `line`, if any.
    fn free_interrupt(&mut self, line: u32);
    /// Delivers any asserted interrupts to their handlers. Hardware delivers asynchronously,
    /// so a real implementation only needs to let time pass.
    fn poll_interrupts(&mut self);
}

/// Every capability the tests need.
pub trait Platform:
    PeInfo + PcieTopology + CoherentMemory + ExerciserControl + InterruptController
{
}

impl<T> Platform for T where
    T: PeInfo + PcieTopology + CoherentMemory + ExerciserControl + InterruptController
{
}
