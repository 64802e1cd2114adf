//! Simulated platform.
//!
//! This module assembles a software platform from a `Config` and implements every trait of the
//! platform boundary on it. It provides:
//! 1. **Memory:** DRAM, a coherent pool allocator, and a write-back CPU cache.
//! 2. **Interconnect:** Exerciser cards and the DMA path that honours or ignores No-Snoop.
//! 3. **Fabric:** Configuration space, root ports, and legacy interrupt routing.
//! 4. **Interrupts:** A level-sensitive controller that runs installed handlers on poll.

/// PCIe configuration space and routing.
pub mod fabric;
/// Interrupt controller.
pub mod gic;
/// DMA interconnect and exerciser models.
pub mod interconnect;
/// Host memory, pool allocator, and CPU cache.
pub mod memory;

use tracing::{debug, warn};

use crate::common::{Bdf, CoherentBuffer, ExerciserError, IrqError, TopologyError, VirtAddr};
use crate::config::{Config, PeConfig};
use crate::platform::{
    CoherentMemory, DeviceHandle, ExerciserControl, ExerciserOp, ExerciserParam, ExerciserRef,
    InterruptController, IsrHandler, LegacyIrqMap, PcieTopology, PeInfo,
};

pub use fabric::PcieFabric;
pub use gic::Gic;
pub use interconnect::{DmaStats, Interconnect, SimExerciser};
pub use memory::{HostMemory, MemoryStats};

/// A complete simulated platform.
#[derive(Debug)]
pub struct SimPlatform {
    pe: PeConfig,
    fabric: PcieFabric,
    interconnect: Interconnect,
    gic: Gic,
}

impl SimPlatform {
    /// Builds the platform described by `config`.
    ///
    /// The configuration is expected to be validated; `Config::from_json` and
    /// `Config::from_file` already do so.
    pub fn new(config: &Config) -> Self {
        let memory = HostMemory::new(&config.memory);
        let exercisers = config.pcie.exercisers.iter().map(SimExerciser::new).collect();
        let interconnect =
            Interconnect::new(memory, exercisers, config.interconnect.honor_no_snoop);
        debug!(
            exercisers = config.pcie.exercisers.len(),
            attribute = ?config.memory.attribute,
            honor_no_snoop = config.interconnect.honor_no_snoop,
            "simulated platform built"
        );
        Self {
            pe: config.pe.clone(),
            fabric: PcieFabric::new(&config.pcie),
            interconnect,
            gic: Gic::new(config.interrupts.max_line),
        }
    }

    /// Host memory.
    pub const fn memory(&self) -> &HostMemory {
        self.interconnect.memory()
    }

    /// The interconnect and its exercisers.
    pub const fn interconnect(&self) -> &Interconnect {
        &self.interconnect
    }

    /// The interrupt controller.
    pub const fn gic(&self) -> &Gic {
        &self.gic
    }

    /// The PCIe fabric.
    pub const fn fabric(&self) -> &PcieFabric {
        &self.fabric
    }
}

impl PeInfo for SimPlatform {
    fn num_pe(&self) -> usize {
        self.pe.num_pe
    }

    fn current_pe_index(&self) -> usize {
        self.pe.current_pe
    }
}

impl PcieTopology for SimPlatform {
    fn exerciser_count(&self) -> u32 {
        self.fabric.exerciser_count()
    }

    fn ecam_segment(&self, index: usize) -> u16 {
        self.fabric.segment(index)
    }

    fn ecam_start_bus(&self, index: usize) -> u8 {
        self.fabric.start_bus(index)
    }

    fn find_bdf(&self, class_code: u32, start: Bdf) -> Option<Bdf> {
        self.fabric.find(class_code, start)
    }

    fn device_handle(&self, bdf: Bdf) -> DeviceHandle {
        PcieFabric::handle(bdf)
    }

    fn read_config_byte(&self, bdf: Bdf, offset: u16) -> Result<u8, TopologyError> {
        self.fabric.read_config_byte(bdf, offset)
    }

    fn root_port(&self, bdf: Bdf) -> Result<Bdf, TopologyError> {
        self.fabric.root_port(bdf)
    }

    fn legacy_irq_map(&self, root_port: Bdf) -> Result<LegacyIrqMap, TopologyError> {
        self.fabric.legacy_irq_map(root_port)
    }
}

impl CoherentMemory for SimPlatform {
    fn alloc_coherent(&mut self, device: &ExerciserRef, size: usize) -> Option<CoherentBuffer> {
        let region = self.interconnect.memory_mut().alloc(size)?;
        debug!(bdf = %device.bdf, phys = %region.phys, size, "coherent buffer allocated");
        Some(CoherentBuffer::new(region.virt, region.phys, region.len))
    }

    fn free_coherent(&mut self, device: &ExerciserRef, buffer: CoherentBuffer) {
        if self.interconnect.memory_mut().free(buffer.phys()) {
            debug!(bdf = %device.bdf, phys = %buffer.phys(), "coherent buffer released");
        } else {
            warn!(bdf = %device.bdf, phys = %buffer.phys(), "release of unknown coherent buffer");
        }
    }

    fn write_bytes(&mut self, addr: VirtAddr, data: &[u8]) {
        self.interconnect.memory_mut().cpu_write(addr, data);
    }

    fn read_bytes(&mut self, addr: VirtAddr, buf: &mut [u8]) {
        self.interconnect.memory_mut().cpu_read(addr, buf);
    }
}

impl ExerciserControl for SimPlatform {
    fn set_param(&mut self, param: ExerciserParam, instance: u32) -> Result<(), ExerciserError> {
        self.interconnect.set_param(param, instance)
    }

    fn ops(&mut self, op: ExerciserOp, instance: u32) -> Result<(), ExerciserError> {
        self.interconnect.ops(op, instance)
    }
}

impl InterruptController for SimPlatform {
    fn install_isr(&mut self, line: u32, handler: IsrHandler) -> Result<(), IrqError> {
        self.gic.install(line, handler)
    }

    fn free_interrupt(&mut self, line: u32) {
        if !self.gic.free(line) {
            debug!(line, "no handler to free");
        }
    }

    fn poll_interrupts(&mut self) {
        let _ = self.gic.dispatch(&mut self.interconnect);
    }
}
