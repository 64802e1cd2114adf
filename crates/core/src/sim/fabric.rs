//! PCIe configuration space of the simulated platform.
//!
//! Every configured function answers with a minimal header: vendor and device ID, class code,
//! header type, and the interrupt line and pin registers. Functions are kept in BDF order so a
//! class-code search is a range scan from the cursor.

use std::collections::BTreeMap;

use crate::common::constants::EXERCISER_CLASSCODE;
use crate::common::{Bdf, TopologyError};
use crate::config::{IntxConfig, PcieConfig};
use crate::platform::{DeviceHandle, LegacyIrqMap};

/// Vendor ID reported by every simulated function.
const VENDOR_ID: u16 = 0x13B5;

/// Device ID reported by every simulated function.
const DEVICE_ID: u16 = 0xED01;

/// Size of a function's configuration space (PCIe extended).
const CONFIG_SPACE_SIZE: u16 = 0x1000;

/// Class code whose functions carry a type-1 (bridge) header.
const BRIDGE_CLASS: u32 = 0x06_04;

#[derive(Clone, Debug)]
struct Function {
    class_code: u32,
    intx: Option<IntxConfig>,
    root_port: Option<Bdf>,
}

/// PCIe fabric: functions, root ports, and their legacy interrupt routing.
#[derive(Clone, Debug)]
pub struct PcieFabric {
    segment: u16,
    start_bus: u8,
    functions: BTreeMap<Bdf, Function>,
    irq_maps: BTreeMap<Bdf, Option<LegacyIrqMap>>,
    exerciser_count: u32,
}

impl PcieFabric {
    /// Builds the fabric described by `config`.
    pub fn new(config: &PcieConfig) -> Self {
        let mut functions = BTreeMap::new();
        let mut irq_maps = BTreeMap::new();

        for rp in &config.root_ports {
            let _ = functions.insert(
                rp.bdf,
                Function {
                    class_code: PcieConfig::root_port_class_code(),
                    intx: None,
                    root_port: None,
                },
            );
            let _ = irq_maps.insert(rp.bdf, rp.irq_map.clone());
        }
        for other in &config.functions {
            let _ = functions.insert(
                other.bdf,
                Function {
                    class_code: other.class_code,
                    intx: None,
                    root_port: None,
                },
            );
        }
        for exerciser in &config.exercisers {
            let _ = functions.insert(
                exerciser.bdf,
                Function {
                    class_code: EXERCISER_CLASSCODE,
                    intx: exerciser.intx,
                    root_port: exerciser.root_port,
                },
            );
        }

        let configured = u32::try_from(config.exercisers.len()).unwrap_or(u32::MAX);
        Self {
            segment: config.segment,
            start_bus: config.start_bus,
            functions,
            irq_maps,
            exerciser_count: config.reported_exercisers.unwrap_or(configured),
        }
    }

    /// Exerciser count reported to software.
    pub const fn exerciser_count(&self) -> u32 {
        self.exerciser_count
    }

    /// Segment of ECAM region `index`; the fabric has a single region.
    pub const fn segment(&self, _index: usize) -> u16 {
        self.segment
    }

    /// First bus of ECAM region `index`; the fabric has a single region.
    pub const fn start_bus(&self, _index: usize) -> u8 {
        self.start_bus
    }

    /// First function at or after `start` with `class_code`.
    pub fn find(&self, class_code: u32, start: Bdf) -> Option<Bdf> {
        self.functions
            .range(start..)
            .find(|(_, f)| f.class_code == class_code)
            .map(|(bdf, _)| *bdf)
    }

    /// Handle encoding the function's routing ID and segment.
    pub const fn handle(bdf: Bdf) -> DeviceHandle {
        DeviceHandle(
            ((bdf.segment as u64) << 16)
                | ((bdf.bus as u64) << 8)
                | ((bdf.device as u64) << 3)
                | bdf.function as u64,
        )
    }

    fn function(&self, bdf: Bdf) -> Result<&Function, TopologyError> {
        self.functions
            .get(&bdf)
            .ok_or(TopologyError::NoSuchFunction(bdf))
    }

    /// Reads one byte of configuration space.
    ///
    /// # Errors
    ///
    /// Returns `TopologyError::NoSuchFunction` for an empty slot and
    /// `TopologyError::ConfigOffset` past the end of configuration space.
    pub fn read_config_byte(&self, bdf: Bdf, offset: u16) -> Result<u8, TopologyError> {
        let function = self.function(bdf)?;
        if offset >= CONFIG_SPACE_SIZE {
            return Err(TopologyError::ConfigOffset { bdf, offset });
        }
        let [vendor_lo, vendor_hi] = VENDOR_ID.to_le_bytes();
        let [device_lo, device_hi] = DEVICE_ID.to_le_bytes();
        let [prog_if, sub_class, base_class, _] = function.class_code.to_le_bytes();
        let intx = function.intx.unwrap_or(IntxConfig { pin: 0, line: 0 });

        let value = match offset {
            0x00 => vendor_lo,
            0x01 => vendor_hi,
            0x02 => device_lo,
            0x03 => device_hi,
            0x08 => 0x01,
            0x09 => prog_if,
            0x0A => sub_class,
            0x0B => base_class,
            0x0E => u8::from(function.class_code >> 8 == BRIDGE_CLASS),
            0x3C => intx.line,
            0x3D => intx.pin,
            _ => 0,
        };
        Ok(value)
    }

    /// Root port above `bdf`.
    ///
    /// # Errors
    ///
    /// Returns `TopologyError::NoSuchFunction` for an empty slot and
    /// `TopologyError::NoRootPort` when the function has no upstream root port.
    pub fn root_port(&self, bdf: Bdf) -> Result<Bdf, TopologyError> {
        self.function(bdf)?
            .root_port
            .ok_or(TopologyError::NoRootPort(bdf))
    }

    /// Legacy interrupt routing of `root_port`.
    ///
    /// # Errors
    ///
    /// Returns `TopologyError::NoLegacyIrqMap` when the root port publishes none.
    pub fn legacy_irq_map(&self, root_port: Bdf) -> Result<LegacyIrqMap, TopologyError> {
        self.irq_maps
            .get(&root_port)
            .and_then(Clone::clone)
            .ok_or(TopologyError::NoLegacyIrqMap(root_port))
    }
}
