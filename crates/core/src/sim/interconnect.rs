//! DMA interconnect and exerciser device models.
//!
//! The interconnect routes exerciser DMA to host memory. It provides:
//! 1. **Exerciser models:** Per-card No-Snoop enable, programmed DMA attributes, an internal
//!    buffer, INTx state, and injected faults.
//! 2. **DMA routing:** Transfers snoop the CPU cache unless the exerciser tags them No-Snoop
//!    and the fabric honours the attribute.
//! 3. **Command interface:** `ExerciserControl` addressed by instance number.
//!
//! Instance numbers follow ascending BDF order, the order in which enumeration finds cards.

use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::common::{Bdf, ExerciserError, PhysAddr};
use crate::config::{ExerciserConfig, ExerciserFaults, IntxConfig};
use crate::platform::{DmaDirection, ExerciserControl, ExerciserOp, ExerciserParam};

use super::memory::HostMemory;

/// DMA counters of the interconnect.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DmaStats {
    /// Completed transfers that snooped the CPU cache.
    pub snooped: u64,
    /// Completed transfers that bypassed the CPU cache.
    pub no_snoop: u64,
    /// Transfers that failed.
    pub faulted: u64,
}

/// One exerciser card.
#[derive(Clone, Debug)]
pub struct SimExerciser {
    bdf: Bdf,
    no_snoop: bool,
    dma: Option<(PhysAddr, usize)>,
    buffer: Vec<u8>,
    intx: Option<IntxConfig>,
    intx_asserted: bool,
    faults: ExerciserFaults,
}

impl SimExerciser {
    /// Builds the card described by `config`.
    pub fn new(config: &ExerciserConfig) -> Self {
        Self {
            bdf: config.bdf,
            no_snoop: false,
            dma: None,
            buffer: vec![0; config.dma_buffer_size],
            intx: config.intx,
            intx_asserted: false,
            faults: config.faults,
        }
    }

    /// Configuration-space address.
    pub const fn bdf(&self) -> Bdf {
        self.bdf
    }

    /// Whether outgoing TLPs carry the No-Snoop attribute.
    pub const fn no_snoop(&self) -> bool {
        self.no_snoop
    }

    /// Whether the card is asserting its legacy interrupt.
    pub const fn intx_asserted(&self) -> bool {
        self.intx_asserted
    }

    /// Interrupt ID the card's INTx is routed to, if wired.
    pub fn intx_line(&self) -> Option<u32> {
        self.intx
            .filter(|intx| intx.pin != 0)
            .map(|intx| u32::from(intx.line))
    }

    /// Bytes held in the card's DMA buffer.
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }
}

/// Interconnect between the exercisers and host memory.
#[derive(Debug)]
pub struct Interconnect {
    memory: HostMemory,
    exercisers: Vec<SimExerciser>,
    honor_no_snoop: bool,
    stats: DmaStats,
}

impl Interconnect {
    /// Creates the interconnect.
    ///
    /// # Arguments
    ///
    /// * `memory` - Host memory behind the interconnect.
    /// * `exercisers` - Cards in any order; they are numbered in ascending BDF order.
    /// * `honor_no_snoop` - Whether No-Snoop TLPs bypass the CPU cache.
    pub fn new(memory: HostMemory, mut exercisers: Vec<SimExerciser>, honor_no_snoop: bool) -> Self {
        exercisers.sort_by_key(SimExerciser::bdf);
        Self {
            memory,
            exercisers,
            honor_no_snoop,
            stats: DmaStats::default(),
        }
    }

    /// Host memory.
    pub const fn memory(&self) -> &HostMemory {
        &self.memory
    }

    /// Host memory, mutably.
    pub const fn memory_mut(&mut self) -> &mut HostMemory {
        &mut self.memory
    }

    /// Exerciser with `instance`.
    pub fn exerciser(&self, instance: u32) -> Option<&SimExerciser> {
        self.exercisers.get(instance as usize)
    }

    /// All exercisers in instance order.
    pub fn exercisers(&self) -> &[SimExerciser] {
        &self.exercisers
    }

    /// DMA counters.
    pub const fn stats(&self) -> DmaStats {
        self.stats
    }

    /// Interrupt IDs currently asserted by some exerciser.
    pub fn asserted_lines(&self) -> Vec<u32> {
        let mut lines: Vec<u32> = self
            .exercisers
            .iter()
            .filter(|e| e.intx_asserted)
            .filter_map(SimExerciser::intx_line)
            .collect();
        lines.sort_unstable();
        lines.dedup();
        lines
    }

    fn card_mut(&mut self, instance: u32) -> Result<&mut SimExerciser, ExerciserError> {
        self.exercisers
            .get_mut(instance as usize)
            .ok_or(ExerciserError::UnknownInstance(instance))
    }

    fn start_dma(&mut self, instance: u32, direction: DmaDirection) -> Result<(), ExerciserError> {
        let honor_no_snoop = self.honor_no_snoop;
        let card = self
            .exercisers
            .get_mut(instance as usize)
            .ok_or(ExerciserError::UnknownInstance(instance))?;
        let (addr, len) = card.dma.ok_or(ExerciserError::DmaNotConfigured { instance })?;

        let injected = match direction {
            DmaDirection::ToDevice => card.faults.fail_dma_to_device,
            DmaDirection::FromDevice => card.faults.fail_dma_from_device,
        };
        if injected {
            self.stats.faulted += 1;
            return Err(ExerciserError::CommandRejected {
                instance,
                op: ExerciserOp::StartDma(direction),
            });
        }

        let snoop = !(card.no_snoop && honor_no_snoop);
        let done = match direction {
            DmaDirection::ToDevice => self.memory.dma_read(addr, &mut card.buffer[..len], snoop),
            DmaDirection::FromDevice => {
                let mut data = card.buffer[..len].to_vec();
                if card.faults.corrupt_readback {
                    data.iter_mut().for_each(|b| *b = !*b);
                }
                self.memory.dma_write(addr, &data, snoop)
            }
        };

        if !done {
            self.stats.faulted += 1;
            return Err(ExerciserError::DmaFault { instance, addr, len });
        }
        if snoop {
            self.stats.snooped += 1;
        } else {
            self.stats.no_snoop += 1;
        }
        trace!(instance, %addr, len, ?direction, snoop, "DMA complete");
        Ok(())
    }
}

impl ExerciserControl for Interconnect {
    fn set_param(&mut self, param: ExerciserParam, instance: u32) -> Result<(), ExerciserError> {
        let card = self.card_mut(instance)?;
        match param {
            ExerciserParam::DmaAttributes { addr, len } => {
                if len > card.buffer.len() {
                    return Err(ExerciserError::DmaTooLarge {
                        instance,
                        len,
                        capacity: card.buffer.len(),
                    });
                }
                card.dma = Some((addr, len));
                trace!(instance, %addr, len, "DMA attributes programmed");
            }
        }
        Ok(())
    }

    fn ops(&mut self, op: ExerciserOp, instance: u32) -> Result<(), ExerciserError> {
        let rejected = ExerciserError::CommandRejected { instance, op };
        match op {
            ExerciserOp::NoSnoopTlpStart | ExerciserOp::NoSnoopTlpStop => {
                let enable = op == ExerciserOp::NoSnoopTlpStart;
                let card = self.card_mut(instance)?;
                let injected = if enable {
                    card.faults.fail_no_snoop_start
                } else {
                    card.faults.fail_no_snoop_stop
                };
                if injected {
                    return Err(rejected);
                }
                card.no_snoop = enable;
                debug!(instance, bdf = %card.bdf, enable, "No-Snoop attribute");
                Ok(())
            }
            ExerciserOp::StartDma(direction) => self.start_dma(instance, direction),
            ExerciserOp::GenerateLegacyIntr(line) => {
                let card = self.card_mut(instance)?;
                if card.intx_line().is_none() {
                    return Err(ExerciserError::NoLegacyInterrupt { instance });
                }
                if card.faults.drop_legacy_interrupt {
                    warn!(instance, line, "legacy interrupt dropped");
                    return Ok(());
                }
                card.intx_asserted = true;
                Ok(())
            }
            ExerciserOp::ClearIntr(_) => {
                self.card_mut(instance)?.intx_asserted = false;
                Ok(())
            }
        }
    }
}
