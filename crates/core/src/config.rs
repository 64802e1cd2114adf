//! Configuration for the exerciser suite and the simulated platform.
//!
//! This module defines all configuration structures and enums. It provides:
//! 1. **Defaults:** Baseline constants (compliance level, memory pool, cache line, timeouts).
//! 2. **Structures:** Hierarchical config for general, PE, PCIe, memory, interconnect, and
//!    interrupt settings.
//! 3. **Enums:** Failure policy and memory attribute.
//! 4. **Loading:** JSON parsing from strings and files followed by validation.
//!
//! Every field has a default, so `{}` is a valid configuration describing one healthy
//! exerciser below one root port.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::common::constants::EXERCISER_CLASSCODE;
use crate::common::{Bdf, ConfigError};
use crate::platform::LegacyIrqMap;

/// Default configuration constants.
mod defaults {
    /// Compliance level stamped into result words.
    pub const LEVEL: u32 = 4;

    /// Interrupt polls before the legacy interrupt test gives up.
    pub const INTERRUPT_TIMEOUT: u64 = 0x10_0000;

    /// Number of processor elements.
    pub const NUM_PE: usize = 1;

    /// Physical base of the coherent memory pool (2 GiB).
    pub const POOL_BASE: u64 = 0x8000_0000;

    /// Size of the coherent memory pool (64 KiB).
    pub const POOL_SIZE: usize = 64 * 1024;

    /// Offset added to a physical address to obtain its CPU virtual address.
    pub const VIRT_OFFSET: u64 = 0x0000_7F00_0000_0000;

    /// Allocation granularity of the coherent pool (one cache line).
    pub const ALLOC_ALIGN: usize = 64;

    /// CPU cache line size in bytes.
    pub const CACHE_LINE: usize = 64;

    /// Exerciser internal DMA buffer size.
    pub const DMA_BUFFER_SIZE: usize = 4096;

    /// Highest interrupt ID the controller implements.
    pub const MAX_IRQ_LINE: u32 = 1019;

    /// Interrupt ID the default exerciser's INTA is routed to.
    pub const DEFAULT_INTX_LINE: u8 = 36;

    /// Class code of a PCI-to-PCI bridge (root port).
    pub const ROOT_PORT_CLASSCODE: u32 = 0x0006_0400;
}

/// Root configuration.
///
/// # Examples
///
/// ```
/// use exerciser_avs_core::config::{Config, FailurePolicy, MemoryAttribute};
///
/// let json = r#"{
///     "general": { "failure_policy": "continue" },
///     "memory": { "attribute": "cacheable" },
///     "interconnect": { "honor_no_snoop": true }
/// }"#;
///
/// let config = Config::from_json(json).unwrap();
/// assert_eq!(config.general.failure_policy, FailurePolicy::Continue);
/// assert_eq!(config.memory.attribute, MemoryAttribute::Cacheable);
/// assert_eq!(config.pcie.exercisers.len(), 1);
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Suite-wide settings
    pub general: GeneralConfig,
    /// Processor elements
    pub pe: PeConfig,
    /// PCIe fabric: ECAM base, exercisers, root ports, other functions
    pub pcie: PcieConfig,
    /// Host memory and CPU cache
    pub memory: MemoryConfig,
    /// DMA interconnect behaviour
    pub interconnect: InterconnectConfig,
    /// Interrupt controller
    pub interrupts: InterruptConfig,
}

impl Config {
    /// Parses and validates a JSON configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` for malformed JSON and `ConfigError::Invalid` when
    /// validation fails.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses, and validates a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Io` when the file cannot be read, otherwise as
    /// [`Config::from_json`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Checks that the configuration describes a realizable platform.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` naming the first violated rule.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.general.level > 0xF {
            return Err(invalid(format!(
                "general.level {} does not fit in four bits",
                self.general.level
            )));
        }
        if self.pe.num_pe == 0 {
            return Err(invalid("pe.num_pe must be at least 1"));
        }
        if self.pe.current_pe >= self.pe.num_pe {
            return Err(invalid(format!(
                "pe.current_pe {} out of range for {} PEs",
                self.pe.current_pe, self.pe.num_pe
            )));
        }

        let mut seen = BTreeSet::new();
        let all_bdfs = self
            .pcie
            .exercisers
            .iter()
            .map(|e| e.bdf)
            .chain(self.pcie.root_ports.iter().map(|r| r.bdf))
            .chain(self.pcie.functions.iter().map(|f| f.bdf));
        for bdf in all_bdfs {
            if !bdf.is_valid() {
                return Err(invalid(format!("{bdf:?} is not a valid BDF")));
            }
            if !seen.insert(bdf) {
                return Err(invalid(format!("{bdf} is configured twice")));
            }
        }

        let root_ports: BTreeSet<Bdf> = self.pcie.root_ports.iter().map(|r| r.bdf).collect();
        for exerciser in &self.pcie.exercisers {
            if let Some(rp) = exerciser.root_port {
                if !root_ports.contains(&rp) {
                    return Err(invalid(format!(
                        "exerciser {} refers to unknown root port {rp}",
                        exerciser.bdf
                    )));
                }
            }
            if let Some(intx) = &exerciser.intx {
                if intx.pin > 4 {
                    return Err(invalid(format!(
                        "exerciser {} interrupt pin {} out of range 0..=4",
                        exerciser.bdf, intx.pin
                    )));
                }
                if u32::from(intx.line) > self.interrupts.max_line {
                    return Err(invalid(format!(
                        "exerciser {} interrupt line {} exceeds max {}",
                        exerciser.bdf, intx.line, self.interrupts.max_line
                    )));
                }
            }
        }

        if let Some(f) = self
            .pcie
            .functions
            .iter()
            .find(|f| f.class_code == EXERCISER_CLASSCODE)
        {
            return Err(invalid(format!(
                "function {} uses the exerciser class code; list it under pcie.exercisers",
                f.bdf
            )));
        }

        if self.memory.cache_line_bytes == 0 || !self.memory.cache_line_bytes.is_power_of_two() {
            return Err(invalid("memory.cache_line_bytes must be a power of two"));
        }
        if self.memory.alloc_align == 0 || !self.memory.alloc_align.is_power_of_two() {
            return Err(invalid("memory.alloc_align must be a power of two"));
        }
        if self
            .memory
            .pool_base
            .checked_add(self.memory.pool_size as u64)
            .is_none()
        {
            return Err(invalid("memory pool wraps the physical address space"));
        }
        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(msg.into())
}

/// What a payload does after the first device that does not pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop the payload at the first failing device.
    #[default]
    AbortOnFailure,
    /// Evaluate every device and report the most severe outcome.
    Continue,
}

/// Suite-wide settings.
#[derive(Debug, Clone, Deserialize)]
pub struct GeneralConfig {
    /// Compliance level stamped into result words
    #[serde(default = "GeneralConfig::default_level")]
    pub level: u32,

    /// Test numbers to skip
    #[serde(default)]
    pub skip_tests: Vec<u32>,

    /// Behaviour after a failing device
    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Interrupt polls before a legacy interrupt is declared lost
    #[serde(default = "GeneralConfig::default_interrupt_timeout")]
    pub interrupt_timeout: u64,
}

impl GeneralConfig {
    fn default_level() -> u32 {
        defaults::LEVEL
    }

    fn default_interrupt_timeout() -> u64 {
        defaults::INTERRUPT_TIMEOUT
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            level: defaults::LEVEL,
            skip_tests: Vec::new(),
            failure_policy: FailurePolicy::default(),
            interrupt_timeout: defaults::INTERRUPT_TIMEOUT,
        }
    }
}

/// Processor-element settings.
#[derive(Debug, Clone, Deserialize)]
pub struct PeConfig {
    /// Number of processor elements
    #[serde(default = "PeConfig::default_num_pe")]
    pub num_pe: usize,

    /// Index of the PE running the suite
    #[serde(default)]
    pub current_pe: usize,
}

impl PeConfig {
    fn default_num_pe() -> usize {
        defaults::NUM_PE
    }
}

impl Default for PeConfig {
    fn default() -> Self {
        Self {
            num_pe: defaults::NUM_PE,
            current_pe: 0,
        }
    }
}

/// Legacy interrupt wiring of an exerciser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct IntxConfig {
    /// Interrupt Pin register value (0 = none, 1..=4 = INTA..INTD)
    pub pin: u8,
    /// Interrupt Line register value (interrupt ID)
    pub line: u8,
}

/// Faults an exerciser injects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ExerciserFaults {
    /// Reject `NO_SNOOP_TLP_START`
    pub fail_no_snoop_start: bool,
    /// Reject `NO_SNOOP_TLP_STOP`
    pub fail_no_snoop_stop: bool,
    /// Fail DMA reads of host memory
    pub fail_dma_to_device: bool,
    /// Fail DMA writes to host memory
    pub fail_dma_from_device: bool,
    /// Invert every byte written back to host memory
    pub corrupt_readback: bool,
    /// Accept `GENERATE_L_INTR` but never assert the line
    pub drop_legacy_interrupt: bool,
}

/// One exerciser card.
#[derive(Debug, Clone, Deserialize)]
pub struct ExerciserConfig {
    /// Configuration-space address
    pub bdf: Bdf,

    /// Upstream root port
    #[serde(default)]
    pub root_port: Option<Bdf>,

    /// Legacy interrupt wiring
    #[serde(default)]
    pub intx: Option<IntxConfig>,

    /// Internal DMA buffer size in bytes
    #[serde(default = "ExerciserConfig::default_dma_buffer_size")]
    pub dma_buffer_size: usize,

    /// Injected faults
    #[serde(default)]
    pub faults: ExerciserFaults,
}

impl ExerciserConfig {
    fn default_dma_buffer_size() -> usize {
        defaults::DMA_BUFFER_SIZE
    }

    /// A healthy exerciser at `bdf` with no interrupt wiring and no root port.
    pub fn at(bdf: Bdf) -> Self {
        Self {
            bdf,
            root_port: None,
            intx: None,
            dma_buffer_size: defaults::DMA_BUFFER_SIZE,
            faults: ExerciserFaults::default(),
        }
    }
}

/// A root port and the legacy interrupt routing it publishes.
#[derive(Debug, Clone, Deserialize)]
pub struct RootPortConfig {
    /// Configuration-space address
    pub bdf: Bdf,
    /// Legacy INTx routing (absent = the platform publishes none)
    #[serde(default)]
    pub irq_map: Option<LegacyIrqMap>,
}

/// Any other PCIe function.
#[derive(Debug, Clone, Deserialize)]
pub struct FunctionConfig {
    /// Configuration-space address
    pub bdf: Bdf,
    /// 24-bit class code
    pub class_code: u32,
}

/// PCIe fabric description.
#[derive(Debug, Clone, Deserialize)]
pub struct PcieConfig {
    /// Segment of ECAM region 0
    #[serde(default)]
    pub segment: u16,

    /// First bus of ECAM region 0
    #[serde(default)]
    pub start_bus: u8,

    /// Exerciser cards
    #[serde(default = "PcieConfig::default_exercisers")]
    pub exercisers: Vec<ExerciserConfig>,

    /// Root ports
    #[serde(default = "PcieConfig::default_root_ports")]
    pub root_ports: Vec<RootPortConfig>,

    /// Other functions present in configuration space
    #[serde(default)]
    pub functions: Vec<FunctionConfig>,

    /// Exerciser count reported to the tests (defaults to the number configured)
    #[serde(default)]
    pub reported_exercisers: Option<u32>,
}

impl PcieConfig {
    fn default_root_port() -> Bdf {
        Bdf::new(0, 0, 1, 0)
    }

    fn default_exercisers() -> Vec<ExerciserConfig> {
        let mut exerciser = ExerciserConfig::at(Bdf::new(0, 1, 0, 0));
        exerciser.root_port = Some(Self::default_root_port());
        exerciser.intx = Some(IntxConfig {
            pin: 1,
            line: defaults::DEFAULT_INTX_LINE,
        });
        vec![exerciser]
    }

    fn default_root_ports() -> Vec<RootPortConfig> {
        let mut irq_map = LegacyIrqMap::default();
        irq_map.irqs[0].push(u32::from(defaults::DEFAULT_INTX_LINE));
        vec![RootPortConfig {
            bdf: Self::default_root_port(),
            irq_map: Some(irq_map),
        }]
    }

    /// Class code given to configured root ports.
    pub const fn root_port_class_code() -> u32 {
        defaults::ROOT_PORT_CLASSCODE
    }
}

impl Default for PcieConfig {
    fn default() -> Self {
        Self {
            segment: 0,
            start_bus: 0,
            exercisers: Self::default_exercisers(),
            root_ports: Self::default_root_ports(),
            functions: Vec::new(),
            reported_exercisers: None,
        }
    }
}

/// Attribute of the memory handed out by the coherent allocator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryAttribute {
    /// CPU accesses bypass the cache.
    #[default]
    NonCacheable,
    /// CPU accesses go through the write-back cache.
    Cacheable,
}

/// Host memory and CPU cache.
#[derive(Debug, Clone, Deserialize)]
pub struct MemoryConfig {
    /// Physical base of the coherent pool
    #[serde(default = "MemoryConfig::default_pool_base")]
    pub pool_base: u64,

    /// Size of the coherent pool in bytes
    #[serde(default = "MemoryConfig::default_pool_size")]
    pub pool_size: usize,

    /// Virtual = physical + this offset
    #[serde(default = "MemoryConfig::default_virt_offset")]
    pub virt_offset: u64,

    /// Allocation alignment in bytes
    #[serde(default = "MemoryConfig::default_alloc_align")]
    pub alloc_align: usize,

    /// Attribute of coherent allocations
    #[serde(default)]
    pub attribute: MemoryAttribute,

    /// CPU cache line size in bytes
    #[serde(default = "MemoryConfig::default_cache_line")]
    pub cache_line_bytes: usize,
}

impl MemoryConfig {
    fn default_pool_base() -> u64 {
        defaults::POOL_BASE
    }

    fn default_pool_size() -> usize {
        defaults::POOL_SIZE
    }

    fn default_virt_offset() -> u64 {
        defaults::VIRT_OFFSET
    }

    fn default_alloc_align() -> usize {
        defaults::ALLOC_ALIGN
    }

    fn default_cache_line() -> usize {
        defaults::CACHE_LINE
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            pool_base: defaults::POOL_BASE,
            pool_size: defaults::POOL_SIZE,
            virt_offset: defaults::VIRT_OFFSET,
            alloc_align: defaults::ALLOC_ALIGN,
            attribute: MemoryAttribute::default(),
            cache_line_bytes: defaults::CACHE_LINE,
        }
    }
}

/// DMA interconnect behaviour.
#[derive(Debug, Clone, Deserialize)]
pub struct InterconnectConfig {
    /// When true, No-Snoop TLPs bypass the CPU cache; when false the fabric snoops anyway
    #[serde(default = "InterconnectConfig::default_honor_no_snoop")]
    pub honor_no_snoop: bool,
}

impl InterconnectConfig {
    const fn default_honor_no_snoop() -> bool {
        true
    }
}

impl Default for InterconnectConfig {
    fn default() -> Self {
        Self {
            honor_no_snoop: true,
        }
    }
}

/// Interrupt controller.
#[derive(Debug, Clone, Deserialize)]
pub struct InterruptConfig {
    /// Highest interrupt ID implemented
    #[serde(default = "InterruptConfig::default_max_line")]
    pub max_line: u32,
}

impl InterruptConfig {
    fn default_max_line() -> u32 {
        defaults::MAX_IRQ_LINE
    }
}

impl Default for InterruptConfig {
    fn default() -> Self {
        Self {
            max_line: defaults::MAX_IRQ_LINE,
        }
    }
}
