//! Error definitions.
//!
//! This module defines the typed errors surfaced across the platform boundary. It provides:
//! 1. **Exerciser Control:** Command and DMA failures reported by an exerciser.
//! 2. **Topology:** Configuration-space, root-port, and IRQ-map lookup failures.
//! 3. **Enumeration:** Running out of exerciser functions before the reported count.
//! 4. **Interrupts:** ISR installation failures.
//! 5. **Configuration:** I/O, parse, and validation errors when loading a platform description.

use thiserror::Error;

use super::addr::PhysAddr;
use super::bdf::Bdf;
use crate::platform::ExerciserOp;

/// Failure reported by an exerciser command or parameter write.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ExerciserError {
    /// No exerciser is registered under this instance number.
    #[error("exerciser instance {0} is not present")]
    UnknownInstance(u32),

    /// The exerciser rejected the command.
    #[error("exerciser {instance} rejected {op}")]
    CommandRejected {
        /// Instance the command was addressed to.
        instance: u32,
        /// The rejected operation.
        op: ExerciserOp,
    },

    /// A DMA was started before any DMA attributes were programmed.
    #[error("exerciser {instance} has no DMA attributes programmed")]
    DmaNotConfigured {
        /// Instance the command was addressed to.
        instance: u32,
    },

    /// The programmed DMA length exceeds the exerciser's internal buffer.
    #[error("DMA of {len} bytes exceeds exerciser {instance} buffer of {capacity} bytes")]
    DmaTooLarge {
        /// Instance the command was addressed to.
        instance: u32,
        /// Programmed transfer length.
        len: usize,
        /// Capacity of the exerciser buffer.
        capacity: usize,
    },

    /// The transfer targeted host memory that does not exist.
    #[error("exerciser {instance} DMA of {len} bytes at {addr} faulted")]
    DmaFault {
        /// Instance the command was addressed to.
        instance: u32,
        /// Physical start of the transfer.
        addr: PhysAddr,
        /// Transfer length.
        len: usize,
    },

    /// The exerciser does not implement a legacy interrupt pin.
    #[error("exerciser {instance} has no legacy interrupt pin")]
    NoLegacyInterrupt {
        /// Instance the command was addressed to.
        instance: u32,
    },
}

/// Failure of a topology query.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum TopologyError {
    /// No function responds at this address.
    #[error("no PCIe function at {0}")]
    NoSuchFunction(Bdf),

    /// Configuration-space read outside the implemented header.
    #[error("config offset {offset:#x} out of range for {bdf}")]
    ConfigOffset {
        /// Function being read.
        bdf: Bdf,
        /// Requested byte offset.
        offset: u16,
    },

    /// The function has no upstream root port.
    #[error("no root port above {0}")]
    NoRootPort(Bdf),

    /// The root port publishes no legacy interrupt routing.
    #[error("no legacy IRQ map for root port {0}")]
    NoLegacyIrqMap(Bdf),
}

/// Failure while walking exerciser functions.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum EnumerationError {
    /// No function with the exerciser class code exists at or after the cursor.
    #[error("exerciser instance {instance}: no function with class code {class_code:#08x} at or after {start}")]
    NotFound {
        /// Instance number that could not be resolved.
        instance: u32,
        /// Class code searched for.
        class_code: u32,
        /// Search cursor at the time of the query.
        start: Bdf,
    },

    /// The previous match was the last function of the address space.
    #[error("exerciser instance {instance}: configuration space exhausted")]
    AddressSpaceExhausted {
        /// Instance number that could not be resolved.
        instance: u32,
    },
}

/// Failure of an interrupt controller request.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum IrqError {
    /// A handler is already installed for this line.
    #[error("interrupt {0} already has a handler")]
    AlreadyInstalled(u32),

    /// The line is outside the controller's range.
    #[error("interrupt {line} out of range (max {max})")]
    InvalidLine {
        /// Requested line.
        line: u32,
        /// Highest line implemented.
        max: u32,
    },
}

/// Failure while loading or validating a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),

    /// The JSON was malformed or did not match the schema.
    #[error("cannot parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// The configuration parsed but describes an impossible platform.
    #[error("invalid config: {0}")]
    Invalid(String),
}
