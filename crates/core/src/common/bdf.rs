//! PCIe function addressing.
//!
//! A `Bdf` names one PCIe function by segment, bus, device, and function number. The derived
//! ordering walks configuration space the same way enumeration does (segment, then bus, then
//! device, then function), and `Bdf::successor` returns the strictly greater successor so a search
//! cursor never matches the same function twice.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Number of device slots on one bus.
pub const MAX_DEVICES: u8 = 32;

/// Number of functions per device.
pub const MAX_FUNCTIONS: u8 = 8;

/// Segment/bus/device/function address of a PCIe function.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Bdf {
    /// PCIe segment (root complex / ECAM region).
    pub segment: u16,
    /// Bus number within the segment.
    pub bus: u8,
    /// Device number, `0..32`.
    pub device: u8,
    /// Function number, `0..8`.
    pub function: u8,
}

impl Bdf {
    /// Creates a new BDF.
    ///
    /// The caller is responsible for `device < 32` and `function < 8`; use
    /// [`Bdf::is_valid`] when the value comes from outside the crate.
    pub const fn new(segment: u16, bus: u8, device: u8, function: u8) -> Self {
        Self {
            segment,
            bus,
            device,
            function,
        }
    }

    /// Returns `true` when device and function are within PCIe limits.
    pub const fn is_valid(&self) -> bool {
        self.device < MAX_DEVICES && self.function < MAX_FUNCTIONS
    }

    /// Returns the next function address in enumeration order.
    ///
    /// Function carries into device, device into bus, bus into segment.
    ///
    /// # Returns
    ///
    /// The successor, which always compares greater than `self`, or `None` past
    /// the last function of the last segment.
    pub fn successor(&self) -> Option<Self> {
        if self.function.saturating_add(1) < MAX_FUNCTIONS {
            return Some(Self {
                function: self.function + 1,
                ..*self
            });
        }
        if self.device.saturating_add(1) < MAX_DEVICES {
            return Some(Self {
                device: self.device + 1,
                function: 0,
                ..*self
            });
        }
        if let Some(bus) = self.bus.checked_add(1) {
            return Some(Self::new(self.segment, bus, 0, 0));
        }
        self.segment
            .checked_add(1)
            .map(|segment| Self::new(segment, 0, 0, 0))
    }
}

impl fmt::Display for Bdf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04x}:{:02x}:{:02x}.{}",
            self.segment, self.bus, self.device, self.function
        )
    }
}
