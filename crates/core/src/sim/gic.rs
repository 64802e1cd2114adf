//! Interrupt controller.
//!
//! Lines are level-sensitive: an asserted line is delivered on every dispatch until the
//! handler (or anyone else) makes the device deassert it. Lines without a handler stay
//! pending and are not delivered.

use std::collections::BTreeMap;
use std::fmt;

use tracing::trace;

use crate::common::IrqError;
use crate::platform::{ExerciserControl, IsrHandler};

use super::interconnect::Interconnect;

/// Interrupt controller with one handler slot per line.
pub struct Gic {
    max_line: u32,
    handlers: BTreeMap<u32, IsrHandler>,
    delivered: u64,
}

impl Gic {
    /// Creates a controller implementing lines `0..=max_line`.
    pub const fn new(max_line: u32) -> Self {
        Self {
            max_line,
            handlers: BTreeMap::new(),
            delivered: 0,
        }
    }

    /// Installs `handler` for `line`.
    ///
    /// # Errors
    ///
    /// Returns `IrqError::InvalidLine` past `max_line` and `IrqError::AlreadyInstalled` when the
    /// line already has a handler.
    pub fn install(&mut self, line: u32, handler: IsrHandler) -> Result<(), IrqError> {
        if line > self.max_line {
            return Err(IrqError::InvalidLine {
                line,
                max: self.max_line,
            });
        }
        if self.handlers.contains_key(&line) {
            return Err(IrqError::AlreadyInstalled(line));
        }
        let _ = self.handlers.insert(line, handler);
        trace!(line, "ISR installed");
        Ok(())
    }

    /// Removes the handler of `line`; returns `false` if none was installed.
    pub fn free(&mut self, line: u32) -> bool {
        self.handlers.remove(&line).is_some()
    }

    /// Returns `true` if `line` has a handler.
    pub fn is_installed(&self, line: u32) -> bool {
        self.handlers.contains_key(&line)
    }

    /// Number of handler invocations so far.
    pub const fn delivered(&self) -> u64 {
        self.delivered
    }

    /// Delivers every asserted line that has a handler, once.
    ///
    /// # Returns
    ///
    /// The number of handlers run.
    pub fn dispatch(&mut self, interconnect: &mut Interconnect) -> usize {
        let lines = interconnect.asserted_lines();
        let control: &mut dyn ExerciserControl = interconnect;
        let mut ran = 0;
        for line in lines {
            if let Some(handler) = self.handlers.get_mut(&line) {
                trace!(line, "delivering interrupt");
                handler(&mut *control);
                ran += 1;
            }
        }
        self.delivered += ran as u64;
        ran
    }
}

impl fmt::Debug for Gic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gic")
            .field("max_line", &self.max_line)
            .field("lines", &self.handlers.keys().collect::<Vec<_>>())
            .field("delivered", &self.delivered)
            .finish()
    }
}
