//! PCIe legacy interrupts (test 806).
//!
//! Every exerciser that implements an INTx pin is asked to assert its legacy interrupt. The
//! test installs a handler on the line the function reports in its Interrupt Line register and
//! polls until the handler has run or the poll budget is spent. The handler acknowledges the
//! exerciser and clears a pending flag it shares with the test body.
//!
//! Exercisers without a pin are not counted; with no counted exerciser the test skips. A root
//! port that publishes no legacy routing does not stop the walk but fails the test at the end.
//! The failure is sticky: a missing map behind any exerciser fails the test, even when later
//! exercisers in the walk deliver their interrupts.

use std::cell::Cell;
use std::rc::Rc;

use thiserror::Error;
use tracing::{debug, error, warn};

use crate::common::constants::{
    EXERCISER_CLASSCODE, EXERCISER_TEST_NUM_BASE, PCIE_INTERRUPT_LINE, PCIE_INTERRUPT_PIN,
    STATUS_CODE_FAIL, STATUS_CODE_INTR_PASS,
};
use crate::common::{Bdf, ExerciserError, IrqError, TopologyError};
use crate::context::{DeviceRecord, TestContext};
use crate::exerciser::ExerciserEnumerator;
use crate::platform::{ExerciserControl, ExerciserOp, ExerciserRef, IsrHandler, Platform};
use crate::status::{AvsStatus, Outcome};
use crate::suite::{self, TestDescriptor};

/// Test number.
pub const TEST_NUM: u32 = EXERCISER_TEST_NUM_BASE + 6;

/// One-line description printed when the test starts.
pub const TEST_DESC: &str = "Generate PCIe legacy interrupts";

/// Registry entry.
pub const DESCRIPTOR: TestDescriptor = TestDescriptor {
    num: TEST_NUM,
    desc: TEST_DESC,
    num_pe: 1,
    payload,
};

/// Why a legacy interrupt check failed.
#[derive(Debug, Error)]
pub enum LegacyIntrError {
    /// The Interrupt Pin or Interrupt Line register could not be read.
    #[error("config read of {bdf} failed: {source}")]
    ConfigRead {
        /// Exerciser function.
        bdf: Bdf,
        /// Topology error.
        source: TopologyError,
    },

    /// The root port above the exerciser could not be resolved.
    #[error("ERP {instance} BDF fetch error: {source}")]
    RootPort {
        /// Exerciser instance.
        instance: u32,
        /// Topology error.
        source: TopologyError,
    },

    /// The handler could not be installed.
    #[error("ISR install for line {line} failed: {source}")]
    InstallIsr {
        /// Interrupt line.
        line: u32,
        /// Interrupt controller error.
        source: IrqError,
    },

    /// The exerciser rejected the trigger command.
    #[error("exerciser {instance} could not generate interrupt {line}: {source}")]
    Trigger {
        /// Exerciser instance.
        instance: u32,
        /// Interrupt line.
        line: u32,
        /// Exerciser error.
        source: ExerciserError,
    },

    /// The handler did not run within the poll budget.
    #[error("interrupt trigger failed for instance {instance} (line {line})")]
    Timeout {
        /// Exerciser instance.
        instance: u32,
        /// Interrupt line.
        line: u32,
    },
}

impl LegacyIntrError {
    /// Outcome recorded for this error.
    pub const fn outcome(&self) -> Outcome {
        match self {
            Self::ConfigRead { .. } => Outcome::Error(STATUS_CODE_FAIL),
            _ => Outcome::Fail(STATUS_CODE_FAIL),
        }
    }
}

/// Result of checking one exerciser.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntxCheck {
    /// The function implements no legacy interrupt.
    NoPin,
    /// The root port publishes no legacy routing; no interrupt was triggered.
    NoIrqMap,
    /// The interrupt was delivered and acknowledged.
    Delivered,
}

/// Runs test 806 through the suite driver.
pub fn entry(ctx: &mut TestContext, platform: &mut dyn Platform) -> AvsStatus {
    suite::run_test(ctx, platform, &DESCRIPTOR)
}

/// Checks legacy interrupt delivery for one exerciser.
///
/// # Arguments
///
/// * `platform` - Platform under test.
/// * `exerciser` - The exerciser to trigger.
/// * `timeout` - Interrupt polls before the interrupt is declared lost.
///
/// # Errors
///
/// Returns `LegacyIntrError` when the check could not complete or the interrupt was not
/// delivered. The handler is removed again on every path after installation.
pub fn check_legacy_interrupt(
    platform: &mut dyn Platform,
    exerciser: &ExerciserRef,
    timeout: u64,
) -> Result<IntxCheck, LegacyIntrError> {
    let bdf = exerciser.bdf;
    let instance = exerciser.instance;
    let config_err = |source| LegacyIntrError::ConfigRead { bdf, source };

    let pin = platform
        .read_config_byte(bdf, PCIE_INTERRUPT_PIN)
        .map_err(config_err)?;
    if pin == 0 {
        debug!(%bdf, "no legacy interrupt pin");
        return Ok(IntxCheck::NoPin);
    }
    let line = u32::from(
        platform
            .read_config_byte(bdf, PCIE_INTERRUPT_LINE)
            .map_err(config_err)?,
    );

    let root_port = platform
        .root_port(bdf)
        .map_err(|source| LegacyIntrError::RootPort { instance, source })?;

    if let Err(err) = platform.legacy_irq_map(root_port) {
        warn!(%bdf, %root_port, "{err}");
        return Ok(IntxCheck::NoIrqMap);
    }

    let pending = Rc::new(Cell::new(false));
    let handler = acknowledge_handler(Rc::clone(&pending), line, instance);
    platform
        .install_isr(line, handler)
        .map_err(|source| LegacyIntrError::InstallIsr { line, source })?;

    pending.set(true);
    let triggered = platform.ops(ExerciserOp::GenerateLegacyIntr(line), instance);

    let mut polls = 0;
    while triggered.is_ok() && pending.get() && polls < timeout {
        platform.poll_interrupts();
        polls += 1;
    }
    platform.free_interrupt(line);

    triggered.map_err(|source| LegacyIntrError::Trigger {
        instance,
        line,
        source,
    })?;
    if pending.get() {
        return Err(LegacyIntrError::Timeout { instance, line });
    }
    debug!(%bdf, line, polls, "legacy interrupt delivered");
    Ok(IntxCheck::Delivered)
}

fn acknowledge_handler(pending: Rc<Cell<bool>>, line: u32, instance: u32) -> IsrHandler {
    Box::new(move |control: &mut dyn ExerciserControl| {
        if let Err(err) = control.ops(ExerciserOp::ClearIntr(line), instance) {
            warn!(line, instance, "{err}");
        }
        pending.set(false);
        debug!(line, "received legacy interrupt");
    })
}

fn payload(ctx: &mut TestContext, platform: &mut dyn Platform) {
    let pe_index = platform.current_pe_index();
    let timeout = ctx.interrupt_timeout();
    let mut enumerator = ExerciserEnumerator::new(platform, EXERCISER_CLASSCODE);
    let mut valid = 0u32;
    let mut map_missing = false;

    while let Some(next) = enumerator.next_device(platform) {
        let exerciser = match next {
            Ok(exerciser) => exerciser,
            Err(err) => {
                error!("{err}");
                ctx.record_outcome(pe_index, TEST_NUM, Outcome::Error(STATUS_CODE_FAIL));
                return;
            }
        };

        let check = match check_legacy_interrupt(platform, &exerciser, timeout) {
            Ok(check) => check,
            Err(err) => {
                error!(bdf = %exerciser.bdf, "{err}");
                let outcome = err.outcome();
                ctx.record_device(DeviceRecord {
                    bdf: exerciser.bdf,
                    instance: exerciser.instance,
                    outcome,
                });
                ctx.record_outcome(pe_index, TEST_NUM, outcome);
                return;
            }
        };

        let outcome = match check {
            IntxCheck::NoPin => Outcome::Skip(0),
            IntxCheck::NoIrqMap => {
                valid += 1;
                map_missing = true;
                Outcome::Fail(STATUS_CODE_FAIL)
            }
            IntxCheck::Delivered => {
                valid += 1;
                Outcome::Pass(STATUS_CODE_INTR_PASS)
            }
        };
        ctx.record_device(DeviceRecord {
            bdf: exerciser.bdf,
            instance: exerciser.instance,
            outcome,
        });
    }

    let verdict = if valid == 0 {
        Outcome::Skip(0)
    } else if map_missing {
        Outcome::Fail(STATUS_CODE_FAIL)
    } else {
        Outcome::Pass(STATUS_CODE_INTR_PASS)
    };
    ctx.record_outcome(pe_index, TEST_NUM, verdict);
}
