//! PCI Express I/O coherency (test 807).
//!
//! For each exerciser a coherent buffer is split into a source and a destination half. The
//! exerciser is switched to No-Snoop TLPs, reads the source half by DMA, then writes what it
//! read back into the destination half. The CPU then compares the two halves: a platform that
//! lets No-Snoop traffic bypass a cache holding the source data (or leaves stale lines over the
//! destination) shows up as a mismatch.
//!
//! The buffer is released on every path after the trial body returns.

use thiserror::Error;
use tracing::{debug, error, info};

use crate::common::constants::{
    EXERCISER_CLASSCODE, EXERCISER_TEST_NUM_BASE, STATUS_CODE_FAIL, TEST_DATA_BLK_SIZE,
};
use crate::common::{BufferRegion, CoherentBuffer, ExerciserError};
use crate::config::FailurePolicy;
use crate::context::{DeviceRecord, TestContext};
use crate::exerciser::{ExerciserEnumerator, init_source_buf_data};
use crate::platform::{DmaDirection, ExerciserOp, ExerciserParam, ExerciserRef, Platform};
use crate::status::{AvsStatus, Outcome};
use crate::suite::{self, TestDescriptor};

/// Test number.
pub const TEST_NUM: u32 = EXERCISER_TEST_NUM_BASE + 7;

/// One-line description printed when the test starts.
pub const TEST_DESC: &str = "Check PCI Express I/O Coherency";

/// Registry entry.
pub const DESCRIPTOR: TestDescriptor = TestDescriptor {
    num: TEST_NUM,
    desc: TEST_DESC,
    num_pe: 1,
    payload,
};

/// Why a coherency trial did not pass.
#[derive(Debug, Error)]
pub enum TrialError {
    /// `NO_SNOOP_TLP_START` failed.
    #[error("exerciser {instance} No-Snoop enable failed: {source}")]
    NoSnoopEnable {
        /// Exerciser instance.
        instance: u32,
        /// Error reported by the exerciser.
        source: ExerciserError,
    },

    /// Programming or running the DMA into the exerciser failed.
    #[error("DMA write to exerciser {instance} failed: {source}")]
    DmaToDevice {
        /// Exerciser instance.
        instance: u32,
        /// Error reported by the exerciser.
        source: ExerciserError,
    },

    /// Programming or running the DMA back to host memory failed.
    #[error("DMA read from exerciser {instance} failed: {source}")]
    DmaFromDevice {
        /// Exerciser instance.
        instance: u32,
        /// Error reported by the exerciser.
        source: ExerciserError,
    },

    /// The destination half differs from the source half.
    #[error(
        "I/O coherency failure for exerciser {instance}: offset {offset} holds {actual:#04x}, expected {expected:#04x}"
    )]
    CoherencyViolation {
        /// Exerciser instance.
        instance: u32,
        /// First mismatching byte offset within the halves.
        offset: usize,
        /// Source byte.
        expected: u8,
        /// Destination byte.
        actual: u8,
    },

    /// `NO_SNOOP_TLP_STOP` failed.
    #[error("exerciser {instance} No-Snoop disable failed: {source}")]
    NoSnoopDisable {
        /// Exerciser instance.
        instance: u32,
        /// Error reported by the exerciser.
        source: ExerciserError,
    },
}

/// Runs test 807 through the suite driver.
pub fn entry(ctx: &mut TestContext, platform: &mut dyn Platform) -> AvsStatus {
    suite::run_test(ctx, platform, &DESCRIPTOR)
}

/// Runs one coherency trial against `exerciser`.
///
/// # Returns
///
/// * `Pass(0)` when the halves match and every command succeeded.
/// * `Fail(2)` on a command failure or a mismatch; the buffer has been released.
/// * `Error(2)` when no coherent buffer could be allocated; nothing was released.
pub fn coherency_trial(platform: &mut dyn Platform, exerciser: &ExerciserRef) -> Outcome {
    let Some(buffer) = platform.alloc_coherent(exerciser, TEST_DATA_BLK_SIZE) else {
        error!(
            bdf = %exerciser.bdf,
            instance = exerciser.instance,
            size = TEST_DATA_BLK_SIZE,
            "coherent memory allocation failed"
        );
        return Outcome::Error(STATUS_CODE_FAIL);
    };

    let result = round_trip(platform, exerciser, &buffer);
    platform.free_coherent(exerciser, buffer);

    match result {
        Ok(()) => {
            debug!(bdf = %exerciser.bdf, "I/O coherency trial passed");
            Outcome::Pass(0)
        }
        Err(err) => {
            error!(bdf = %exerciser.bdf, "{err}");
            Outcome::Fail(STATUS_CODE_FAIL)
        }
    }
}

fn round_trip(
    platform: &mut dyn Platform,
    exerciser: &ExerciserRef,
    buffer: &CoherentBuffer,
) -> Result<(), TrialError> {
    let instance = exerciser.instance;

    platform
        .ops(ExerciserOp::NoSnoopTlpStart, instance)
        .map_err(|source| TrialError::NoSnoopEnable { instance, source })?;

    let (source_half, dest_half) = buffer.halves();
    init_source_buf_data(platform, source_half);

    run_dma(platform, instance, source_half, DmaDirection::ToDevice)
        .map_err(|source| TrialError::DmaToDevice { instance, source })?;
    run_dma(platform, instance, dest_half, DmaDirection::FromDevice)
        .map_err(|source| TrialError::DmaFromDevice { instance, source })?;

    compare_halves(platform, instance, source_half, dest_half)?;

    platform
        .ops(ExerciserOp::NoSnoopTlpStop, instance)
        .map_err(|source| TrialError::NoSnoopDisable { instance, source })
}

fn run_dma(
    platform: &mut dyn Platform,
    instance: u32,
    region: BufferRegion,
    direction: DmaDirection,
) -> Result<(), ExerciserError> {
    let param = ExerciserParam::DmaAttributes {
        addr: region.phys,
        len: region.len,
    };
    platform.set_param(param, instance)?;
    platform.ops(ExerciserOp::StartDma(direction), instance)
}

fn compare_halves(
    platform: &mut dyn Platform,
    instance: u32,
    source_half: BufferRegion,
    dest_half: BufferRegion,
) -> Result<(), TrialError> {
    let mut expected = vec![0; source_half.len];
    let mut actual = vec![0; dest_half.len];
    platform.read_bytes(source_half.virt, &mut expected);
    platform.read_bytes(dest_half.virt, &mut actual);

    match expected.iter().zip(&actual).position(|(a, b)| a != b) {
        Some(offset) => Err(TrialError::CoherencyViolation {
            instance,
            offset,
            expected: expected[offset],
            actual: actual[offset],
        }),
        None => Ok(()),
    }
}

fn payload(ctx: &mut TestContext, platform: &mut dyn Platform) {
    let pe_index = platform.current_pe_index();
    let mut enumerator = ExerciserEnumerator::new(platform, EXERCISER_CLASSCODE);
    let mut verdict = Outcome::Pass(0);

    while let Some(next) = enumerator.next_device(platform) {
        let outcome = match next {
            Ok(exerciser) => {
                let outcome = coherency_trial(platform, &exerciser);
                ctx.record_device(DeviceRecord {
                    bdf: exerciser.bdf,
                    instance: exerciser.instance,
                    outcome,
                });
                outcome
            }
            Err(err) => {
                error!("{err}");
                Outcome::Error(STATUS_CODE_FAIL)
            }
        };

        verdict = verdict.merge(outcome);
        if !outcome.is_pass() && ctx.failure_policy() == FailurePolicy::AbortOnFailure {
            break;
        }
    }

    if enumerator.count() == 0 {
        info!("no exerciser present");
    }
    ctx.record_outcome(pe_index, TEST_NUM, verdict);
}
