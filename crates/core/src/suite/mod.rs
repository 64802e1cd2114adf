//! Test registry and driver sequence.
//!
//! Every test entry follows the same four steps:
//! 1. **Initialize:** Mark each participating PE pending, or skipped when the test is on the
//!    skip list.
//! 2. **Run:** Execute the payload once on the current PE; the payload records its verdict.
//! 3. **Check:** Fold the words of the participating PEs into a suite status.
//! 4. **Report:** Log the END word and produce a `TestReport`.

/// Serializable per-test and per-suite reports.
pub mod report;

use std::fmt;

use tracing::{debug, error, info, warn};

use crate::context::TestContext;
use crate::exerciser::{e006, e007};
use crate::platform::Platform;
use crate::status::{AvsStatus, Outcome, ResultWord, TestState};

pub use report::{SuiteReport, TestReport};

/// Payload of a test; records its verdict through the context.
pub type Payload = fn(&mut TestContext, &mut dyn Platform);

/// Static description of one test.
#[derive(Clone, Copy)]
pub struct TestDescriptor {
    /// Test number.
    pub num: u32,
    /// One-line description.
    pub desc: &'static str,
    /// Number of PEs whose status is checked.
    pub num_pe: usize,
    /// Test body.
    pub payload: Payload,
}

impl fmt::Debug for TestDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestDescriptor")
            .field("num", &self.num)
            .field("desc", &self.desc)
            .field("num_pe", &self.num_pe)
            .finish_non_exhaustive()
    }
}

/// Every exerciser test, in execution order.
pub const EXERCISER_TESTS: &[TestDescriptor] = &[e006::DESCRIPTOR, e007::DESCRIPTOR];

/// Looks up a registered test by number.
pub fn find_test(num: u32) -> Option<&'static TestDescriptor> {
    EXERCISER_TESTS.iter().find(|t| t.num == num)
}

/// PEs whose words a test reads: the designated PE for a single-PE test, else `0..num_pe`.
fn participating_pes(num_pe: usize, pe_index: usize) -> Vec<usize> {
    if num_pe == 1 {
        vec![pe_index]
    } else {
        (0..num_pe).collect()
    }
}

/// Prepares the status table for `descriptor`.
///
/// # Arguments
///
/// * `ctx` - Run context holding the status table.
/// * `descriptor` - The test about to run.
/// * `pe_index` - Designated PE; a single-PE test records its words there.
///
/// # Returns
///
/// `AvsStatus::Skip` when the test is on the skip list (the SKIP word is recorded for every
/// participating PE), otherwise `AvsStatus::Pass` with every participating PE pending.
pub fn initialize_test(
    ctx: &mut TestContext,
    descriptor: &TestDescriptor,
    pe_index: usize,
) -> AvsStatus {
    info!(test = descriptor.num, "{}", descriptor.desc);
    ctx.clear_device_records();

    let pes = participating_pes(descriptor.num_pe, pe_index);
    let pending = ResultWord::new(TestState::Pending, ctx.level(), descriptor.num, 0);
    for &pe in &pes {
        ctx.set_status(pe, pending);
    }

    if ctx.is_skipped(descriptor.num) {
        info!(test = descriptor.num, "skipped by configuration");
        for &pe in &pes {
            ctx.record_outcome(pe, descriptor.num, Outcome::Skip(0));
        }
        return AvsStatus::Skip;
    }
    AvsStatus::Pass
}

/// Runs the payload of `descriptor` on the current PE.
pub fn run_test_payload(
    ctx: &mut TestContext,
    platform: &mut dyn Platform,
    descriptor: &TestDescriptor,
) {
    if descriptor.num_pe > 1 {
        warn!(
            test = descriptor.num,
            num_pe = descriptor.num_pe,
            "payload runs on the current PE only"
        );
    }
    debug!(
        test = descriptor.num,
        pe_index = platform.current_pe_index(),
        "running payload"
    );
    (descriptor.payload)(ctx, platform);
}

/// Folds the words of the participating PEs into a suite status.
///
/// A single-PE test reads the word of `pe_index`; a multi-PE test reads PEs `0..num_pe`.
/// Any ERROR wins, then any FAIL, then any SKIP. A PE that never reported a verdict counts
/// as an error.
pub fn check_for_error(
    ctx: &TestContext,
    test_num: u32,
    num_pe: usize,
    pe_index: usize,
) -> AvsStatus {
    let pes = participating_pes(num_pe, pe_index);
    let words: Vec<ResultWord> = pes.iter().filter_map(|&pe| ctx.status(pe)).collect();
    let states: Vec<Option<TestState>> = words.iter().map(ResultWord::state).collect();
    let any = |state: TestState| states.contains(&Some(state));

    let status = if any(TestState::Error) {
        AvsStatus::Error
    } else if any(TestState::Fail) {
        AvsStatus::Fail
    } else if any(TestState::Skip) {
        AvsStatus::Skip
    } else if words.len() < pes.len() || states.iter().any(|s| *s != Some(TestState::Pass)) {
        error!(test = test_num, "a PE did not report a verdict");
        AvsStatus::Error
    } else {
        AvsStatus::Pass
    };

    for pe in pes {
        if let Some(word) = ctx.status(pe) {
            debug!(test = test_num, pe_index = pe, %word, "PE status");
        }
    }
    status
}

/// Logs the END word of `descriptor` and builds its report.
pub fn report_status(
    ctx: &mut TestContext,
    descriptor: &TestDescriptor,
    status: AvsStatus,
    pe_index: usize,
) -> TestReport {
    let end = ResultWord::new(TestState::End, ctx.level(), descriptor.num, 0);
    match status {
        AvsStatus::Pass | AvsStatus::Skip => info!(test = descriptor.num, %end, "Result: {status}"),
        AvsStatus::Fail | AvsStatus::Error => {
            error!(test = descriptor.num, %end, "Result: {status}");
        }
    }
    TestReport {
        num: descriptor.num,
        desc: descriptor.desc,
        status,
        raw_status: status.raw(),
        words: participating_pes(descriptor.num_pe, pe_index)
            .into_iter()
            .filter_map(|pe| ctx.status(pe))
            .collect(),
        devices: ctx.take_device_records(),
    }
}

/// Runs one test through the full driver sequence and returns its report.
pub fn execute_test(
    ctx: &mut TestContext,
    platform: &mut dyn Platform,
    descriptor: &TestDescriptor,
) -> TestReport {
    let pe_index = platform.current_pe_index();
    if initialize_test(ctx, descriptor, pe_index) != AvsStatus::Skip {
        run_test_payload(ctx, platform, descriptor);
    }
    let status = check_for_error(ctx, descriptor.num, descriptor.num_pe, pe_index);
    report_status(ctx, descriptor, status, pe_index)
}

/// Runs one test through the full driver sequence.
pub fn run_test(
    ctx: &mut TestContext,
    platform: &mut dyn Platform,
    descriptor: &TestDescriptor,
) -> AvsStatus {
    execute_test(ctx, platform, descriptor).status
}

/// Runs `tests` in order and collects their reports.
pub fn run_suite(
    ctx: &mut TestContext,
    platform: &mut dyn Platform,
    tests: &[TestDescriptor],
) -> SuiteReport {
    let mut reports = Vec::with_capacity(tests.len());
    for descriptor in tests {
        reports.push(execute_test(ctx, platform, descriptor));
    }
    SuiteReport::new(reports)
}
