//! Test and suite reports.
//!
//! Reports are plain data: they serialize to JSON for machines and render as a fixed-width
//! summary in the style of the suite console output.

use std::fmt;

use serde::Serialize;

use crate::context::DeviceRecord;
use crate::status::{AvsStatus, ResultWord};

/// Result of one test.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TestReport {
    /// Test number.
    pub num: u32,
    /// One-line description.
    pub desc: &'static str,
    /// Suite status.
    pub status: AvsStatus,
    /// Raw suite status value.
    pub raw_status: u32,
    /// Final result word of each participating PE.
    pub words: Vec<ResultWord>,
    /// Per-device outcomes recorded by the payload.
    pub devices: Vec<DeviceRecord>,
}

/// Result of a suite run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SuiteReport {
    /// Tests in execution order.
    pub tests: Vec<TestReport>,
    /// Number of passing tests.
    pub passed: usize,
    /// Number of failing tests.
    pub failed: usize,
    /// Number of skipped tests.
    pub skipped: usize,
    /// Number of tests that could not reach a verdict.
    pub errors: usize,
}

impl SuiteReport {
    /// Builds the summary counts over `tests`.
    pub fn new(tests: Vec<TestReport>) -> Self {
        let count = |status: AvsStatus| tests.iter().filter(|t| t.status == status).count();
        Self {
            passed: count(AvsStatus::Pass),
            failed: count(AvsStatus::Fail),
            skipped: count(AvsStatus::Skip),
            errors: count(AvsStatus::Error),
            tests,
        }
    }

    /// Most severe status over all tests; an empty suite passes.
    pub const fn overall(&self) -> AvsStatus {
        if self.errors > 0 {
            AvsStatus::Error
        } else if self.failed > 0 {
            AvsStatus::Fail
        } else if self.passed == 0 && self.skipped > 0 {
            AvsStatus::Skip
        } else {
            AvsStatus::Pass
        }
    }

    /// Pretty-printed JSON form of the report.
    ///
    /// # Errors
    ///
    /// Returns the serializer error; the report types contain nothing that fails to serialize.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for SuiteReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "==========================================================")?;
        writeln!(f, "EXERCISER TEST SUMMARY")?;
        writeln!(f, "==========================================================")?;
        for test in &self.tests {
            writeln!(f, "{:>4}  {:<40} {:>6}", test.num, test.desc, test.status)?;
            for device in &test.devices {
                writeln!(
                    f,
                    "        instance {:<3} {}  {:?}",
                    device.instance, device.bdf, device.outcome
                )?;
            }
        }
        writeln!(f, "----------------------------------------------------------")?;
        writeln!(
            f,
            "passed {}  failed {}  skipped {}  errors {}",
            self.passed, self.failed, self.skipped, self.errors
        )?;
        write!(f, "overall                                        {:>6}", self.overall())
    }
}
