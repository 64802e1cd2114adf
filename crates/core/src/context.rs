//! Explicit per-run test context.
//!
//! Everything the suite tracks while a test runs lives here instead of in globals:
//! the compliance level, the skip list, the failure policy, the per-PE status table, and the
//! per-device records of the test currently running. One context is built per suite run and
//! passed by `&mut` into every driver step and payload.

use serde::Serialize;
use tracing::warn;

use crate::common::Bdf;
use crate::config::{FailurePolicy, GeneralConfig};
use crate::status::{Outcome, ResultWord, StatusTable};

/// Outcome of one device within one test.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct DeviceRecord {
    /// Device the outcome applies to.
    pub bdf: Bdf,
    /// Exerciser instance number.
    pub instance: u32,
    /// Verdict for this device.
    pub outcome: Outcome,
}

/// Per-run state threaded through the driver and the payloads.
#[derive(Clone, Debug)]
pub struct TestContext {
    level: u32,
    skip_tests: Vec<u32>,
    failure_policy: FailurePolicy,
    interrupt_timeout: u64,
    status: StatusTable,
    records: Vec<DeviceRecord>,
}

impl TestContext {
    /// Creates a context for a system with `num_pe` processor elements.
    pub fn new(general: &GeneralConfig, num_pe: usize) -> Self {
        Self {
            level: general.level,
            skip_tests: general.skip_tests.clone(),
            failure_policy: general.failure_policy,
            interrupt_timeout: general.interrupt_timeout,
            status: StatusTable::new(num_pe),
            records: Vec::new(),
        }
    }

    /// Compliance level stamped into result words.
    pub const fn level(&self) -> u32 {
        self.level
    }

    /// Behaviour after a failing device.
    pub const fn failure_policy(&self) -> FailurePolicy {
        self.failure_policy
    }

    /// Interrupt polls before a legacy interrupt is declared lost.
    pub const fn interrupt_timeout(&self) -> u64 {
        self.interrupt_timeout
    }

    /// Returns `true` if `test_num` is on the skip list.
    pub fn is_skipped(&self, test_num: u32) -> bool {
        self.skip_tests.contains(&test_num)
    }

    /// Records a raw result word for `pe_index`.
    pub fn set_status(&mut self, pe_index: usize, word: ResultWord) {
        if !self.status.set(pe_index, word) {
            warn!(pe_index, %word, "status for unknown PE dropped");
        }
    }

    /// Records `outcome` of test `test_num` for `pe_index`.
    pub fn record_outcome(&mut self, pe_index: usize, test_num: u32, outcome: Outcome) {
        let word = outcome.to_word(self.level, test_num);
        self.set_status(pe_index, word);
    }

    /// Result word last recorded for `pe_index`.
    pub fn status(&self, pe_index: usize) -> Option<ResultWord> {
        self.status.get(pe_index)
    }

    /// Appends a per-device record for the running test.
    pub fn record_device(&mut self, record: DeviceRecord) {
        self.records.push(record);
    }

    /// Per-device records of the running test.
    pub fn device_records(&self) -> &[DeviceRecord] {
        &self.records
    }

    /// Drops the per-device records left by the previous test.
    pub fn clear_device_records(&mut self) {
        self.records.clear();
    }

    /// Removes and returns the per-device records of the running test.
    pub fn take_device_records(&mut self) -> Vec<DeviceRecord> {
        std::mem::take(&mut self.records)
    }
}
