//! Test status encoding and aggregation.
//!
//! This module defines how results are recorded and summarized. It provides:
//! 1. **Result words:** 32-bit words packing state, level, test number, and status code.
//! 2. **Outcomes:** Pass/Fail/Error/Skip with a severity order for merging per-device results.
//! 3. **Status table:** One result word per processor element.
//! 4. **Suite status:** The code each test entry returns to the suite.
//!
//! # Result word layout
//!
//! * bits 28..=31: state (START=1, END=2, PENDING=3, PASS=4, FAIL=8, SKIP=9, ERROR=0xE)
//! * bits 24..=27: compliance level
//! * bits 12..=23: test number
//! * bits 0..=11: status code

use std::fmt;

use serde::Serialize;

const STATE_SHIFT: u32 = 28;
const STATE_MASK: u32 = 0xF;
const LEVEL_SHIFT: u32 = 24;
const LEVEL_MASK: u32 = 0xF;
const TEST_NUM_SHIFT: u32 = 12;
const TEST_NUM_MASK: u32 = 0xFFF;
const STATUS_MASK: u32 = 0xFFF;

/// State nibble of a result word.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum TestState {
    /// Test entered.
    Start = 0x1,
    /// Test finished and reported.
    End = 0x2,
    /// Waiting for the payload to report.
    Pending = 0x3,
    /// Payload reported success.
    Pass = 0x4,
    /// Payload reported a failure.
    Fail = 0x8,
    /// Test did not run.
    Skip = 0x9,
    /// Payload could not run to a verdict.
    Error = 0xE,
}

impl TestState {
    const fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            0x1 => Some(Self::Start),
            0x2 => Some(Self::End),
            0x3 => Some(Self::Pending),
            0x4 => Some(Self::Pass),
            0x8 => Some(Self::Fail),
            0x9 => Some(Self::Skip),
            0xE => Some(Self::Error),
            _ => None,
        }
    }
}

/// Packed status word recorded per processor element.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ResultWord(pub u32);

impl ResultWord {
    /// Packs a result word.
    ///
    /// # Arguments
    ///
    /// * `state` - The state nibble.
    /// * `level` - Compliance level (low four bits kept).
    /// * `test_num` - Test number (low twelve bits kept).
    /// * `code` - Status code (low twelve bits kept).
    pub const fn new(state: TestState, level: u32, test_num: u32, code: u32) -> Self {
        Self(
            ((state as u32) << STATE_SHIFT)
                | ((level & LEVEL_MASK) << LEVEL_SHIFT)
                | ((test_num & TEST_NUM_MASK) << TEST_NUM_SHIFT)
                | (code & STATUS_MASK),
        )
    }

    /// Returns the state nibble, or `None` for an unassigned encoding.
    pub const fn state(&self) -> Option<TestState> {
        TestState::from_bits((self.0 >> STATE_SHIFT) & STATE_MASK)
    }

    /// Returns the compliance level.
    pub const fn level(&self) -> u32 {
        (self.0 >> LEVEL_SHIFT) & LEVEL_MASK
    }

    /// Returns the test number.
    pub const fn test_num(&self) -> u32 {
        (self.0 >> TEST_NUM_SHIFT) & TEST_NUM_MASK
    }

    /// Returns the status code.
    pub const fn code(&self) -> u32 {
        self.0 & STATUS_MASK
    }
}

impl fmt::Display for ResultWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Verdict of one payload step (one device, or one whole payload).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Outcome {
    /// Success with a status code.
    Pass(u32),
    /// Not applicable on this platform.
    Skip(u32),
    /// The platform violated the checked behaviour.
    Fail(u32),
    /// The test could not reach a verdict.
    Error(u32),
}

impl Outcome {
    const fn severity(&self) -> u8 {
        match self {
            Self::Pass(_) => 0,
            Self::Skip(_) => 1,
            Self::Fail(_) => 2,
            Self::Error(_) => 3,
        }
    }

    /// Returns `true` for `Pass`.
    pub const fn is_pass(&self) -> bool {
        matches!(self, Self::Pass(_))
    }

    /// Returns the status code carried by the outcome.
    pub const fn code(&self) -> u32 {
        match self {
            Self::Pass(code) | Self::Skip(code) | Self::Fail(code) | Self::Error(code) => *code,
        }
    }

    /// Keeps the more severe of two outcomes; ties keep `self`.
    #[must_use]
    pub const fn merge(self, other: Self) -> Self {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }

    /// Encodes the outcome as a result word.
    pub const fn to_word(self, level: u32, test_num: u32) -> ResultWord {
        let state = match self {
            Self::Pass(_) => TestState::Pass,
            Self::Skip(_) => TestState::Skip,
            Self::Fail(_) => TestState::Fail,
            Self::Error(_) => TestState::Error,
        };
        ResultWord::new(state, level, test_num, self.code())
    }
}

/// Suite-level status returned by a test entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum AvsStatus {
    /// Every PE passed.
    Pass,
    /// The test did not run.
    Skip,
    /// At least one PE failed.
    Fail,
    /// At least one PE could not reach a verdict.
    Error,
}

impl AvsStatus {
    /// Raw status value as reported to the surrounding suite.
    pub const fn raw(&self) -> u32 {
        match self {
            Self::Pass => 0x0,
            Self::Skip => 0x1000_0000,
            Self::Fail => 0x9000_0000,
            Self::Error => 0xEDCB_1234,
        }
    }
}

impl fmt::Display for AvsStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Pass => "PASS",
            Self::Skip => "SKIP",
            Self::Fail => "FAIL",
            Self::Error => "ERROR",
        };
        f.pad(text)
    }
}

/// One result word per processor element.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusTable {
    words: Vec<ResultWord>,
}

impl StatusTable {
    /// Creates a table for `num_pe` processor elements, all zero.
    pub fn new(num_pe: usize) -> Self {
        Self {
            words: vec![ResultWord(0); num_pe],
        }
    }

    /// Number of processor elements tracked.
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Returns `true` when no processor element is tracked.
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Records `word` for `pe_index`; returns `false` if the index is out of range.
    pub fn set(&mut self, pe_index: usize, word: ResultWord) -> bool {
        match self.words.get_mut(pe_index) {
            Some(slot) => {
                *slot = word;
                true
            }
            None => false,
        }
    }

    /// Returns the word recorded for `pe_index`.
    pub fn get(&self, pe_index: usize) -> Option<ResultWord> {
        self.words.get(pe_index).copied()
    }
}
