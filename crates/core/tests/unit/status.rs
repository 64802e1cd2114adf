//! # Status Tests
//!
//! Result-word packing, outcome merging, and the per-PE status table.

use exerciser_avs_core::status::{AvsStatus, Outcome, ResultWord, StatusTable, TestState};
use rstest::rstest;

#[rstest]
#[case(Outcome::Pass(0), TestState::Pass, 0)]
#[case(Outcome::Skip(0), TestState::Skip, 0)]
#[case(Outcome::Fail(2), TestState::Fail, 2)]
#[case(Outcome::Error(2), TestState::Error, 2)]
fn test_outcome_encodes_state_and_code(
    #[case] outcome: Outcome,
    #[case] state: TestState,
    #[case] code: u32,
) {
    let word = outcome.to_word(4, 807);
    assert_eq!(word.state(), Some(state));
    assert_eq!(word.code(), code);
    assert_eq!(word.test_num(), 807);
    assert_eq!(word.level(), 4);
}

#[test]
fn test_fields_are_masked() {
    let word = ResultWord::new(TestState::Pass, 0x1F, 0x1FFF, 0x1FFF);
    assert_eq!(word.level(), 0xF);
    assert_eq!(word.test_num(), 0xFFF);
    assert_eq!(word.code(), 0xFFF);
    assert_eq!(word.state(), Some(TestState::Pass));
}

#[test]
fn test_unassigned_state_nibble() {
    assert_eq!(ResultWord(0).state(), None);
    assert_eq!(ResultWord(0x5000_0000).state(), None);
}

#[test]
fn test_display_is_zero_padded_hex() {
    assert_eq!(ResultWord::new(TestState::Pass, 4, 806, 1).to_string(), "0x44326001");
}

#[rstest]
#[case(Outcome::Pass(0), Outcome::Skip(0), Outcome::Skip(0))]
#[case(Outcome::Skip(0), Outcome::Fail(2), Outcome::Fail(2))]
#[case(Outcome::Error(2), Outcome::Fail(2), Outcome::Error(2))]
#[case(Outcome::Pass(1), Outcome::Pass(0), Outcome::Pass(1))]
fn test_merge_keeps_most_severe(#[case] a: Outcome, #[case] b: Outcome, #[case] merged: Outcome) {
    assert_eq!(a.merge(b), merged);
}

#[test]
fn test_raw_suite_status_values() {
    assert_eq!(AvsStatus::Pass.raw(), 0);
    assert_eq!(AvsStatus::Skip.raw(), 0x1000_0000);
    assert_eq!(AvsStatus::Fail.raw(), 0x9000_0000);
    assert_eq!(AvsStatus::Error.raw(), 0xEDCB_1234);
}

#[test]
fn test_status_table_bounds() {
    let mut table = StatusTable::new(2);
    let word = ResultWord::new(TestState::Pending, 4, 807, 0);
    assert!(table.set(1, word));
    assert!(!table.set(2, word));
    assert_eq!(table.get(1), Some(word));
    assert_eq!(table.get(2), None);
    assert_eq!(table.len(), 2);
    assert_eq!(table.get(0), Some(ResultWord(0)));
}
