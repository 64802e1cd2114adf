//! # I/O Coherency Tests
//!
//! Trial ordering and cleanup against a scripted exerciser, and end-to-end verdicts against
//! the simulated platform's cache model.

use exerciser_avs_core::common::constants::STATUS_CODE_FAIL;
use exerciser_avs_core::common::{Bdf, ExerciserError};
use exerciser_avs_core::config::{
    Config, ExerciserFaults, FailurePolicy, GeneralConfig, MemoryAttribute,
};
use exerciser_avs_core::exerciser::e007::{self, coherency_trial};
use exerciser_avs_core::platform::{
    DeviceHandle, DmaDirection, ExerciserOp, ExerciserParam, ExerciserRef,
};
use exerciser_avs_core::status::{AvsStatus, Outcome, ResultWord, TestState};
use exerciser_avs_core::suite::{self, TestReport};
use exerciser_avs_core::TestContext;
use mockall::Sequence;
use mockall::predicate::eq;
use pretty_assertions::assert_eq;
use rstest::rstest;

use crate::common::harness::{Harness, cacheable_no_snoop, config_with_exercisers, init_tracing};
use crate::common::mocks::{MockControl, ScriptedPlatform};

fn exerciser(bus: u8, instance: u32) -> ExerciserRef {
    ExerciserRef {
        bdf: Bdf::new(0, bus, 0, 0),
        instance,
        handle: DeviceHandle(u64::from(bus)),
    }
}

fn run_scripted(platform: &mut ScriptedPlatform, policy: FailurePolicy) -> (TestReport, TestContext) {
    init_tracing();
    let general = GeneralConfig {
        failure_policy: policy,
        ..GeneralConfig::default()
    };
    let mut ctx = TestContext::new(&general, 1);
    let report = suite::execute_test(&mut ctx, platform, &e007::DESCRIPTOR);
    (report, ctx)
}

fn rejected(op: ExerciserOp, instance: u32) -> ExerciserError {
    ExerciserError::CommandRejected { instance, op }
}

#[test]
fn test_trial_issues_commands_in_order() {
    let mut control = MockControl::new();
    let mut seq = Sequence::new();
    control
        .expect_ops()
        .with(eq(ExerciserOp::NoSnoopTlpStart), eq(0))
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Ok(()));
    control
        .expect_set_param()
        .withf(|param, instance| {
            *instance == 0 && matches!(param, ExerciserParam::DmaAttributes { len: 256, .. })
        })
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Ok(()));
    control
        .expect_ops()
        .with(eq(ExerciserOp::StartDma(DmaDirection::ToDevice)), eq(0))
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Ok(()));
    control
        .expect_set_param()
        .withf(|param, instance| {
            *instance == 0 && matches!(param, ExerciserParam::DmaAttributes { len: 256, .. })
        })
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Ok(()));
    control
        .expect_ops()
        .with(eq(ExerciserOp::StartDma(DmaDirection::FromDevice)), eq(0))
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Ok(()));
    control
        .expect_ops()
        .with(eq(ExerciserOp::NoSnoopTlpStop), eq(0))
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Ok(()));

    let mut platform = ScriptedPlatform::new(control, &[Bdf::new(0, 1, 0, 0)]);
    assert_eq!(coherency_trial(&mut platform, &exerciser(1, 0)), Outcome::Pass(0));
    assert_eq!(platform.allocations.len(), 1);
    assert!(platform.balanced());
}

#[test]
fn test_dma_addresses_are_the_two_halves() {
    let mut control = MockControl::new();
    control.expect_ops().returning(|_, _| Ok(()));
    let (tx, rx) = std::sync::mpsc::channel();
    control.expect_set_param().returning(move |param, _| {
        tx.send(param).unwrap();
        Ok(())
    });

    let mut platform = ScriptedPlatform::new(control, &[Bdf::new(0, 1, 0, 0)]);
    assert!(coherency_trial(&mut platform, &exerciser(1, 0)).is_pass());
    let seen: Vec<ExerciserParam> = rx.try_iter().collect();

    let base = platform.allocations[0];
    assert_eq!(
        seen,
        vec![
            ExerciserParam::DmaAttributes {
                addr: base,
                len: 256
            },
            ExerciserParam::DmaAttributes {
                addr: base.offset(256),
                len: 256
            },
        ]
    );
}

#[test]
fn test_scenario_a_single_exerciser_passes() {
    let mut platform =
        ScriptedPlatform::new(ScriptedPlatform::accepting_control(), &[Bdf::new(0, 1, 0, 0)]);
    let (report, _) = run_scripted(&mut platform, FailurePolicy::AbortOnFailure);

    assert_eq!(report.status, AvsStatus::Pass);
    assert_eq!(report.words, vec![ResultWord::new(TestState::Pass, 4, 807, 0)]);
    assert_eq!(report.devices.len(), 1);
    assert!(platform.balanced());
}

#[test]
fn test_scenario_b_corrupted_readback_fails_and_releases() {
    let mut config = config_with_exercisers(1);
    config.pcie.exercisers[0].faults.corrupt_readback = true;
    let mut harness = Harness::new(&config);

    let report = harness.run(&e007::DESCRIPTOR);

    assert_eq!(report.status, AvsStatus::Fail);
    assert_eq!(
        report.words,
        vec![ResultWord::new(TestState::Fail, 4, 807, STATUS_CODE_FAIL)]
    );
    let stats = harness.platform.memory().stats();
    assert_eq!(stats.allocations, 1);
    assert_eq!(stats.releases, 1);
    assert_eq!(harness.platform.memory().live_allocations(), 0);
}

#[test]
fn test_scenario_c_allocation_failure_is_error_without_release() {
    let mut control = MockControl::new();
    control.expect_ops().never();
    control.expect_set_param().never();
    let mut platform = ScriptedPlatform::new(control, &[Bdf::new(0, 1, 0, 0)]);
    platform.fail_alloc = true;

    let (report, _) = run_scripted(&mut platform, FailurePolicy::AbortOnFailure);

    assert_eq!(report.status, AvsStatus::Error);
    assert_eq!(
        report.words,
        vec![ResultWord::new(TestState::Error, 4, 807, STATUS_CODE_FAIL)]
    );
    assert!(platform.releases.is_empty());
}

#[rstest]
#[case(FailurePolicy::AbortOnFailure, vec![Outcome::Pass(0), Outcome::Fail(2)])]
#[case(
    FailurePolicy::Continue,
    vec![Outcome::Pass(0), Outcome::Fail(2), Outcome::Pass(0)]
)]
fn test_scenario_d_second_dma_start_fails(
    #[case] policy: FailurePolicy,
    #[case] expected: Vec<Outcome>,
) {
    let mut control = MockControl::new();
    control.expect_set_param().returning(|_, _| Ok(()));
    control.expect_ops().returning(|op, instance| {
        if instance == 1 && op == ExerciserOp::StartDma(DmaDirection::ToDevice) {
            Err(rejected(op, instance))
        } else {
            Ok(())
        }
    });
    let bdfs = [Bdf::new(0, 1, 0, 0), Bdf::new(0, 2, 0, 0), Bdf::new(0, 3, 0, 0)];
    let mut platform = ScriptedPlatform::new(control, &bdfs);

    let (report, _) = run_scripted(&mut platform, policy);

    assert_eq!(report.status, AvsStatus::Fail);
    let outcomes: Vec<Outcome> = report.devices.iter().map(|d| d.outcome).collect();
    assert_eq!(outcomes, expected);
    assert_eq!(platform.allocations.len(), expected.len());
    assert!(platform.balanced());
}

#[test]
fn test_later_pass_does_not_mask_earlier_fail() {
    let mut control = MockControl::new();
    control.expect_set_param().returning(|_, _| Ok(()));
    control.expect_ops().returning(|op, instance| {
        if instance == 0 && op == ExerciserOp::NoSnoopTlpStop {
            Err(rejected(op, instance))
        } else {
            Ok(())
        }
    });
    let mut platform =
        ScriptedPlatform::new(control, &[Bdf::new(0, 1, 0, 0), Bdf::new(0, 2, 0, 0)]);

    let (report, _) = run_scripted(&mut platform, FailurePolicy::Continue);

    assert_eq!(report.status, AvsStatus::Fail);
    assert_eq!(report.devices[1].outcome, Outcome::Pass(0));
}

#[test]
fn test_enumeration_shortfall_is_error() {
    let mut platform =
        ScriptedPlatform::new(ScriptedPlatform::accepting_control(), &[Bdf::new(0, 1, 0, 0)]);
    platform.reported = 2;

    let (report, _) = run_scripted(&mut platform, FailurePolicy::Continue);

    assert_eq!(report.status, AvsStatus::Error);
    assert_eq!(report.devices.len(), 1);
    assert!(platform.balanced());
}

#[test]
fn test_no_exercisers_passes() {
    let mut platform = ScriptedPlatform::new(MockControl::new(), &[]);
    let (report, _) = run_scripted(&mut platform, FailurePolicy::AbortOnFailure);
    assert_eq!(report.status, AvsStatus::Pass);
    assert!(report.devices.is_empty());
}

#[rstest]
#[case::non_cacheable(MemoryAttribute::NonCacheable, true, AvsStatus::Pass)]
#[case::cacheable_no_snoop_honoured(MemoryAttribute::Cacheable, true, AvsStatus::Fail)]
#[case::cacheable_fabric_snoops(MemoryAttribute::Cacheable, false, AvsStatus::Pass)]
#[case::non_cacheable_fabric_snoops(MemoryAttribute::NonCacheable, false, AvsStatus::Pass)]
fn test_cache_model_verdicts(
    #[case] attribute: MemoryAttribute,
    #[case] honor_no_snoop: bool,
    #[case] expected: AvsStatus,
) {
    let mut config = config_with_exercisers(2);
    config.memory.attribute = attribute;
    config.interconnect.honor_no_snoop = honor_no_snoop;
    config.general.failure_policy = FailurePolicy::Continue;
    let mut harness = Harness::new(&config);

    let report = harness.run(&e007::DESCRIPTOR);

    assert_eq!(report.status, expected);
    assert_eq!(report.devices.len(), 2);
    assert_eq!(harness.platform.memory().live_allocations(), 0);
}

#[test]
fn test_no_snoop_dma_reaches_dram_only() {
    let mut harness = Harness::new(&cacheable_no_snoop(config_with_exercisers(1)));
    harness.run(&e007::DESCRIPTOR);

    let dma = harness.platform.interconnect().stats();
    assert_eq!(dma.no_snoop, 2);
    assert_eq!(dma.snooped, 0);
    assert!(harness.platform.memory().cache().dirty_lines() > 0);
}

#[rstest]
#[case::no_snoop_start(|f: &mut ExerciserFaults| f.fail_no_snoop_start = true)]
#[case::dma_to_device(|f: &mut ExerciserFaults| f.fail_dma_to_device = true)]
#[case::dma_from_device(|f: &mut ExerciserFaults| f.fail_dma_from_device = true)]
#[case::no_snoop_stop(|f: &mut ExerciserFaults| f.fail_no_snoop_stop = true)]
fn test_injected_faults_fail_and_release(#[case] inject: fn(&mut ExerciserFaults)) {
    let mut config: Config = config_with_exercisers(1);
    inject(&mut config.pcie.exercisers[0].faults);
    let mut harness = Harness::new(&config);

    let report = harness.run(&e007::DESCRIPTOR);

    assert_eq!(report.status, AvsStatus::Fail);
    assert_eq!(report.devices[0].outcome, Outcome::Fail(STATUS_CODE_FAIL));
    assert_eq!(harness.platform.memory().live_allocations(), 0);
}

#[test]
fn test_exhausted_pool_is_error() {
    let mut config = config_with_exercisers(1);
    config.memory.pool_size = 256;
    let mut harness = Harness::new(&config);

    let report = harness.run(&e007::DESCRIPTOR);

    assert_eq!(report.status, AvsStatus::Error);
    assert_eq!(harness.platform.memory().stats().failed_allocations, 1);
    assert_eq!(harness.platform.memory().stats().releases, 0);
}
