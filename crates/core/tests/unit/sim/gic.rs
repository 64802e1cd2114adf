use std::cell::Cell;
use std::rc::Rc;

use exerciser_avs_core::common::{Bdf, IrqError};
use exerciser_avs_core::config::{ExerciserConfig, IntxConfig, MemoryConfig};
use exerciser_avs_core::platform::{ExerciserControl, ExerciserOp, IsrHandler};
use exerciser_avs_core::sim::{Gic, HostMemory, Interconnect, SimExerciser};

const LINE: u32 = 40;

fn interconnect() -> Interconnect {
    let mut config = ExerciserConfig::at(Bdf::new(0, 1, 0, 0));
    config.intx = Some(IntxConfig { pin: 1, line: 40 });
    Interconnect::new(
        HostMemory::new(&MemoryConfig::default()),
        vec![SimExerciser::new(&config)],
        true,
    )
}

fn counting_handler(count: &Rc<Cell<u32>>, acknowledge: bool) -> IsrHandler {
    let count = Rc::clone(count);
    Box::new(move |control: &mut dyn ExerciserControl| {
        count.set(count.get() + 1);
        if acknowledge {
            control.ops(ExerciserOp::ClearIntr(LINE), 0).unwrap();
        }
    })
}

#[test]
fn test_install_rejects_bad_lines() {
    let mut gic = Gic::new(63);
    let count = Rc::new(Cell::new(0));

    assert_eq!(
        gic.install(64, counting_handler(&count, true)),
        Err(IrqError::InvalidLine { line: 64, max: 63 })
    );
    gic.install(LINE, counting_handler(&count, true)).unwrap();
    assert_eq!(
        gic.install(LINE, counting_handler(&count, true)),
        Err(IrqError::AlreadyInstalled(LINE))
    );
    assert!(gic.is_installed(LINE));
    assert!(gic.free(LINE));
    assert!(!gic.free(LINE));
}

#[test]
fn test_dispatch_without_assertion_runs_nothing() {
    let mut gic = Gic::new(63);
    let mut ic = interconnect();
    let count = Rc::new(Cell::new(0));
    gic.install(LINE, counting_handler(&count, true)).unwrap();

    assert_eq!(gic.dispatch(&mut ic), 0);
    assert_eq!(count.get(), 0);
}

#[test]
fn test_acknowledged_interrupt_is_delivered_once() {
    let mut gic = Gic::new(63);
    let mut ic = interconnect();
    let count = Rc::new(Cell::new(0));
    gic.install(LINE, counting_handler(&count, true)).unwrap();

    ic.ops(ExerciserOp::GenerateLegacyIntr(LINE), 0).unwrap();
    assert_eq!(gic.dispatch(&mut ic), 1);
    assert_eq!(gic.dispatch(&mut ic), 0);

    assert_eq!(count.get(), 1);
    assert_eq!(gic.delivered(), 1);
    assert!(ic.asserted_lines().is_empty());
}

#[test]
fn test_unacknowledged_line_stays_asserted() {
    let mut gic = Gic::new(63);
    let mut ic = interconnect();
    let count = Rc::new(Cell::new(0));
    gic.install(LINE, counting_handler(&count, false)).unwrap();

    ic.ops(ExerciserOp::GenerateLegacyIntr(LINE), 0).unwrap();
    for _ in 0..3 {
        gic.dispatch(&mut ic);
    }

    assert_eq!(count.get(), 3);
    assert_eq!(ic.asserted_lines(), vec![LINE]);
}

#[test]
fn test_line_without_handler_stays_pending() {
    let mut gic = Gic::new(63);
    let mut ic = interconnect();

    ic.ops(ExerciserOp::GenerateLegacyIntr(LINE), 0).unwrap();

    assert_eq!(gic.dispatch(&mut ic), 0);
    assert_eq!(ic.asserted_lines(), vec![LINE]);
}
