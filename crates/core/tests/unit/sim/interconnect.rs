use exerciser_avs_core::common::{Bdf, ExerciserError, PhysAddr};
use exerciser_avs_core::config::{ExerciserConfig, MemoryAttribute, MemoryConfig};
use exerciser_avs_core::platform::{DmaDirection, ExerciserControl, ExerciserOp, ExerciserParam};
use exerciser_avs_core::sim::{DmaStats, HostMemory, Interconnect, SimExerciser};
use rstest::rstest;

fn card(bus: u8) -> SimExerciser {
    SimExerciser::new(&ExerciserConfig::at(Bdf::new(0, bus, 0, 0)))
}

fn interconnect(attribute: MemoryAttribute, honor_no_snoop: bool) -> Interconnect {
    let memory = HostMemory::new(&MemoryConfig {
        attribute,
        ..MemoryConfig::default()
    });
    Interconnect::new(memory, vec![card(1)], honor_no_snoop)
}

fn dma(ic: &mut Interconnect, addr: PhysAddr, len: usize, direction: DmaDirection) {
    ic.set_param(ExerciserParam::DmaAttributes { addr, len }, 0).unwrap();
    ic.ops(ExerciserOp::StartDma(direction), 0).unwrap();
}

#[test]
fn test_instances_follow_bdf_order() {
    let memory = HostMemory::new(&MemoryConfig::default());
    let ic = Interconnect::new(memory, vec![card(3), card(1), card(2)], true);

    let buses: Vec<u8> = ic.exercisers().iter().map(|e| e.bdf().bus).collect();
    assert_eq!(buses, vec![1, 2, 3]);
    assert_eq!(ic.exerciser(1).map(SimExerciser::bdf), Some(Bdf::new(0, 2, 0, 0)));
    assert!(ic.exerciser(3).is_none());
}

#[test]
fn test_no_snoop_toggles() {
    let mut ic = interconnect(MemoryAttribute::NonCacheable, true);

    ic.ops(ExerciserOp::NoSnoopTlpStart, 0).unwrap();
    assert!(ic.exerciser(0).unwrap().no_snoop());
    ic.ops(ExerciserOp::NoSnoopTlpStop, 0).unwrap();
    assert!(!ic.exerciser(0).unwrap().no_snoop());
}

#[test]
fn test_command_errors() {
    let mut ic = interconnect(MemoryAttribute::NonCacheable, true);
    let addr = PhysAddr(MemoryConfig::default().pool_base);

    assert_eq!(
        ic.ops(ExerciserOp::NoSnoopTlpStart, 7),
        Err(ExerciserError::UnknownInstance(7))
    );
    assert_eq!(
        ic.ops(ExerciserOp::StartDma(DmaDirection::ToDevice), 0),
        Err(ExerciserError::DmaNotConfigured { instance: 0 })
    );
    assert_eq!(
        ic.set_param(ExerciserParam::DmaAttributes { addr, len: 8192 }, 0),
        Err(ExerciserError::DmaTooLarge {
            instance: 0,
            len: 8192,
            capacity: 4096
        })
    );
    assert_eq!(
        ic.ops(ExerciserOp::GenerateLegacyIntr(36), 0),
        Err(ExerciserError::NoLegacyInterrupt { instance: 0 })
    );
}

#[test]
fn test_dma_outside_memory_faults() {
    let mut ic = interconnect(MemoryAttribute::NonCacheable, true);
    let addr = PhysAddr(0x1000);

    ic.set_param(ExerciserParam::DmaAttributes { addr, len: 64 }, 0).unwrap();
    assert_eq!(
        ic.ops(ExerciserOp::StartDma(DmaDirection::FromDevice), 0),
        Err(ExerciserError::DmaFault {
            instance: 0,
            addr,
            len: 64
        })
    );
    assert_eq!(ic.stats().faulted, 1);
}

#[test]
fn test_round_trip_copies_through_card_buffer() {
    let mut ic = interconnect(MemoryAttribute::NonCacheable, true);
    let region = ic.memory_mut().alloc(128).unwrap();
    let (src, dst) = region.split_at(64);
    ic.memory_mut().cpu_write(src.virt, &[0x77; 64]);

    dma(&mut ic, src.phys, 64, DmaDirection::ToDevice);
    dma(&mut ic, dst.phys, 64, DmaDirection::FromDevice);

    assert_eq!(&ic.exerciser(0).unwrap().buffer()[..64], &[0x77; 64]);
    let mut readback = [0; 64];
    ic.memory_mut().cpu_read(dst.virt, &mut readback);
    assert_eq!(readback, [0x77; 64]);
}

#[rstest]
#[case::honoured(true, DmaStats { snooped: 0, no_snoop: 1, faulted: 0 }, 0x00)]
#[case::ignored(false, DmaStats { snooped: 1, no_snoop: 0, faulted: 0 }, 0x77)]
fn test_no_snoop_read_under_dirty_cache(
    #[case] honor: bool,
    #[case] stats: DmaStats,
    #[case] device_sees: u8,
) {
    let mut ic = interconnect(MemoryAttribute::Cacheable, honor);
    let region = ic.memory_mut().alloc(64).unwrap();
    ic.memory_mut().cpu_write(region.virt, &[0x77; 64]);

    ic.ops(ExerciserOp::NoSnoopTlpStart, 0).unwrap();
    dma(&mut ic, region.phys, 64, DmaDirection::ToDevice);

    assert_eq!(ic.stats(), stats);
    assert_eq!(&ic.exerciser(0).unwrap().buffer()[..64], &[device_sees; 64]);
}
