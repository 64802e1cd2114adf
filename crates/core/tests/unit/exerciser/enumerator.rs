//! # Enumerator Tests
//!
//! Exercisers are produced in strictly increasing BDF order, at most as many as reported, and
//! a short topology ends the walk with a single error.

use exerciser_avs_core::common::constants::EXERCISER_CLASSCODE;
use exerciser_avs_core::common::{Bdf, EnumerationError};
use exerciser_avs_core::exerciser::ExerciserEnumerator;
use proptest::prelude::*;

use crate::common::mocks::ScriptedPlatform;

fn platform_with(bdfs: &[Bdf]) -> ScriptedPlatform {
    ScriptedPlatform::new(ScriptedPlatform::accepting_control(), bdfs)
}

#[test]
fn test_produces_each_exerciser_once_in_order() {
    let bdfs = [Bdf::new(0, 3, 0, 0), Bdf::new(0, 1, 0, 0), Bdf::new(0, 1, 0, 1)];
    let platform = platform_with(&bdfs);
    let mut enumerator = ExerciserEnumerator::new(&platform, EXERCISER_CLASSCODE);

    let mut found = Vec::new();
    while let Some(next) = enumerator.next_device(&platform) {
        found.push(next.unwrap());
    }

    let order: Vec<Bdf> = found.iter().map(|e| e.bdf).collect();
    assert_eq!(
        order,
        vec![Bdf::new(0, 1, 0, 0), Bdf::new(0, 1, 0, 1), Bdf::new(0, 3, 0, 0)]
    );
    let instances: Vec<u32> = found.iter().map(|e| e.instance).collect();
    assert_eq!(instances, vec![0, 1, 2]);
    assert_eq!(enumerator.produced(), 3);
}

#[test]
fn test_stops_at_reported_count() {
    let mut platform = platform_with(&[Bdf::new(0, 1, 0, 0), Bdf::new(0, 2, 0, 0)]);
    platform.reported = 1;
    let mut enumerator = ExerciserEnumerator::new(&platform, EXERCISER_CLASSCODE);

    assert_eq!(
        enumerator.next_device(&platform).unwrap().unwrap().bdf,
        Bdf::new(0, 1, 0, 0)
    );
    assert!(enumerator.next_device(&platform).is_none());
}

#[test]
fn test_short_topology_yields_one_error() {
    let mut platform = platform_with(&[Bdf::new(0, 1, 0, 0)]);
    platform.reported = 3;
    let mut enumerator = ExerciserEnumerator::new(&platform, EXERCISER_CLASSCODE);

    assert!(enumerator.next_device(&platform).unwrap().is_ok());
    let err = enumerator.next_device(&platform).unwrap().unwrap_err();
    assert_eq!(
        err,
        EnumerationError::NotFound {
            instance: 1,
            class_code: EXERCISER_CLASSCODE,
            start: Bdf::new(0, 1, 0, 1),
        }
    );
    assert!(enumerator.next_device(&platform).is_none());
}

#[test]
fn test_last_function_exhausts_address_space() {
    let last = Bdf::new(u16::MAX, 0xFF, 31, 7);
    let mut platform = platform_with(&[last]);
    platform.reported = 2;
    let mut enumerator = ExerciserEnumerator::new(&platform, EXERCISER_CLASSCODE);

    assert_eq!(enumerator.next_device(&platform).unwrap().unwrap().bdf, last);
    assert_eq!(
        enumerator.next_device(&platform).unwrap().unwrap_err(),
        EnumerationError::AddressSpaceExhausted { instance: 1 }
    );
}

#[test]
fn test_zero_exercisers_yields_nothing() {
    let platform = platform_with(&[]);
    let mut enumerator = ExerciserEnumerator::new(&platform, EXERCISER_CLASSCODE);
    assert_eq!(enumerator.count(), 0);
    assert!(enumerator.next_device(&platform).is_none());
}

proptest! {
    #[test]
    fn test_walk_is_strictly_increasing(
        slots in proptest::collection::btree_set((0u8..4, 0u8..32, 0u8..8), 0..24)
    ) {
        let bdfs: Vec<Bdf> = slots
            .iter()
            .map(|&(bus, device, function)| Bdf::new(0, bus, device, function))
            .collect();
        let platform = platform_with(&bdfs);
        let mut enumerator = ExerciserEnumerator::new(&platform, EXERCISER_CLASSCODE);

        let mut walked = Vec::new();
        while let Some(next) = enumerator.next_device(&platform) {
            walked.push(next.unwrap().bdf);
        }
        prop_assert_eq!(walked.len(), bdfs.len());
        prop_assert!(walked.windows(2).all(|w| w[0] < w[1]));
    }
}
