//! Exerciser enumeration.
//!
//! Exercisers are found by class code. The walk starts at function 0 of the first bus of ECAM
//! region 0 and, after every match, resumes at the match's successor, so the BDFs produced are
//! strictly increasing and never repeat. The walk produces at most the number of exercisers the
//! platform reports.
//!
//! The enumerator does not hold the topology borrow between steps: tests interleave
//! enumeration with mutable platform calls, so each step takes the topology again.

use tracing::{debug, warn};

use crate::common::{Bdf, EnumerationError};
use crate::platform::{ExerciserRef, PcieTopology};

/// Cursor over the exerciser functions of a platform.
#[derive(Clone, Debug)]
pub struct ExerciserEnumerator {
    class_code: u32,
    count: u32,
    produced: u32,
    cursor: Option<Bdf>,
    finished: bool,
}

impl ExerciserEnumerator {
    /// Starts a walk for functions with `class_code`.
    ///
    /// # Arguments
    ///
    /// * `topology` - Source of the exerciser count and the ECAM base.
    /// * `class_code` - 24-bit class code identifying an exerciser.
    pub fn new<T: PcieTopology + ?Sized>(topology: &T, class_code: u32) -> Self {
        let start = Bdf::new(topology.ecam_segment(0), topology.ecam_start_bus(0), 0, 0);
        let count = topology.exerciser_count();
        debug!(count, %start, "exerciser enumeration starts");
        Self {
            class_code,
            count,
            produced: 0,
            cursor: Some(start),
            finished: false,
        }
    }

    /// Number of exercisers the platform reported.
    pub const fn count(&self) -> u32 {
        self.count
    }

    /// Number of exercisers produced so far.
    pub const fn produced(&self) -> u32 {
        self.produced
    }

    /// Resolves the next exerciser.
    ///
    /// # Returns
    ///
    /// * `None` once every reported exerciser was produced, or after an error was returned.
    /// * `Some(Ok(_))` with the next device; instances are numbered from 0 in walk order.
    /// * `Some(Err(_))` once, when configuration space holds fewer exercisers than reported.
    pub fn next_device<T: PcieTopology + ?Sized>(
        &mut self,
        topology: &T,
    ) -> Option<Result<ExerciserRef, EnumerationError>> {
        if self.finished || self.produced >= self.count {
            return None;
        }
        let instance = self.produced;

        let Some(start) = self.cursor else {
            self.finished = true;
            return Some(Err(EnumerationError::AddressSpaceExhausted { instance }));
        };

        let not_found = EnumerationError::NotFound {
            instance,
            class_code: self.class_code,
            start,
        };
        let bdf = match topology.find_bdf(self.class_code, start) {
            Some(bdf) if bdf >= start => bdf,
            Some(bdf) => {
                warn!(%bdf, %start, "topology returned a function before the cursor");
                self.finished = true;
                return Some(Err(not_found));
            }
            None => {
                self.finished = true;
                return Some(Err(not_found));
            }
        };

        self.cursor = bdf.successor();
        self.produced += 1;
        debug!(instance, %bdf, "exerciser found");
        Some(Ok(ExerciserRef {
            bdf,
            instance,
            handle: topology.device_handle(bdf),
        }))
    }
}
