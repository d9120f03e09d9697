//! Region activation to stimulus translation.
//!
//! Region `i` drives stimulus channel `i`. The encoder remembers the last
//! vector it produced so callers can publish only on change.

use rallyloop_core::types::{RegionFlags, StimulusVector};

/// Stateless 1:1 mapping from region flags to channel commands.
#[must_use]
pub fn encode(regions: &RegionFlags) -> StimulusVector {
    StimulusVector::from_flags(regions)
}

/// Change-detecting region encoder.
#[derive(Clone, Debug)]
pub struct StimulusEncoder {
    last: StimulusVector,
    changes: u64,
}

impl StimulusEncoder {
    /// Create an encoder whose previous output is all inactive.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            last: StimulusVector::all_inactive(),
            changes: 0,
        }
    }

    /// Encode `regions`, returning the vector only if it differs from the
    /// previous one.
    pub fn update(&mut self, regions: &RegionFlags) -> Option<StimulusVector> {
        let next = encode(regions);
        if next == self.last {
            return None;
        }
        self.last = next;
        self.changes += 1;
        Some(next)
    }

    /// Last vector produced.
    #[must_use]
    pub const fn last(&self) -> StimulusVector {
        self.last
    }

    /// Number of changes emitted.
    #[must_use]
    pub const fn changes(&self) -> u64 {
        self.changes
    }
}

impl Default for StimulusEncoder {
    fn default() -> Self {
        Self::new()
    }
}
