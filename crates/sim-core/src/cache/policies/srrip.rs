//! Static re-reference interval prediction (SRRIP) replacement (spec.md §4.B).
//!
//! No teacher precedent exists for this policy; it is shaped like the
//! per-set `Vec<u8>` counter arrays the teacher's LRU/PLRU-style policies
//! use, carrying one saturating RRPV counter per way instead of a usage
//! stack.

use crate::common::constants::SRRIP_BITS;

/// Per-set RRPV (re-reference prediction value) counters.
pub struct SrripSets {
    ways: usize,
    rrpv_max: u8,
    rrpvs: Vec<Vec<u8>>,
}

impl SrripSets {
    /// Builds `sets` sets of `ways` ways, all counters initialized to
    /// `rrpv_max` (treated as "distant future", the natural state for an
    /// empty / cold line).
    pub fn new(sets: usize, ways: usize) -> Self {
        let rrpv_max = (1u16 << SRRIP_BITS) as u8 - 1;
        Self {
            ways,
            rrpv_max,
            rrpvs: vec![vec![rrpv_max; ways]; sets],
        }
    }

    /// Finds a way with `RRPV == rrpv_max`; if none exists, ages every way
    /// in the set by incrementing its counter (saturating at `rrpv_max`)
    /// and retries, per spec.md §4.B's aging loop.
    pub fn pick_victim(&mut self, set: usize) -> usize {
        loop {
            let counters = &self.rrpvs[set];
            if let Some(way) = counters.iter().position(|&rrpv| rrpv == self.rrpv_max) {
                return way;
            }
            for rrpv in self.rrpvs[set].iter_mut() {
                *rrpv = (*rrpv + 1).min(self.rrpv_max);
            }
        }
    }

    /// A hit predicts near-future re-reference: RRPV drops to 0.
    pub fn on_access(&mut self, set: usize, way: usize) {
        self.rrpvs[set][way] = 0;
    }

    /// A newly-inserted line is predicted to be re-referenced at an
    /// intermediate distance: RRPV is set to `rrpv_max - 1`, not 0 — this is
    /// what gives SRRIP its scan resistance (a single streaming pass through
    /// a set doesn't evict everything that was already resident).
    pub fn on_insert(&mut self, set: usize, way: usize) {
        self.rrpvs[set][way] = self.rrpv_max.saturating_sub(1);
        debug_assert!(way < self.ways);
    }
}
