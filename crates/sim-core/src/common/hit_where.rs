//! Hit-location classification.
//!
//! `HitWhere` reports the deepest level of the memory hierarchy a request
//! reached (spec.md §3). Ordering is defined so "closer" compares less than
//! "farther"; the maximum across sub-line accesses is the value reported for
//! a multi-segment access (spec.md §4.I step 5).

/// Deepest level of the hierarchy a memory access reached.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HitWhere {
    /// Hit in the private L1 instruction cache.
    L1I,
    /// Hit in the private L1 data cache.
    L1,
    /// Hit in a private/shared L2.
    L2,
    /// Hit in a private/shared L3.
    L3,
    /// Hit in a private/shared L4.
    L4,
    /// Hit forwarded from a sibling's L1 (coherence cache-to-cache transfer).
    L1Sibling,
    /// Hit forwarded from a sibling's L2.
    L2Sibling,
    /// Hit forwarded from a sibling's L3.
    L3Sibling,
    /// Hit forwarded from a sibling's L4.
    L4Sibling,
    /// Served by the node-local DRAM controller.
    DramLocal,
    /// Served by a remote home node's DRAM controller.
    DramRemote,
    /// Served by a remote cache not otherwise classified above.
    CacheRemote,
    /// No level satisfied the request (should not outlive the access that produced it).
    Miss,
    /// The access was predicated off (e.g. conditional SIMD lane); no traffic was generated.
    PredicateFalse,
    /// Not yet classified. Never returned from a completed access with `modeled != None`
    /// (spec.md §8 invariant 7).
    Unknown,
}

impl HitWhere {
    /// Combines two hit locations, keeping the farther (larger) one, matching
    /// the "maximum across sub-line accesses" rule of spec.md §3.
    #[inline]
    pub fn combine(self, other: HitWhere) -> HitWhere {
        self.max(other)
    }
}

impl Default for HitWhere {
    fn default() -> Self {
        HitWhere::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closer_levels_order_before_farther_ones() {
        assert!(HitWhere::L1 < HitWhere::L2);
        assert!(HitWhere::L2 < HitWhere::L3);
        assert!(HitWhere::L3Sibling < HitWhere::DramLocal);
        assert!(HitWhere::DramLocal < HitWhere::Miss);
    }

    #[test]
    fn combine_keeps_the_farther_location() {
        assert_eq!(HitWhere::L1.combine(HitWhere::L2), HitWhere::L2);
        assert_eq!(HitWhere::L3.combine(HitWhere::L1), HitWhere::L3);
    }
}
