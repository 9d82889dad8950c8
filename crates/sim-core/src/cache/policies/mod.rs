//! Cache replacement policies (spec.md §4.B).
//!
//! The teacher's `core/units/cache/policies` models replacement algorithms
//! as a `ReplacementPolicy` trait plus `Box<dyn ReplacementPolicy + Send +
//! Sync>` implementors (`LruPolicy`, `FifoPolicy`, …) — runtime polymorphism
//! through a vtable. Design note §9 of this spec calls that inheritance
//! hierarchy out explicitly and asks for a tagged variant with a small
//! dispatch table instead, "no vtables needed" — so here the same two
//! operations (`pick_victim`, `on_access`) are methods on an enum that
//! matches over its own per-set state, grounded algorithmically on the
//! teacher's `LruPolicy` (usage stack) and `RandomPolicy` (LFSR) but
//! without the `Box<dyn _>` indirection.

/// Least-recently-used per-set usage stacks.
pub mod lru;

/// Static re-reference interval prediction (SRRIP) per-set RRPV counters.
pub mod srrip;

/// Pseudo-random victim selection via an LFSR (no per-set state needed).
pub mod random;

use lru::LruSets;
use random::RandomSets;
use srrip::SrripSets;

/// Tagged replacement-policy state, one instance per cache (spec.md §9
/// design note: "tagged variant on the set's replacement metadata").
pub enum ReplacementPolicy {
    /// Least-recently-used stack per set.
    Lru(LruSets),
    /// Static re-reference interval prediction, RRPV counters per set.
    Srrip(SrripSets),
    /// Uniform random victim selection.
    Random(RandomSets),
}

impl ReplacementPolicy {
    /// Constructs LRU replacement state for `sets` sets of `ways` ways each.
    pub fn lru(sets: usize, ways: usize) -> Self {
        ReplacementPolicy::Lru(LruSets::new(sets, ways))
    }

    /// Constructs SRRIP replacement state with the default RRPV bit width
    /// (spec.md §4.B: `n = 2`, insertion RRPV = `RRPV_max - 1`).
    pub fn srrip(sets: usize, ways: usize) -> Self {
        ReplacementPolicy::Srrip(SrripSets::new(sets, ways))
    }

    /// Constructs uniform-random replacement state.
    pub fn random(ways: usize) -> Self {
        ReplacementPolicy::Random(RandomSets::new(ways))
    }

    /// Selects the way to evict from `set` (spec.md §4.B `pick_victim`).
    pub fn pick_victim(&mut self, set: usize) -> usize {
        match self {
            ReplacementPolicy::Lru(s) => s.pick_victim(set),
            ReplacementPolicy::Srrip(s) => s.pick_victim(set),
            ReplacementPolicy::Random(s) => s.pick_victim(),
        }
    }

    /// Updates replacement metadata after an access to `way` within `set`
    /// (spec.md §4.B `on_access`). Not called for `MemOpKind::Peek` accesses.
    pub fn on_access(&mut self, set: usize, way: usize) {
        match self {
            ReplacementPolicy::Lru(s) => s.on_access(set, way),
            ReplacementPolicy::Srrip(s) => s.on_access(set, way),
            ReplacementPolicy::Random(_) => {}
        }
    }

    /// Called when a line is installed into a previously-invalid `way`
    /// (distinct from `on_access` because SRRIP uses a different insertion
    /// RRPV than its hit-promotion RRPV).
    pub fn on_insert(&mut self, set: usize, way: usize) {
        match self {
            ReplacementPolicy::Lru(s) => s.on_access(set, way),
            ReplacementPolicy::Srrip(s) => s.on_insert(set, way),
            ReplacementPolicy::Random(_) => {}
        }
    }
}
