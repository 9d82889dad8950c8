//! Least-recently-used replacement (spec.md §4.B).
//!
//! Grounded directly on the teacher's `core/units/cache/policies/lru.rs`:
//! one usage stack per set, most-recently-used at the front. The victim is
//! the entry at the back of the stack.

/// Per-set MRU-ordered usage stacks.
pub struct LruSets {
    ways: usize,
    stacks: Vec<Vec<usize>>,
}

impl LruSets {
    /// Builds `sets` independent usage stacks, each seeded with ways
    /// `0..ways` in arbitrary (LRU-first) order so an empty cache evicts
    /// way 0 first.
    pub fn new(sets: usize, ways: usize) -> Self {
        let stack: Vec<usize> = (0..ways).rev().collect();
        Self {
            ways,
            stacks: vec![stack; sets],
        }
    }

    /// Returns the way at the back of `set`'s stack (least-recently-used).
    pub fn pick_victim(&mut self, set: usize) -> usize {
        *self.stacks[set].last().unwrap_or(&0)
    }

    /// Moves `way` to the front (most-recently-used position) of `set`'s stack.
    pub fn on_access(&mut self, set: usize, way: usize) {
        let stack = &mut self.stacks[set];
        stack.retain(|&w| w != way);
        stack.insert(0, way);
        debug_assert!(stack.len() <= self.ways);
    }
}
