//! Tagged prefetcher.
//!
//! Reduces cache pollution by only prefetching on a demand miss, or when a
//! line previously issued by this prefetcher is actually used (a "useful"
//! prefetch), extending the stream one line further.

use super::Prefetcher;

/// Tagged prefetcher state.
pub struct TaggedPrefetcher {
    line_bytes: u64,
    degree: usize,
    prefetched_filter: Vec<u64>,
    filter_mask: usize,
}

impl TaggedPrefetcher {
    /// Creates a tagged prefetcher with `degree` lines of lookahead.
    pub fn new(line_bytes: usize, degree: usize) -> Self {
        let filter_size = 64;
        Self {
            line_bytes: line_bytes as u64,
            degree: if degree == 0 { 1 } else { degree },
            prefetched_filter: vec![0; filter_size],
            filter_mask: filter_size - 1,
        }
    }

    fn was_prefetched(&self, addr: u64) -> bool {
        let idx = ((addr >> 6) as usize) & self.filter_mask;
        self.prefetched_filter[idx] == addr
    }

    fn mark_prefetched(&mut self, addr: u64) {
        let idx = ((addr >> 6) as usize) & self.filter_mask;
        self.prefetched_filter[idx] = addr;
    }
}

impl Prefetcher for TaggedPrefetcher {
    fn observe(&mut self, addr: u64, hit: bool) -> Vec<u64> {
        let mut prefetches = Vec::new();
        let aligned_addr = addr & !(self.line_bytes - 1);

        if !hit || self.was_prefetched(aligned_addr) {
            for k in 1..=self.degree {
                let offset = self.line_bytes * k as u64;
                let target = aligned_addr + offset;
                prefetches.push(target);
                self.mark_prefetched(target);
            }
        }

        prefetches
    }
}
