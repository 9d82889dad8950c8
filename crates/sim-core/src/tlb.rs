//! Translation lookaside buffer (spec.md §4.C).
//!
//! The teacher's `core/units/mmu/tlb.rs` is a direct-mapped, hand-rolled
//! VPN→PPN table built for a single RISC-V core's SV39 page walker. This
//! simulator performs no address translation of its own (the front-end
//! already supplies physical addresses) and the spec instead describes the
//! TLB as a plain occupancy cache keyed by page number — "Internal `Cache`
//! of tag granularity `P`, any replacement policy" — so this is built
//! directly on [`crate::cache::Cache`] rather than reimplementing a second
//! direct-mapped table.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::cache::Cache;
use crate::cache::policies::ReplacementPolicy;
use crate::common::{Address, MemOpKind, MsiState};

/// Page-granular occupancy tracker used to account for (but not actually
/// perform) address translation overhead.
pub struct Tlb {
    page_size: usize,
    pages: Cache,
    accesses: AtomicU64,
    misses: AtomicU64,
}

impl Tlb {
    /// Builds a TLB of `num_sets * associativity` entries, each covering one
    /// `page_size`-byte page.
    pub fn new(page_size: usize, num_sets: usize, associativity: usize, policy: ReplacementPolicy) -> Self {
        Self {
            page_size,
            pages: Cache::new("tlb", page_size, num_sets, associativity, policy),
            accesses: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Looks up the page containing `vpn`. Always counts the access; on
    /// miss, unconditionally installs the page (no page-walk latency is
    /// modeled) and counts the miss. Returns whether the lookup hit.
    pub fn lookup(&self, vpn: Address) -> bool {
        self.accesses.fetch_add(1, Ordering::Relaxed);
        if self.pages.access_single_line(vpn, MemOpKind::Load, None).is_some() {
            return true;
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let fill = vec![0u8; self.page_size];
        self.pages.insert_single_line(vpn, &fill, MsiState::Shared, |_| {});
        false
    }

    /// Total lookups performed since construction.
    pub fn accesses(&self) -> u64 {
        self.accesses.load(Ordering::Relaxed)
    }

    /// Total misses since construction.
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_tlb() -> Tlb {
        Tlb::new(4096, 4, 2, ReplacementPolicy::lru(4, 2))
    }

    #[test]
    fn first_lookup_of_a_page_is_a_miss() {
        let tlb = small_tlb();
        assert!(!tlb.lookup(Address::new(0x4000)));
        assert_eq!(tlb.accesses(), 1);
        assert_eq!(tlb.misses(), 1);
    }

    #[test]
    fn repeat_lookup_hits() {
        let tlb = small_tlb();
        tlb.lookup(Address::new(0x4000));
        assert!(tlb.lookup(Address::new(0x4000)));
        assert_eq!(tlb.accesses(), 2);
        assert_eq!(tlb.misses(), 1);
    }

    #[test]
    fn same_page_different_offset_still_hits() {
        let tlb = small_tlb();
        tlb.lookup(Address::new(0x4000));
        assert!(tlb.lookup(Address::new(0x4FF0)));
    }
}
