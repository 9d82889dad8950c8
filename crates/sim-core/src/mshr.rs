//! Miss-status holding registers and directory waiters (spec.md §4.D).
//!
//! No direct teacher precedent exists (the teacher's single-threaded core
//! never has more than one miss in flight at a time); shaped after the
//! small bounded-map-plus-counters structs the teacher uses elsewhere
//! (`stats.rs`'s counter tables) for the admission bookkeeping, and after
//! `soc/memory/controller.rs`'s rolling-state-per-call style for retirement.

use std::collections::{HashMap, VecDeque};

use crate::common::Address;
use crate::time::Time;

/// A single in-flight miss.
#[derive(Clone, Copy, Debug)]
pub struct MshrEntry {
    pub t_issue: Time,
    pub t_complete: Time,
}

/// One thread's place in line for a block currently being fetched.
pub struct DirectoryWaiter {
    pub requester_cntlr: usize,
    pub is_exclusive: bool,
    pub is_prefetch: bool,
    pub issue_time: Time,
}

/// Outcome of admitting a miss to the MSHR.
pub enum Admission {
    /// No existing entry for this block; the caller should issue a new
    /// upstream request and track it with the returned completion estimate.
    NewMiss,
    /// The block already has an in-flight miss that has not yet completed;
    /// the caller piggybacks and should wait until `completion`.
    Overlapped { completion: Time },
    /// The MSHR is full and this is a new, unrelated address; the caller
    /// must wait behind the outstanding-miss queue before reattempting.
    QueueFull,
}

/// Tracks in-flight misses for one cache level plus the FIFO of requests
/// piggybacking on each pending block.
pub struct Mshr {
    max_outstanding: usize,
    entries: HashMap<Address, MshrEntry>,
    waiters: HashMap<Address, VecDeque<DirectoryWaiter>>,
    load_overlapping_misses: u64,
    store_overlapping_misses: u64,
}

impl Mshr {
    /// Creates an MSHR admitting at most `max_outstanding` concurrent misses.
    pub fn new(max_outstanding: usize) -> Self {
        Self {
            max_outstanding,
            entries: HashMap::new(),
            waiters: HashMap::new(),
            load_overlapping_misses: 0,
            store_overlapping_misses: 0,
        }
    }

    /// Attempts to admit a miss on `addr` arriving at `now`, estimating
    /// completion at `estimated_completion` if newly admitted.
    pub fn admit(&mut self, addr: Address, now: Time, estimated_completion: Time, is_store: bool) -> Admission {
        if let Some(entry) = self.entries.get(&addr) {
            if entry.t_complete > now {
                if is_store {
                    self.store_overlapping_misses += 1;
                } else {
                    self.load_overlapping_misses += 1;
                }
                return Admission::Overlapped {
                    completion: now.max(entry.t_complete),
                };
            }
        } else if self.entries.len() >= self.max_outstanding {
            return Admission::QueueFull;
        }

        self.entries.insert(
            addr,
            MshrEntry {
                t_issue: now,
                t_complete: estimated_completion,
            },
        );
        Admission::NewMiss
    }

    /// Enqueues a waiter behind the in-flight miss for `addr` (spec.md §4.D
    /// directory waiter, a FIFO per block address).
    pub fn enqueue_waiter(&mut self, addr: Address, waiter: DirectoryWaiter) {
        self.waiters.entry(addr).or_default().push_back(waiter);
    }

    /// Removes and returns all waiters for `addr` in arrival order, to be
    /// woken by the caller on the first reply.
    pub fn drain_waiters(&mut self, addr: Address) -> VecDeque<DirectoryWaiter> {
        self.waiters.remove(&addr).unwrap_or_default()
    }

    /// Retires the MSHR entry for `addr` on a coherence reply.
    pub fn retire(&mut self, addr: Address) {
        self.entries.remove(&addr);
    }

    /// Purges entries whose completion is at least `window` in the past
    /// relative to `now` (spec.md §4.D periodic sweep).
    pub fn sweep(&mut self, now: Time, window: Time) {
        let cutoff = now.as_fs().saturating_sub(window.as_fs());
        self.entries.retain(|_, e| e.t_complete.as_fs() > cutoff);
    }

    /// Current number of in-flight misses.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the MSHR currently holds no in-flight misses.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn load_overlapping_misses(&self) -> u64 {
        self.load_overlapping_misses
    }

    pub fn store_overlapping_misses(&self) -> u64 {
        self.store_overlapping_misses
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_miss_on_an_address_is_admitted_as_new() {
        let mut m = Mshr::new(4);
        match m.admit(Address::new(0x1000), Time::ZERO, Time::from_ns(100), false) {
            Admission::NewMiss => {}
            _ => panic!("expected NewMiss"),
        }
        assert_eq!(m.len(), 1);
    }

    #[test]
    fn concurrent_miss_on_same_block_overlaps() {
        let mut m = Mshr::new(4);
        m.admit(Address::new(0x1000), Time::ZERO, Time::from_ns(100), false);
        match m.admit(Address::new(0x1000), Time::from_ns(10), Time::from_ns(100), false) {
            Admission::Overlapped { completion } => assert_eq!(completion, Time::from_ns(100)),
            _ => panic!("expected Overlapped"),
        }
        assert_eq!(m.load_overlapping_misses(), 1);
    }

    #[test]
    fn full_mshr_rejects_new_unrelated_address() {
        let mut m = Mshr::new(1);
        m.admit(Address::new(0x1000), Time::ZERO, Time::from_ns(100), false);
        match m.admit(Address::new(0x2000), Time::from_ns(1), Time::from_ns(100), false) {
            Admission::QueueFull => {}
            _ => panic!("expected QueueFull"),
        }
    }

    #[test]
    fn retirement_frees_capacity() {
        let mut m = Mshr::new(1);
        m.admit(Address::new(0x1000), Time::ZERO, Time::from_ns(100), false);
        m.retire(Address::new(0x1000));
        assert!(m.is_empty());
        match m.admit(Address::new(0x2000), Time::from_ns(1), Time::from_ns(100), false) {
            Admission::NewMiss => {}
            _ => panic!("expected NewMiss after retirement"),
        }
    }

    #[test]
    fn sweep_purges_entries_older_than_the_window() {
        let mut m = Mshr::new(4);
        m.admit(Address::new(0x1000), Time::ZERO, Time::from_ns(10), false);
        m.sweep(Time::from_ns(1000), Time::from_ns(100));
        assert!(m.is_empty());
    }

    #[test]
    fn waiters_drain_in_fifo_order() {
        let mut m = Mshr::new(4);
        m.enqueue_waiter(
            Address::new(0x1000),
            DirectoryWaiter {
                requester_cntlr: 0,
                is_exclusive: false,
                is_prefetch: false,
                issue_time: Time::ZERO,
            },
        );
        m.enqueue_waiter(
            Address::new(0x1000),
            DirectoryWaiter {
                requester_cntlr: 1,
                is_exclusive: true,
                is_prefetch: false,
                issue_time: Time::from_ns(1),
            },
        );
        let drained = m.drain_waiters(Address::new(0x1000));
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].requester_cntlr, 0);
        assert_eq!(drained[1].requester_cntlr, 1);
    }
}
