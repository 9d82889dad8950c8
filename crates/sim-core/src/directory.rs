//! Coherence directory and DRAM timing (spec.md §4.F).
//!
//! The per-block sharer/owner bookkeeping has no teacher precedent (the
//! teacher's single-core simulator has no coherence directory at all); the
//! DRAM timing half is adapted directly from `soc/memory/controller.rs`'s
//! `SimpleController`/`DramController` row-buffer model, generalized to
//! return a [`crate::time::Time`] instead of a raw cycle count and to run
//! its result through a [`crate::queue::QueueModel`] the way spec.md §4.F
//! describes: `t_access + queue_model.compute_queue_delay(arrival, t_access)`.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use tracing::trace;

use crate::common::Address;
use crate::queue::QueueModel;
use crate::time::{Bandwidth, Time};

/// Stable per-block directory state (spec.md §3 "Directory entry").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DirState {
    Uncached,
    Shared,
    Exclusive,
    Modified,
}

/// Per-block directory bookkeeping: who holds the block and how.
#[derive(Clone, Debug, Default)]
struct DirEntry {
    state: Option<DirState>,
    sharers: HashSet<usize>,
    owner: Option<usize>,
}

impl DirEntry {
    fn state(&self) -> DirState {
        self.state.unwrap_or(DirState::Uncached)
    }
}

/// DRAM access timing: fixed-latency or row-buffer-aware.
pub trait DramTiming: Send + Sync {
    /// Returns the access latency for `addr`, independent of queueing delay.
    fn access_latency(&mut self, addr: Address) -> Time;
}

/// Fixed-latency DRAM timing; every access costs the same.
pub struct SimpleDramTiming {
    latency: Time,
}

impl SimpleDramTiming {
    pub fn new(latency: Time) -> Self {
        Self { latency }
    }
}

impl DramTiming for SimpleDramTiming {
    fn access_latency(&mut self, _addr: Address) -> Time {
        self.latency
    }
}

/// Row-buffer-aware DRAM timing (CAS / RAS / precharge), adapted from the
/// teacher's `DramController`.
pub struct RowBufferDramTiming {
    last_row: Option<u64>,
    t_cas: Time,
    t_ras: Time,
    t_pre: Time,
    row_mask: u64,
}

impl RowBufferDramTiming {
    /// `row_bytes` must be a power of two; it defines the row-buffer granularity.
    pub fn new(t_cas: Time, t_ras: Time, t_pre: Time, row_bytes: u64) -> Self {
        assert!(row_bytes.is_power_of_two());
        Self {
            last_row: None,
            t_cas,
            t_ras,
            t_pre,
            row_mask: !(row_bytes - 1),
        }
    }
}

impl DramTiming for RowBufferDramTiming {
    fn access_latency(&mut self, addr: Address) -> Time {
        let row = addr.val() & self.row_mask;
        match self.last_row {
            Some(open_row) if open_row == row => self.t_cas,
            Some(_) => {
                self.last_row = Some(row);
                self.t_pre.saturating_add(self.t_ras).saturating_add(self.t_cas)
            }
            None => {
                self.last_row = Some(row);
                self.t_ras.saturating_add(self.t_cas)
            }
        }
    }
}

/// Running counters for one DRAM controller (spec.md §4.F).
#[derive(Default, Clone, Copy, Debug)]
pub struct DramCounters {
    pub num_accesses: u64,
    pub total_access_latency: u64,
    pub total_queueing_delay: u64,
}

/// The home-node coherence directory plus its attached DRAM controller.
///
/// One `Directory` instance is shared by every cache controller whose
/// `home(addr)` maps to it; the block-level `Mutex` gives the same
/// per-block serialization spec.md §5 describes for the per-set lock, one
/// level further down the hierarchy.
pub struct Directory {
    block_size: u64,
    bandwidth: Bandwidth,
    entries: Mutex<HashMap<Address, DirEntry>>,
    timing: Mutex<Box<dyn DramTiming>>,
    queue_model: Mutex<Box<dyn QueueModel>>,
    counters: Mutex<DramCounters>,
}

impl Directory {
    pub fn new(
        block_size: u64,
        bandwidth: Bandwidth,
        timing: Box<dyn DramTiming>,
        queue_model: Box<dyn QueueModel>,
    ) -> Self {
        Self {
            block_size,
            bandwidth,
            entries: Mutex::new(HashMap::new()),
            timing: Mutex::new(timing),
            queue_model: Mutex::new(queue_model),
            counters: Mutex::new(DramCounters::default()),
        }
    }

    /// Computes the total DRAM service time for one block-sized transfer,
    /// including queueing delay, and updates the running counters.
    fn dram_access(&self, addr: Address, now: Time) -> Time {
        let t_access = self.timing.lock().unwrap().access_latency(addr);
        let transfer = self.bandwidth.latency(self.block_size * 8);
        let service_time = t_access.saturating_add(transfer);
        let queue_delay = self.queue_model.lock().unwrap().compute_queue_delay(now, service_time);

        let mut counters = self.counters.lock().unwrap();
        counters.num_accesses += 1;
        counters.total_access_latency += service_time.as_fs();
        counters.total_queueing_delay += queue_delay.as_fs();

        service_time.saturating_add(queue_delay)
    }

    /// Handles a `GET_SH` request arriving at `now` from `requester`. Returns
    /// `(data_ready_at, needs_writeback_from)`: if the block was `Exclusive`
    /// or `Modified`, the caller must first collect a write-back from the
    /// returned owner before the reply is final (spec.md §4.F).
    pub fn handle_get_shared(&self, addr: Address, requester: usize, now: Time) -> (Time, Option<usize>) {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries.entry(addr).or_default();

        match entry.state() {
            DirState::Uncached => {
                let ready = self.dram_access(addr, now);
                entry.state = Some(DirState::Shared);
                entry.sharers.insert(requester);
                (ready, None)
            }
            DirState::Shared => {
                entry.sharers.insert(requester);
                (now, None)
            }
            DirState::Exclusive | DirState::Modified => {
                let owner = entry.owner;
                entry.state = Some(DirState::Shared);
                entry.sharers.insert(requester);
                if let Some(o) = owner {
                    entry.sharers.insert(o);
                }
                entry.owner = None;
                trace!(addr = addr.val(), requester, owner = ?owner, "downgrading prior owner to shared");
                (now, owner)
            }
        }
    }

    /// Handles a `GET_EX` request. Returns `(data_ready_at, invalidate_set)`:
    /// every id in `invalidate_set` must be sent an `INV_REQ` before the
    /// exclusive grant is final.
    pub fn handle_get_exclusive(&self, addr: Address, requester: usize, now: Time) -> (Time, Vec<usize>) {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries.entry(addr).or_default();

        let ready = match entry.state() {
            DirState::Uncached => self.dram_access(addr, now),
            _ => now,
        };

        let mut to_invalidate: Vec<usize> = entry.sharers.iter().copied().filter(|&c| c != requester).collect();
        if let Some(owner) = entry.owner {
            if owner != requester && !to_invalidate.contains(&owner) {
                to_invalidate.push(owner);
            }
        }

        entry.state = Some(DirState::Modified);
        entry.sharers.clear();
        entry.owner = Some(requester);

        if !to_invalidate.is_empty() {
            trace!(addr = addr.val(), requester, invalidating = ?to_invalidate, "granting exclusive, invalidating sharers");
        }
        (ready, to_invalidate)
    }

    /// Snapshot of this directory's DRAM counters.
    pub fn counters(&self) -> DramCounters {
        *self.counters.lock().unwrap()
    }
}

/// Stripes addresses across `n_homes` directories by block number.
pub fn home(addr: Address, block_size: u64, n_homes: usize) -> usize {
    let block_num = addr.val() / block_size;
    (block_num as usize) % n_homes.max(1)
}
