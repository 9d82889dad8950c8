//! Memory fault-injection overlay for approximate computing research
//! (spec.md §4.J).
//!
//! No teacher precedent exists for this (the teacher models only precise
//! RISC-V semantics); shaped like the rest of this crate's small
//! `Mutex`-guarded-state-plus-counters components. Design note §9
//! consolidates the several fault-injector variants the original system
//! carries ("random", "range", "range+stats") into one `FaultInjector`
//! whose uniform-random case is simply a single open `[0, u64::MAX)` range.

use std::sync::Mutex;

use tracing::debug;

/// A half-open `[start, end)` byte range, ordered by `end` so overlap
/// merging during insertion is a linear scan from the first range whose
/// end is `>= start`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct FaultRange {
    start: u64,
    end: u64,
}

impl FaultRange {
    fn overlaps_or_touches(&self, other: &FaultRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

/// xorshift64 PRNG, seeded once at construction (spec.md §4.J).
struct Rng {
    state: u64,
}

impl Rng {
    fn new(seed: u64) -> Self {
        Self { state: seed | 1 }
    }

    /// Draws a uniform value in `[0, 1)`.
    fn next_unit(&mut self) -> f64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        (x >> 11) as f64 / (1u64 << 53) as f64
    }
}

/// Running counters for one fault injector (spec.md §4.J, exported "keyed
/// by component string and core id" by the caller).
#[derive(Default, Clone, Copy, Debug)]
pub struct FaultCounters {
    pub total_read: u64,
    pub faulty_read: u64,
    pub total_write: u64,
    pub faulty_write: u64,
}

struct Inner {
    ranges: Vec<FaultRange>,
    read_ber: f64,
    write_ber: f64,
    rng: Rng,
    counters: FaultCounters,
}

/// A bit-flip overlay attached per `(core, mem_component)`, consolidating
/// the source's range/random/stats fault-injector variants into one.
pub struct FaultInjector {
    inner: Mutex<Inner>,
}

impl FaultInjector {
    /// Creates a disabled-by-default injector (`read_ber = write_ber = 0`,
    /// no ranges) seeded once with `seed`.
    pub fn new(seed: u64) -> Self {
        Self {
            inner: Mutex::new(Inner {
                ranges: Vec::new(),
                read_ber: 0.0,
                write_ber: 0.0,
                rng: Rng::new(seed),
                counters: FaultCounters::default(),
            }),
        }
    }

    /// Sets the per-bit error rate applied to reads within an approx range.
    pub fn set_read_ber(&self, ber: f64) {
        self.inner.lock().unwrap().read_ber = ber.clamp(0.0, 1.0);
    }

    /// Sets the per-bit error rate applied to writes within an approx range.
    pub fn set_write_ber(&self, ber: f64) {
        self.inner.lock().unwrap().write_ber = ber.clamp(0.0, 1.0);
    }

    /// Adds `[start, end)` to the approximate range set, merging overlaps.
    pub fn add_range(&self, start: u64, end: u64) {
        let mut inner = self.inner.lock().unwrap();
        let mut merged = FaultRange { start, end };
        inner.ranges.retain(|r| {
            if merged.overlaps_or_touches(r) {
                merged.start = merged.start.min(r.start);
                merged.end = merged.end.max(r.end);
                false
            } else {
                true
            }
        });
        inner.ranges.push(merged);
        inner.ranges.sort_by_key(|r| r.end);
    }

    /// Removes `[start, end)` from the approximate range set, splitting any
    /// range it partially covers.
    pub fn remove_range(&self, start: u64, end: u64) {
        let mut inner = self.inner.lock().unwrap();
        let mut result = Vec::new();
        for r in inner.ranges.drain(..) {
            if end <= r.start || start >= r.end {
                result.push(r);
                continue;
            }
            if r.start < start {
                result.push(FaultRange { start: r.start, end: start });
            }
            if end < r.end {
                result.push(FaultRange { start: end, end: r.end });
            }
        }
        result.sort_by_key(|r| r.end);
        inner.ranges = result;
    }

    /// Whether any byte of `[addr, addr+len)` is covered by an approx range.
    pub fn in_range(&self, addr: u64, len: u64) -> bool {
        let inner = self.inner.lock().unwrap();
        let end = addr.saturating_add(len);
        inner.ranges.iter().any(|r| r.start < end && addr < r.end)
    }

    /// Computes the XOR-composable fault mask for a read of `size` bytes at
    /// `addr`, and updates read counters. Returns an all-zero mask (no-op)
    /// when out of range or `read_ber == 0`.
    pub fn pre_read(&self, addr: u64, size: usize) -> Vec<u8> {
        let mut inner = self.inner.lock().unwrap();
        inner.counters.total_read += 1;
        if inner.read_ber <= 0.0 || !FaultInjector::range_contains(&inner.ranges, addr, size as u64) {
            return vec![0u8; size];
        }
        let ber = inner.read_ber;
        let mask = Self::flip_mask(&mut inner.rng, size, ber);
        if mask.iter().any(|&b| b != 0) {
            inner.counters.faulty_read += 1;
            debug!(addr, size, ber, "injected read fault");
        }
        mask
    }

    /// Computes the XOR-composable fault mask for a write of `size` bytes
    /// at `addr`, and updates write counters.
    pub fn post_write(&self, addr: u64, size: usize) -> Vec<u8> {
        let mut inner = self.inner.lock().unwrap();
        inner.counters.total_write += 1;
        if inner.write_ber <= 0.0 || !FaultInjector::range_contains(&inner.ranges, addr, size as u64) {
            return vec![0u8; size];
        }
        let ber = inner.write_ber;
        let mask = Self::flip_mask(&mut inner.rng, size, ber);
        if mask.iter().any(|&b| b != 0) {
            inner.counters.faulty_write += 1;
            debug!(addr, size, ber, "injected write fault");
        }
        mask
    }

    fn range_contains(ranges: &[FaultRange], addr: u64, len: u64) -> bool {
        let end = addr.saturating_add(len);
        ranges.iter().any(|r| r.start < end && addr < r.end)
    }

    fn flip_mask(rng: &mut Rng, size: usize, ber: f64) -> Vec<u8> {
        let mut mask = vec![0u8; size];
        for byte in mask.iter_mut() {
            for bit in 0..8 {
                if rng.next_unit() < ber {
                    *byte ^= 1 << bit;
                }
            }
        }
        mask
    }

    /// Snapshot of this injector's counters.
    pub fn counters(&self) -> FaultCounters {
        self.inner.lock().unwrap().counters
    }
}
