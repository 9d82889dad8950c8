//! Global simulation constants.
//!
//! Mirrors the teacher's `common/constants.rs` convention of grouping raw
//! numeric constants in one place rather than scattering magic numbers
//! through the component modules.

/// Sentinel marking "not yet computed" / "unknown, far future" on a [`crate::time::Time`].
pub const TIME_MAX_FEMTOS: u64 = u64::MAX;

/// Default windowed M/G/1 queue window, 1 microsecond expressed in femtoseconds.
pub const DEFAULT_QUEUE_WINDOW_FS: u64 = 1_000_000_000;

/// Default number of static interconnect networks (spec.md §4.G, §9).
pub const NUM_STATIC_NETWORKS: usize = 2;

/// Special receiver id meaning "fan out to every core" on the bus.
pub const BROADCAST: i32 = -1;

/// Default MSHR periodic-sweep purge window: entries older than this (relative
/// to `now`) are dropped even without an explicit completion event.
pub const MSHR_SWEEP_WINDOW_FS: u64 = DEFAULT_QUEUE_WINDOW_FS;

/// Default SRRIP RRPV bit width (spec.md §4.B).
pub const SRRIP_BITS: u32 = 2;
