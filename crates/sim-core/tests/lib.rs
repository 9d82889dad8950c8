//! End-to-end scenarios driven entirely through `SimulationContext` and
//! `CoreFacade`, one per walkthrough in the design document's worked-example
//! section. Finer invariants, round-trip laws, and boundary behaviors are
//! already covered per module by `#[cfg(test)]` units; this suite only
//! checks the full stack wires those pieces together correctly.

mod common;

use std::sync::{Arc, Mutex};

use sim_core::cache::policies::ReplacementPolicy;
use sim_core::cache::Cache;
use sim_core::common::{Address, HitWhere, MemOpKind, Modeled};
use sim_core::config::{QueueModelKind, ReplacementPolicyConfig};
use sim_core::controller::messages::{DownstreamReply, UpstreamRequest};
use sim_core::controller::{CacheController, ControllerTiming};
use sim_core::core_facade::{CoreFacade, LockSignal};
use sim_core::fault_injector::FaultInjector;
use sim_core::host_memory::HostMemory;
use sim_core::perf_model::PerformanceModel;
use sim_core::syscall::{FutexTable, WaitOutcome};
use sim_core::time::Time;

use common::harness::{cache_level, context, same_set_address, small_config, MIB};

/// Scenario 1: one core writes a value, another core reads it back. The
/// directory path never carries real bytes (it only tracks coherence state
/// and sharers); correctness of the value flows entirely through the shared
/// `HostMemory`, so this asserts the byte content and that the consumer's
/// access actually left its L1 (a cold line can't be a local hit).
#[test]
fn two_core_producer_consumer_round_trips_through_host_memory() {
    let config = small_config();
    let (ctx, _host) = context(&config, 2, 4 * MIB);

    let producer = ctx.core(0);
    let consumer = ctx.core(1);
    let addr = Address::new(0x1000);

    let mut store_buf = [0xABu8; 8];
    producer
        .access_memory(LockSignal::None, MemOpKind::Store, addr, Some(&mut store_buf), 0, Some(Time::ZERO), Modeled::None)
        .unwrap();

    let mut load_buf = [0u8; 8];
    let outcome = consumer
        .access_memory(LockSignal::None, MemOpKind::Load, addr, Some(&mut load_buf), 0, Some(Time::from_ns(10)), Modeled::None)
        .unwrap();

    assert_eq!(load_buf, [0xAB; 8]);
    assert!(outcome.hit_where > HitWhere::L1, "a consumer's first touch of a line it never held can't be a private L1 hit");
}

/// Two cores racing to write the same line must never both end up holding
/// it `Modified` at once. Core 0 stores first (granted Modified, sole
/// owner); core 1 then stores the same address, which the directory can
/// only grant by invalidating core 0's copy. Proven without peeking at
/// internal coherence state: a subsequent access from core 0 must miss its
/// own L1 and refetch, since a still-`Modified` line would instead be
/// reported as a local hit.
#[test]
fn a_second_cores_store_invalidates_the_first_cores_modified_line() {
    let config = small_config();
    let (ctx, _host) = context(&config, 2, 4 * MIB);

    let core0 = ctx.core(0);
    let core1 = ctx.core(1);
    let addr = Address::new(0x4000);

    let mut buf = [0xAAu8; 4];
    let first = core0
        .access_memory(LockSignal::None, MemOpKind::Store, addr, Some(&mut buf), 0, Some(Time::ZERO), Modeled::None)
        .unwrap();
    assert!(first.hit_where > HitWhere::L1, "core 0's first touch of this line can't be a local hit");

    let mut buf = [0xBBu8; 4];
    core1
        .access_memory(LockSignal::None, MemOpKind::Store, addr, Some(&mut buf), 0, Some(Time::from_ns(10)), Modeled::None)
        .unwrap();

    let mut buf = [0u8; 4];
    let after = core0
        .access_memory(LockSignal::None, MemOpKind::Peek, addr, Some(&mut buf), 0, Some(Time::from_ns(20)), Modeled::None)
        .unwrap();
    assert!(
        after.hit_where > HitWhere::L1,
        "core 0's line must have been invalidated by core 1's store, not left dangling at Modified"
    );
}

/// Scenario 2: an 8-way/32KiB/64B L1 is filled with 64 addresses that all
/// stripe into the same set (`stride = num_sets * block_size`). Only the 8
/// most recently touched can survive an LRU set. Checked in descending
/// address order with `Peek` (which never perturbs replacement metadata),
/// so verifying the resident addresses doesn't itself evict them before
/// they're checked.
#[test]
fn capacity_eviction_keeps_only_the_most_recently_touched_ways() {
    let mut config = small_config();
    config.perf_model.l1_dcache = cache_level(32 * 1024, 8, 64, ReplacementPolicyConfig::Lru);
    let (ctx, _host) = context(&config, 1, 4 * MIB);
    let core = ctx.core(0);

    let num_sets = 32 * 1024 / 64 / 8;
    let stride = (num_sets * 64) as u64;

    for i in 0..64u64 {
        let addr = same_set_address(i, stride);
        let mut buf = [0u8; 1];
        core.access_memory(LockSignal::None, MemOpKind::Load, addr, Some(&mut buf), 0, Some(Time::from_ns(i)), Modeled::None)
            .unwrap();
    }

    for i in (56..64u64).rev() {
        let addr = same_set_address(i, stride);
        let mut buf = [0u8; 1];
        let outcome = core
            .access_memory(LockSignal::None, MemOpKind::Peek, addr, Some(&mut buf), 0, Some(Time::from_ns(1000)), Modeled::None)
            .unwrap();
        assert_eq!(outcome.hit_where, HitWhere::L1, "address {i} should still be resident in the 8-way set");
    }

    let mut buf = [0u8; 1];
    let outcome = core
        .access_memory(LockSignal::None, MemOpKind::Peek, same_set_address(0, stride), Some(&mut buf), 0, Some(Time::from_ns(1000)), Modeled::None)
        .unwrap();
    assert!(outcome.hit_where > HitWhere::L1, "the first address touched should have been evicted long before the set filled with later arrivals");
}

/// Scenario 3: a line touched twice (so it ages to RRPV 0, the "hot" end)
/// survives a long scan of single-use addresses through the same set, which
/// only ever touch the "distant" end of the RRPV range. This only holds
/// because a demand fill registers as an insert, not a hit — see
/// `Cache::fill_single_line`.
#[test]
fn srrip_protects_a_hot_line_through_a_one_time_scan() {
    let mut config = small_config();
    config.perf_model.l1_dcache = cache_level(256, 4, 64, ReplacementPolicyConfig::Srrip);
    let (ctx, _host) = context(&config, 1, 4 * MIB);
    let core = ctx.core(0);

    let hot = Address::new(0x9000);
    let mut buf = [0u8; 1];
    core.access_memory(LockSignal::None, MemOpKind::Load, hot, Some(&mut buf), 0, Some(Time::from_ns(0)), Modeled::None)
        .unwrap();
    core.access_memory(LockSignal::None, MemOpKind::Load, hot, Some(&mut buf), 0, Some(Time::from_ns(1)), Modeled::None)
        .unwrap();

    for i in 0..40u64 {
        let scan_addr = Address::new(0x1_0000 + i * 64);
        core.access_memory(LockSignal::None, MemOpKind::Load, scan_addr, Some(&mut buf), 0, Some(Time::from_ns(2 + i)), Modeled::None)
            .unwrap();
    }

    let outcome = core
        .access_memory(LockSignal::None, MemOpKind::Peek, hot, Some(&mut buf), 0, Some(Time::from_ns(1000)), Modeled::None)
        .unwrap();
    assert_eq!(outcome.hit_where, HitWhere::L1, "a twice-touched line must survive a scan of addresses each used only once");
}

/// Scenario 4: the fault-injection overlay flips every bit of a range when
/// its read BER is 1.0, and leaves bytes untouched outside any declared
/// range or at BER 0.0. Built the same way `core_facade.rs`'s own unit
/// tests assemble a standalone façade, since `SimulationContext` only wires
/// a fault injector up when `fault_injection.type != None`.
#[test]
fn bit_flip_overlay_corrupts_only_the_approximate_range() {
    let timing = ControllerTiming {
        tag_lookup: Time::from_ns(1),
        data_access: Time::from_ns(1),
        interconnect: Time::from_ns(5),
    };
    let make_controller = || {
        Arc::new(CacheController::new(
            HitWhere::L1,
            Cache::new("L1D", 64, 4, 2, ReplacementPolicy::lru(4, 2)),
            4,
            timing,
            None,
        ))
    };
    let resolver = || -> sim_core::controller::BoxedResolver {
        Box::new(|_req: UpstreamRequest, _now: Time| {
            (
                DownstreamReply::ShRep { addr: Address::new(0), data: vec![0u8; 64] },
                Time::from_ns(50),
                HitWhere::DramLocal,
                vec![],
            )
        })
    };

    let fault_injector = Arc::new(FaultInjector::new(42));
    fault_injector.add_range(0x2000, 0x2100);
    fault_injector.set_read_ber(1.0);

    let facade = CoreFacade::new(
        0,
        make_controller(),
        make_controller(),
        resolver(),
        resolver(),
        Arc::new(Mutex::new(PerformanceModel::new(None))),
        Some(Arc::new(HostMemory::new(1 << 20))),
        Some(fault_injector.clone()),
        64,
        8,
    );

    let mut buf = [0u8; 4];
    facade
        .access_memory(LockSignal::None, MemOpKind::Load, Address::new(0x2010), Some(&mut buf), 0, Some(Time::ZERO), Modeled::None)
        .unwrap();
    assert_eq!(buf, [0xFF, 0xFF, 0xFF, 0xFF]);
    assert_eq!(fault_injector.counters().faulty_read, 1);

    let mut untouched = [0u8; 4];
    facade
        .access_memory(LockSignal::None, MemOpKind::Load, Address::new(0x5000), Some(&mut untouched), 0, Some(Time::from_ns(10)), Modeled::None)
        .unwrap();
    assert_eq!(untouched, [0, 0, 0, 0], "bytes outside any declared approximate range must never be flipped");
}

/// Scenario 5: two threads ping-pong over one futex word — the second
/// thread's `FUTEX_WAIT` blocks until the first thread's `FUTEX_WAKE`
/// resumes it, no earlier than `now + reschedule_cost`, and a third waiter
/// left behind times out on the periodic sweep instead of hanging forever.
#[test]
fn futex_ping_pong_wakes_one_waiter_and_times_out_another() {
    let mut table = FutexTable::new(Time::from_ns(20));

    let outcome = table.wait(0x4000, 0, 0, u32::MAX, None, 1);
    assert_eq!(outcome, WaitOutcome::Stalled);

    let late = table.wait(0x4000, 0, 0, u32::MAX, Some(Time::from_ns(500)), 2);
    assert_eq!(late, WaitOutcome::Stalled);

    let woken = table.wake(0x4000, 1, u32::MAX, Time::from_ns(100));
    assert_eq!(woken, vec![(1, Time::from_ns(120))]);
    assert_eq!(table.wake_count(), 1);

    let timed_out = table.sweep_timeouts(Time::from_ns(600));
    assert_eq!(timed_out, vec![2]);
    assert_eq!(table.timeout_count(), 1);
}

/// Scenario 6: two cores racing on the shared-memory network at the same
/// instant serialize rather than overlap — the exact 8/16-cycle figures for
/// one isolated bus are already pinned down at the unit level in
/// `interconnect.rs`; this only checks the contention is visible end to end
/// through `SimulationContext`'s public counters when two cores genuinely
/// miss at once.
#[test]
fn concurrent_misses_from_two_cores_contend_on_the_shared_bus() {
    use pretty_assertions::assert_ne;

    let mut config = small_config();
    config.network.bus.queue_model.r#type = QueueModelKind::Contention;
    let (ctx, _host) = context(&config, 2, 4 * MIB);

    let core0 = ctx.core(0);
    let core1 = ctx.core(1);

    let mut buf = [0u8; 8];
    core0
        .access_memory(LockSignal::None, MemOpKind::Load, Address::new(0x100), Some(&mut buf), 0, Some(Time::ZERO), Modeled::None)
        .unwrap();
    core1
        .access_memory(LockSignal::None, MemOpKind::Load, Address::new(0x9000), Some(&mut buf), 0, Some(Time::ZERO), Modeled::None)
        .unwrap();

    // A struct comparison here, rather than two separate field checks, is
    // worth the diff output: if contention modeling regresses to "never
    // delays" both fields go to zero together, and a mismatch should show
    // both at once rather than pointing at only the first failing field.
    let counters = ctx.bus_counters();
    assert_ne!(counters, sim_core::interconnect::BusCounters::default(), "two same-instant misses must contend for the shared-memory network");
}
