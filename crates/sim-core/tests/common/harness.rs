//! Builds a small `SimulationContext` for the end-to-end scenario tests,
//! the way the teacher's own `TestContext` wires a `Cpu` plus mock bus and
//! memory devices for its unit tests.

use std::sync::Arc;

use sim_core::common::Address;
use sim_core::config::{CacheLevelConfig, PrefetcherConfig, ReplacementPolicyConfig};
use sim_core::host_memory::HostMemory;
use sim_core::{SimConfig, SimulationContext};

/// One level's worth of overridable cache knobs, defaulting to a disabled
/// level so a scenario only needs to name the levels it cares about.
pub fn cache_level(size: usize, associativity: usize, block_size: usize, policy: ReplacementPolicyConfig) -> CacheLevelConfig {
    CacheLevelConfig {
        enabled: true,
        size,
        associativity,
        block_size,
        replacement_policy: policy,
        access_time_ns: 1,
        writeback_time_ns: 1,
        outstanding_misses: 8,
        shared_cores: 1,
        prefetcher: PrefetcherConfig::None,
    }
}

/// A `SimConfig` with tiny L1/L2 levels and no L3, convenient for tests
/// that want a short, predictable miss path down to DRAM.
pub fn small_config() -> SimConfig {
    let mut config = SimConfig::default();
    config.perf_model.l1_icache = cache_level(1024, 2, 64, ReplacementPolicyConfig::Lru);
    config.perf_model.l1_dcache = cache_level(1024, 2, 64, ReplacementPolicyConfig::Lru);
    config.perf_model.l2_cache = cache_level(4096, 4, 64, ReplacementPolicyConfig::Lru);
    config.perf_model.l3_cache.enabled = false;
    config
}

/// Builds a context with `num_cores` sharing `host_memory_bytes` of backing
/// storage, returning the context plus the `HostMemory` handle so a test
/// can seed or inspect raw bytes outside the façade if it needs to.
pub fn context(config: &SimConfig, num_cores: usize, host_memory_bytes: usize) -> (SimulationContext, Arc<HostMemory>) {
    let host_memory = Arc::new(HostMemory::new(host_memory_bytes));
    let ctx = SimulationContext::new(config, num_cores, Some(host_memory.clone()));
    (ctx, host_memory)
}

/// Convenience: a one-core context at `host_memory_bytes`.
pub fn single_core(config: &SimConfig, host_memory_bytes: usize) -> (SimulationContext, Arc<HostMemory>) {
    context(config, 1, host_memory_bytes)
}

pub const MIB: usize = 1024 * 1024;

/// A block address `i` sets away from address 0 within a cache whose
/// `num_sets * block_size` is `stride` — i.e. every `stride`-th address
/// collides into the same set.
pub fn same_set_address(i: u64, stride: u64) -> Address {
    Address::new(i * stride)
}
