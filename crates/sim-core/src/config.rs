//! Configuration surface for the simulator (spec.md §6).
//!
//! Grounded on the teacher's `config.rs`: a `defaults` module of baseline
//! constants, `#[serde(default = "...")]` per-field fallbacks, and a root
//! struct mirroring the configuration's section nesting one-to-one.

use serde::Deserialize;

/// Default configuration constants.
mod defaults {
    pub const L1_SIZE_BYTES: usize = 32 * 1024;
    pub const L1_ASSOCIATIVITY: usize = 8;
    pub const L2_SIZE_BYTES: usize = 256 * 1024;
    pub const L2_ASSOCIATIVITY: usize = 8;
    pub const L3_SIZE_BYTES: usize = 8 * 1024 * 1024;
    pub const L3_ASSOCIATIVITY: usize = 16;
    pub const BLOCK_SIZE: usize = 64;
    pub const ACCESS_TIME_NS: u64 = 1;
    pub const WRITEBACK_TIME_NS: u64 = 1;
    pub const OUTSTANDING_MISSES: usize = 8;
    pub const SHARED_CORES: usize = 1;

    pub const BUS_BANDWIDTH_BITS_PER_CYCLE: u64 = 64;
    pub const BUS_CYCLE_PERIOD_FS: u64 = 1_000_000;

    pub const WINDOWED_MG1_WINDOW_SIZE: usize = 64;

    pub const DRAM_LATENCY_NS: u64 = 100;
    pub const DRAM_PER_CONTROLLER_BANDWIDTH_BITS_PER_CYCLE: u64 = 64;

    pub const SYNC_RESCHEDULE_COST_NS: u64 = 50;

    pub const PERIODIC_GRANULARITY: u64 = 1000;

    pub const TLB_PAGE_SIZE: usize = 4096;
    pub const TLB_NUM_SETS: usize = 32;
    pub const TLB_ASSOCIATIVITY: usize = 4;
    pub const TLB_MISS_LATENCY_NS: u64 = 10;
}

/// Coherence protocol selection (spec.md §4.C names only one: MSI).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CachingProtocol {
    #[default]
    Msi,
}

/// Cache replacement policy (spec.md §4.B).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReplacementPolicyConfig {
    #[default]
    Lru,
    Srrip,
    Random,
}

/// Hardware prefetcher selection (spec.md §4.F).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum PrefetcherConfig {
    #[default]
    None,
    NextLine,
    Stride,
    Stream,
    Tagged,
}

/// Queue-model selection for a bus or memory controller (spec.md §4.A).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueModelKind {
    #[default]
    WindowedMg1,
    Contention,
}

/// Fault-injection mode (spec.md §6 magic/marker interface).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultInjectionType {
    #[default]
    None,
    Random,
    Range,
}

/// Trace syntax accepted by the front-end (spec.md §6 `general/syntax`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceSyntax {
    #[default]
    Binary,
    Text,
}

/// Root configuration structure (spec.md §6 configuration surface).
#[derive(Debug, Clone, Deserialize)]
pub struct SimConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub caching_protocol: CachingProtocolConfig,
    #[serde(default)]
    pub perf_model: PerfModelConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub queue_model: QueueModelConfig,
    #[serde(default)]
    pub fault_injection: FaultInjectionConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            caching_protocol: CachingProtocolConfig::default(),
            perf_model: PerfModelConfig::default(),
            network: NetworkConfig::default(),
            queue_model: QueueModelConfig::default(),
            fault_injection: FaultInjectionConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneralConfig {
    #[serde(default)]
    pub syntax: TraceSyntax,
    #[serde(default = "GeneralConfig::default_periodic_granularity")]
    pub periodic_granularity: u64,
}

impl GeneralConfig {
    fn default_periodic_granularity() -> u64 {
        defaults::PERIODIC_GRANULARITY
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            syntax: TraceSyntax::default(),
            periodic_granularity: defaults::PERIODIC_GRANULARITY,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CachingProtocolConfig {
    #[serde(default)]
    pub r#type: CachingProtocol,
}

impl Default for CachingProtocolConfig {
    fn default() -> Self {
        Self { r#type: CachingProtocol::default() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PerfModelConfig {
    #[serde(default = "PerfModelConfig::default_l1i")]
    pub l1_icache: CacheLevelConfig,
    #[serde(default = "PerfModelConfig::default_l1d")]
    pub l1_dcache: CacheLevelConfig,
    #[serde(default = "PerfModelConfig::default_l2")]
    pub l2_cache: CacheLevelConfig,
    #[serde(default = "PerfModelConfig::default_l3")]
    pub l3_cache: CacheLevelConfig,
    #[serde(default)]
    pub dram: DramConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub itlb: TlbConfig,
    #[serde(default)]
    pub dtlb: TlbConfig,
}

impl PerfModelConfig {
    fn default_l1i() -> CacheLevelConfig {
        CacheLevelConfig::defaults(defaults::L1_SIZE_BYTES, defaults::L1_ASSOCIATIVITY)
    }

    fn default_l1d() -> CacheLevelConfig {
        CacheLevelConfig::defaults(defaults::L1_SIZE_BYTES, defaults::L1_ASSOCIATIVITY)
    }

    fn default_l2() -> CacheLevelConfig {
        CacheLevelConfig::defaults(defaults::L2_SIZE_BYTES, defaults::L2_ASSOCIATIVITY)
    }

    fn default_l3() -> CacheLevelConfig {
        CacheLevelConfig::defaults(defaults::L3_SIZE_BYTES, defaults::L3_ASSOCIATIVITY)
    }
}

impl Default for PerfModelConfig {
    fn default() -> Self {
        Self {
            l1_icache: Self::default_l1i(),
            l1_dcache: Self::default_l1d(),
            l2_cache: Self::default_l2(),
            l3_cache: Self::default_l3(),
            dram: DramConfig::default(),
            sync: SyncConfig::default(),
            itlb: TlbConfig::default(),
            dtlb: TlbConfig::default(),
        }
    }
}

/// One TLB's occupancy-table shape plus the latency charged on a miss when
/// `Modeled::CountTlbTime` is requested (spec.md §4.C).
#[derive(Debug, Clone, Deserialize)]
pub struct TlbConfig {
    #[serde(default = "TlbConfig::default_page_size")]
    pub page_size: usize,
    #[serde(default = "TlbConfig::default_num_sets")]
    pub num_sets: usize,
    #[serde(default = "TlbConfig::default_associativity")]
    pub associativity: usize,
    #[serde(default = "TlbConfig::default_miss_latency_ns")]
    pub miss_latency_ns: u64,
}

impl TlbConfig {
    fn default_page_size() -> usize {
        defaults::TLB_PAGE_SIZE
    }

    fn default_num_sets() -> usize {
        defaults::TLB_NUM_SETS
    }

    fn default_associativity() -> usize {
        defaults::TLB_ASSOCIATIVITY
    }

    fn default_miss_latency_ns() -> u64 {
        defaults::TLB_MISS_LATENCY_NS
    }
}

impl Default for TlbConfig {
    fn default() -> Self {
        Self {
            page_size: defaults::TLB_PAGE_SIZE,
            num_sets: defaults::TLB_NUM_SETS,
            associativity: defaults::TLB_ASSOCIATIVITY,
            miss_latency_ns: defaults::TLB_MISS_LATENCY_NS,
        }
    }
}

/// One level of the cache hierarchy (spec.md §6 `perf_model/{...}/{...}`).
#[derive(Debug, Clone, Deserialize)]
pub struct CacheLevelConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "CacheLevelConfig::default_size")]
    pub size: usize,
    #[serde(default = "CacheLevelConfig::default_associativity")]
    pub associativity: usize,
    #[serde(default = "CacheLevelConfig::default_block_size")]
    pub block_size: usize,
    #[serde(default)]
    pub replacement_policy: ReplacementPolicyConfig,
    #[serde(default = "CacheLevelConfig::default_access_time_ns")]
    pub access_time_ns: u64,
    #[serde(default = "CacheLevelConfig::default_writeback_time_ns")]
    pub writeback_time_ns: u64,
    #[serde(default = "CacheLevelConfig::default_outstanding_misses")]
    pub outstanding_misses: usize,
    #[serde(default = "CacheLevelConfig::default_shared_cores")]
    pub shared_cores: usize,
    #[serde(default)]
    pub prefetcher: PrefetcherConfig,
}

impl CacheLevelConfig {
    fn defaults(size: usize, associativity: usize) -> Self {
        Self {
            enabled: true,
            size,
            associativity,
            block_size: defaults::BLOCK_SIZE,
            replacement_policy: ReplacementPolicyConfig::default(),
            access_time_ns: defaults::ACCESS_TIME_NS,
            writeback_time_ns: defaults::WRITEBACK_TIME_NS,
            outstanding_misses: defaults::OUTSTANDING_MISSES,
            shared_cores: defaults::SHARED_CORES,
            prefetcher: PrefetcherConfig::default(),
        }
    }

    fn default_size() -> usize {
        defaults::L1_SIZE_BYTES
    }

    fn default_associativity() -> usize {
        defaults::L1_ASSOCIATIVITY
    }

    fn default_block_size() -> usize {
        defaults::BLOCK_SIZE
    }

    fn default_access_time_ns() -> u64 {
        defaults::ACCESS_TIME_NS
    }

    fn default_writeback_time_ns() -> u64 {
        defaults::WRITEBACK_TIME_NS
    }

    fn default_outstanding_misses() -> usize {
        defaults::OUTSTANDING_MISSES
    }

    fn default_shared_cores() -> usize {
        defaults::SHARED_CORES
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DramConfig {
    #[serde(default = "DramConfig::default_latency_ns")]
    pub latency_ns: u64,
    #[serde(default = "DramConfig::default_bandwidth")]
    pub per_controller_bandwidth: u64,
}

impl DramConfig {
    fn default_latency_ns() -> u64 {
        defaults::DRAM_LATENCY_NS
    }

    fn default_bandwidth() -> u64 {
        defaults::DRAM_PER_CONTROLLER_BANDWIDTH_BITS_PER_CYCLE
    }
}

impl Default for DramConfig {
    fn default() -> Self {
        Self {
            latency_ns: defaults::DRAM_LATENCY_NS,
            per_controller_bandwidth: defaults::DRAM_PER_CONTROLLER_BANDWIDTH_BITS_PER_CYCLE,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "SyncConfig::default_reschedule_cost_ns")]
    pub reschedule_cost_ns: u64,
}

impl SyncConfig {
    fn default_reschedule_cost_ns() -> u64 {
        defaults::SYNC_RESCHEDULE_COST_NS
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { reschedule_cost_ns: defaults::SYNC_RESCHEDULE_COST_NS }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    #[serde(default)]
    pub bus: BusConfig,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self { bus: BusConfig::default() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BusConfig {
    #[serde(default = "BusConfig::default_bandwidth")]
    pub bandwidth_bits_per_cycle: u64,
    #[serde(default = "BusConfig::default_cycle_period_fs")]
    pub cycle_period_fs: u64,
    #[serde(default)]
    pub ignore_local_traffic: bool,
    #[serde(default)]
    pub queue_model: QueueModelConfig,
}

impl BusConfig {
    fn default_bandwidth() -> u64 {
        defaults::BUS_BANDWIDTH_BITS_PER_CYCLE
    }

    fn default_cycle_period_fs() -> u64 {
        defaults::BUS_CYCLE_PERIOD_FS
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            bandwidth_bits_per_cycle: defaults::BUS_BANDWIDTH_BITS_PER_CYCLE,
            cycle_period_fs: defaults::BUS_CYCLE_PERIOD_FS,
            ignore_local_traffic: false,
            queue_model: QueueModelConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueModelConfig {
    #[serde(default)]
    pub r#type: QueueModelKind,
    #[serde(default)]
    pub windowed_mg1: WindowedMg1Config,
}

impl Default for QueueModelConfig {
    fn default() -> Self {
        Self {
            r#type: QueueModelKind::default(),
            windowed_mg1: WindowedMg1Config::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WindowedMg1Config {
    #[serde(default = "WindowedMg1Config::default_window_size")]
    pub window_size: usize,
}

impl WindowedMg1Config {
    fn default_window_size() -> usize {
        defaults::WINDOWED_MG1_WINDOW_SIZE
    }
}

impl Default for WindowedMg1Config {
    fn default() -> Self {
        Self { window_size: defaults::WINDOWED_MG1_WINDOW_SIZE }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FaultInjectionConfig {
    #[serde(default)]
    pub r#type: FaultInjectionType,
    #[serde(default)]
    pub affected: Vec<String>,
}

impl Default for FaultInjectionConfig {
    fn default() -> Self {
        Self {
            r#type: FaultInjectionType::default(),
            affected: Vec::new(),
        }
    }
}
