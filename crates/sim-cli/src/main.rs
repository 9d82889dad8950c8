//! Multicore performance simulator CLI.
//!
//! This binary provides a single entry point for replaying a JSON scenario
//! against the simulator core. It performs:
//! 1. **Config load:** Deserialize a `SimConfig` from a JSON file, or fall
//!    back to built-in defaults.
//! 2. **Scenario replay:** Deserialize a list of per-core memory operations
//!    and feed each one through its core's façade in order.
//! 3. **Stats report:** Print per-core elapsed time plus directory, bus, and
//!    fault-injection counters once the scenario has drained.

use std::{fs, process};

use clap::Parser;
use serde::Deserialize;

use sim_core::common::{Address, MemOpKind, Modeled};
use sim_core::core_facade::LockSignal;
use sim_core::host_memory::HostMemory;
use sim_core::{SimConfig, SimulationContext};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(
    name = "sim",
    author,
    version,
    about = "Multicore microarchitectural performance simulator",
    long_about = "Replay a JSON scenario of per-core memory operations against the coherent cache hierarchy, bus, and DRAM timing model.\n\nExamples:\n  sim run --scenario scenarios/producer_consumer.json\n  sim run --scenario scenarios/bus_contention.json --config scenarios/small_l1.json"
)]
struct Cli {
    /// Path to a JSON scenario file (see `Scenario`'s fields).
    #[arg(short, long)]
    scenario: String,

    /// Path to a JSON `SimConfig` override; built-in defaults are used if omitted.
    #[arg(short, long)]
    config: Option<String>,
}

/// One core-originated memory operation to replay.
#[derive(Debug, Deserialize)]
struct ScenarioOp {
    core: usize,
    kind: ScenarioOpKind,
    addr: u64,
    size: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ScenarioOpKind {
    Load,
    Store,
}

/// A replayable workload: how many cores participate and the ordered
/// sequence of operations issued against them.
#[derive(Debug, Deserialize)]
struct Scenario {
    #[serde(default = "Scenario::default_cores")]
    cores: usize,
    #[serde(default = "Scenario::default_host_memory_bytes")]
    host_memory_bytes: usize,
    ops: Vec<ScenarioOp>,
}

impl Scenario {
    fn default_cores() -> usize {
        1
    }

    fn default_host_memory_bytes() -> usize {
        16 * 1024 * 1024
    }
}

fn main() {
    let cli = Cli::parse();
    cmd_run(&cli.scenario, cli.config.as_deref());
}

/// Builds a `SimulationContext` from `config_path` (or defaults) and replays
/// every operation in `scenario_path` against it, then prints stats.
fn cmd_run(scenario_path: &str, config_path: Option<&str>) {
    let config = config_path.map_or_else(SimConfig::default, |path| {
        let text = fs::read_to_string(path).unwrap_or_else(|e| {
            eprintln!("Error reading config {path}: {e}");
            process::exit(1);
        });
        serde_json::from_str(&text).unwrap_or_else(|e| {
            eprintln!("Error parsing config {path}: {e}");
            process::exit(1);
        })
    });

    let scenario_text = fs::read_to_string(scenario_path).unwrap_or_else(|e| {
        eprintln!("Error reading scenario {scenario_path}: {e}");
        process::exit(1);
    });
    let scenario: Scenario = serde_json::from_str(&scenario_text).unwrap_or_else(|e| {
        eprintln!("Error parsing scenario {scenario_path}: {e}");
        process::exit(1);
    });

    println!("[*] Scenario: {scenario_path}  cores={}  ops={}", scenario.cores, scenario.ops.len());

    let host_memory = Arc::new(HostMemory::new(scenario.host_memory_bytes));
    let ctx = SimulationContext::new(&config, scenario.cores, Some(host_memory));

    for op in &scenario.ops {
        if op.core >= ctx.num_cores() {
            eprintln!("Error: scenario references core {} but only {} are configured", op.core, ctx.num_cores());
            process::exit(1);
        }
        let core = ctx.core(op.core);
        let kind = match op.kind {
            ScenarioOpKind::Load => MemOpKind::Load,
            ScenarioOpKind::Store => MemOpKind::Store,
        };
        let mut buf = vec![0u8; op.size];
        let outcome = core
            .access_memory(LockSignal::None, kind, Address::new(op.addr), Some(&mut buf), op.addr, None, Modeled::Count)
            .unwrap_or_else(|e| {
                eprintln!("\n[!] FATAL: {e}");
                process::exit(1);
            });
        println!(
            "  core={} {:?} addr={:#x} size={} hit_where={:?} misses={}",
            op.core, op.kind, op.addr, op.size, outcome.hit_where, outcome.num_misses
        );
    }

    println!();
    print_stats(&ctx);
}

/// Prints directory and bus stats for `ctx`, matching the teacher's
/// end-of-run summary shape.
fn print_stats(ctx: &SimulationContext) {
    let dram = ctx.dram_counters();
    println!(
        "DRAM: accesses={} total_access_latency_fs={} total_queueing_delay_fs={}",
        dram.num_accesses, dram.total_access_latency, dram.total_queueing_delay
    );

    let bus = ctx.bus_counters();
    println!("Bus:  packets_delayed={} total_delay_fs={}", bus.num_packets_delayed, bus.total_delay);
}
