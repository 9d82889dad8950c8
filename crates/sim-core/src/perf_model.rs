//! Per-core performance model façade (spec.md §4.H).
//!
//! Grounded on the teacher's `sim/simulator.rs` top-level tick loop in
//! spirit (a façade draining queued work and dispatching to a configured
//! consumer) but restructured around the two timelines spec.md names:
//! `user_time` advancing with retired instructions and memory accesses,
//! `sim_time` advancing inside coherence round trips the user thread isn't
//! blocked on.

use std::collections::VecDeque;

use crate::time::Time;

/// A basic block queued for interval-model consumption.
#[derive(Clone, Debug)]
pub struct BasicBlock {
    pub start_addr: u64,
    pub num_instructions: u64,
    pub num_memory_ops: u64,
}

/// A single synthesized dynamic instruction (spec.md §4.H).
#[derive(Clone, Debug)]
pub enum DynamicInstruction {
    /// Forces `user_time` to `target`, used for sleeps/yields/clock reads.
    Sync { target: Time },
    /// A timed memory access synthesized by the core façade.
    MemAccess { latency: Time, fenced: bool },
    /// A TLB miss charged to the requesting instruction.
    TlbMiss { latency: Time },
}

/// Auxiliary metadata describing one dynamic memory access, consumed in
/// lockstep with the basic-block queue by `iterate()` (spec.md §4.H
/// invariant: one dyninfo per memory micro-op dequeued).
#[derive(Clone, Debug)]
pub struct DynamicInstructionInfo {
    pub eip: u64,
    pub shmem_time: Time,
    pub addr: u64,
    pub size: usize,
    pub is_write: bool,
    pub num_misses: u32,
    pub hit_where: crate::common::HitWhere,
}

/// Granularity at which `HOOK_PERIODIC` fires to let the clock-skew barrier
/// re-check core divergence (spec.md §5).
const DEFAULT_PERIODIC_GRANULARITY: u64 = 1000;

/// One core's performance-model state: the two logical clocks plus the
/// queues `iterate()` drains in lockstep.
pub struct PerformanceModel {
    user_time: Time,
    idle_elapsed_time: Time,
    basic_blocks: VecDeque<BasicBlock>,
    dynamic_instructions: VecDeque<DynamicInstruction>,
    dyninfo: VecDeque<DynamicInstructionInfo>,
    periodic_granularity: u64,
    instructions_since_periodic: u64,
}

impl PerformanceModel {
    pub fn new(periodic_granularity: Option<u64>) -> Self {
        Self {
            user_time: Time::ZERO,
            idle_elapsed_time: Time::ZERO,
            basic_blocks: VecDeque::new(),
            dynamic_instructions: VecDeque::new(),
            dyninfo: VecDeque::new(),
            periodic_granularity: periodic_granularity.unwrap_or(DEFAULT_PERIODIC_GRANULARITY),
            instructions_since_periodic: 0,
        }
    }

    /// Current `user_time`.
    pub fn user_time(&self) -> Time {
        self.user_time
    }

    /// Non-idle elapsed time: `user_time - idle_time_accumulator` (spec.md §3).
    pub fn elapsed(&self) -> Time {
        self.user_time.checked_sub(self.idle_elapsed_time)
    }

    /// Appends a basic block to the interval-model queue.
    pub fn queue_basic_block(&mut self, bb: BasicBlock) {
        self.instructions_since_periodic += bb.num_instructions;
        self.basic_blocks.push_back(bb);
    }

    /// Enqueues a single synthesized dynamic instruction.
    pub fn queue_dynamic_instruction(&mut self, instr: DynamicInstruction) {
        self.dynamic_instructions.push_back(instr);
    }

    /// Pushes auxiliary dynamic-access metadata, consumed by the next
    /// `iterate()` in arrival order.
    pub fn push_dyninfo(&mut self, info: DynamicInstructionInfo) {
        self.dyninfo.push_back(info);
    }

    /// Pops the oldest pending dyninfo record, if any.
    pub fn pop_dyninfo(&mut self) -> Option<DynamicInstructionInfo> {
        self.dyninfo.pop_front()
    }

    /// Drains both queues, advancing `user_time` according to each queued
    /// item, and returns whether a `HOOK_PERIODIC` boundary was crossed.
    pub fn iterate(&mut self) -> bool {
        while let Some(instr) = self.dynamic_instructions.pop_front() {
            match instr {
                DynamicInstruction::Sync { target } => {
                    if target > self.user_time {
                        let idle = target.checked_sub(self.user_time);
                        self.idle_elapsed_time = self.idle_elapsed_time.saturating_add(idle);
                    }
                    self.user_time = self.user_time.max(target);
                }
                DynamicInstruction::MemAccess { latency, .. } | DynamicInstruction::TlbMiss { latency } => {
                    self.user_time = self.user_time.saturating_add(latency);
                }
            }
        }
        self.basic_blocks.clear();

        if self.instructions_since_periodic >= self.periodic_granularity {
            self.instructions_since_periodic = 0;
            return true;
        }
        false
    }
}
