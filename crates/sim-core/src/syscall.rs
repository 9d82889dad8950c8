//! Syscall / futex collaborator (spec.md §4.K).
//!
//! No teacher precedent exists (the teacher's single-hart core never
//! blocks); shaped after [`crate::mshr::Mshr`]'s small bounded-map-plus-FIFO
//! style, since a futex is itself just a per-address waiter queue with a
//! timeout-driven sweep.

use std::collections::{HashMap, VecDeque};

use crate::time::Time;

/// Result of a `FUTEX_WAIT` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitOutcome {
    /// `*uaddr` didn't match `expected`; the caller never blocked.
    WouldBlock,
    /// The thread was enqueued and must stall until woken or timed out.
    Stalled,
}

/// Result of a completed stall, delivered once the waiter is popped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WakeReason {
    Woken,
    TimedOut,
}

struct Waiter {
    thread: usize,
    bitmask: u32,
    timeout: Option<Time>,
}

/// One kernel-futex-style wait queue keyed by user address, plus the fixed
/// costs and counters the periodic sweep and wake paths need (spec.md §4.K).
pub struct FutexTable {
    reschedule_cost: Time,
    queues: HashMap<u64, VecDeque<Waiter>>,
    wait_count: u64,
    wake_count: u64,
    timeout_count: u64,
}

impl FutexTable {
    /// Creates an empty futex table; each successful wake costs
    /// `reschedule_cost` before the waiter resumes (spec.md §4.K).
    pub fn new(reschedule_cost: Time) -> Self {
        Self {
            reschedule_cost,
            queues: HashMap::new(),
            wait_count: 0,
            wake_count: 0,
            timeout_count: 0,
        }
    }

    /// `FUTEX_WAIT(uaddr, expected, bitmask, timeout)`. The caller has
    /// already read `*uaddr`; passes it in as `observed` since this table
    /// has no memory access of its own.
    pub fn wait(&mut self, uaddr: u64, observed: u32, expected: u32, bitmask: u32, timeout: Option<Time>, thread: usize) -> WaitOutcome {
        if observed != expected {
            return WaitOutcome::WouldBlock;
        }
        self.wait_count += 1;
        self.queues.entry(uaddr).or_default().push_back(Waiter { thread, bitmask, timeout });
        WaitOutcome::Stalled
    }

    /// `FUTEX_WAKE(uaddr, nr, bitmask)`. Returns the threads woken, in FIFO
    /// order, each to resume no earlier than `now + reschedule_cost`.
    pub fn wake(&mut self, uaddr: u64, nr: u32, bitmask: u32, now: Time) -> Vec<(usize, Time)> {
        let Some(queue) = self.queues.get_mut(&uaddr) else {
            return Vec::new();
        };
        let mut woken = Vec::new();
        let mut remaining = VecDeque::new();
        while let Some(waiter) = queue.pop_front() {
            if woken.len() < nr as usize && waiter.bitmask & bitmask != 0 {
                woken.push((waiter.thread, now.saturating_add(self.reschedule_cost)));
            } else {
                remaining.push_back(waiter);
            }
        }
        *queue = remaining;
        if queue.is_empty() {
            self.queues.remove(&uaddr);
        }
        self.wake_count += woken.len() as u64;
        woken
    }

    /// `FUTEX_WAKE_OP(uaddr, val, uaddr2, nr, nr2, encoded_op)`. The caller
    /// performs the locked read-modify-write on `*uaddr2` itself (this table
    /// has no memory access) and supplies whether the embedded comparison
    /// held via `cmp_result`.
    pub fn wake_op(&mut self, uaddr: u64, nr: u32, uaddr2: u64, nr2: u32, cmp_result: bool, now: Time) -> (Vec<(usize, Time)>, Vec<(usize, Time)>) {
        let primary = self.wake(uaddr, nr, u32::MAX, now);
        let secondary = if cmp_result { self.wake(uaddr2, nr2, u32::MAX, now) } else { Vec::new() };
        (primary, secondary)
    }

    /// `FUTEX_CMP_REQUEUE(uaddr, val, uaddr2, val3)`. The caller supplies
    /// `observed` (`*uaddr`) to compare against `val3`. On match, wakes up
    /// to `val` waiters on `uaddr` and moves the rest to `uaddr2`.
    pub fn cmp_requeue(&mut self, uaddr: u64, observed: u32, val3: u32, val: u32, uaddr2: u64, now: Time) -> Result<Vec<(usize, Time)>, ()> {
        if observed != val3 {
            return Err(());
        }
        let woken = self.wake(uaddr, val, u32::MAX, now);
        if let Some(mut rest) = self.queues.remove(&uaddr) {
            self.queues.entry(uaddr2).or_default().append(&mut rest);
        }
        Ok(woken)
    }

    /// Periodic sweep (driven by `HOOK_PERIODIC`): wakes every waiter whose
    /// `timeout <= now` with failure, returning the threads timed out.
    pub fn sweep_timeouts(&mut self, now: Time) -> Vec<usize> {
        let mut timed_out = Vec::new();
        self.queues.retain(|_, queue| {
            let mut remaining = VecDeque::new();
            while let Some(waiter) = queue.pop_front() {
                match waiter.timeout {
                    Some(t) if t <= now => timed_out.push(waiter.thread),
                    _ => remaining.push_back(waiter),
                }
            }
            *queue = remaining;
            !queue.is_empty()
        });
        self.timeout_count += timed_out.len() as u64;
        timed_out
    }

    pub fn wait_count(&self) -> u64 {
        self.wait_count
    }

    pub fn wake_count(&self) -> u64 {
        self.wake_count
    }

    pub fn timeout_count(&self) -> u64 {
        self.timeout_count
    }
}

/// The subset of non-futex syscalls emulated by advancing simulated time
/// rather than blocking the host thread (spec.md §4.K).
#[derive(Clone, Copy, Debug)]
pub enum TimeEmulatedSyscall {
    SchedYield,
    Pause,
    NanoSleep { duration: Time },
    ClockGetTime,
}

impl TimeEmulatedSyscall {
    /// The `target` to use in a `Sync` dynamic instruction emulating this
    /// call (spec.md §4.H `DynamicInstruction::Sync`).
    pub fn sync_target(self, now: Time, fixed_cost: Time) -> Time {
        match self {
            TimeEmulatedSyscall::SchedYield | TimeEmulatedSyscall::Pause | TimeEmulatedSyscall::ClockGetTime => {
                now.saturating_add(fixed_cost)
            }
            TimeEmulatedSyscall::NanoSleep { duration } => now.saturating_add(duration),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_with_mismatched_value_never_blocks() {
        let mut f = FutexTable::new(Time::from_ns(5));
        assert_eq!(f.wait(0x1000, 1, 0, u32::MAX, None, 0), WaitOutcome::WouldBlock);
        assert_eq!(f.wait_count(), 0);
    }

    #[test]
    fn wake_resumes_waiters_after_reschedule_cost() {
        let mut f = FutexTable::new(Time::from_ns(5));
        assert_eq!(f.wait(0x1000, 0, 0, u32::MAX, None, 7), WaitOutcome::Stalled);
        let woken = f.wake(0x1000, 1, u32::MAX, Time::from_ns(100));
        assert_eq!(woken, vec![(7, Time::from_ns(105))]);
        assert_eq!(f.wake_count(), 1);
    }

    #[test]
    fn wake_respects_bitmask_intersection() {
        let mut f = FutexTable::new(Time::ZERO);
        f.wait(0x1000, 0, 0, 0b01, None, 1);
        f.wait(0x1000, 0, 0, 0b10, None, 2);
        let woken = f.wake(0x1000, 2, 0b10, Time::ZERO);
        assert_eq!(woken, vec![(2, Time::ZERO)]);
    }

    #[test]
    fn cmp_requeue_moves_remaining_waiters() {
        let mut f = FutexTable::new(Time::ZERO);
        f.wait(0x1000, 0, 0, u32::MAX, None, 1);
        f.wait(0x1000, 0, 0, u32::MAX, None, 2);
        f.wait(0x1000, 0, 0, u32::MAX, None, 3);
        let woken = f.cmp_requeue(0x1000, 5, 5, 1, 0x2000, Time::ZERO).unwrap();
        assert_eq!(woken, vec![(1, Time::ZERO)]);
        let requeued = f.wake(0x2000, 2, u32::MAX, Time::ZERO);
        assert_eq!(requeued, vec![(2, Time::ZERO), (3, Time::ZERO)]);
    }

    #[test]
    fn cmp_requeue_rejects_on_value_mismatch() {
        let mut f = FutexTable::new(Time::ZERO);
        f.wait(0x1000, 0, 0, u32::MAX, None, 1);
        assert!(f.cmp_requeue(0x1000, 9, 5, 1, 0x2000, Time::ZERO).is_err());
    }

    #[test]
    fn sweep_times_out_expired_waiters_only() {
        let mut f = FutexTable::new(Time::ZERO);
        f.wait(0x1000, 0, 0, u32::MAX, Some(Time::from_ns(10)), 1);
        f.wait(0x1000, 0, 0, u32::MAX, Some(Time::from_ns(1000)), 2);
        let timed_out = f.sweep_timeouts(Time::from_ns(50));
        assert_eq!(timed_out, vec![1]);
        assert_eq!(f.timeout_count(), 1);
        assert_eq!(f.wake(0x1000, 10, u32::MAX, Time::from_ns(50)), vec![(2, Time::from_ns(50))]);
    }
}
