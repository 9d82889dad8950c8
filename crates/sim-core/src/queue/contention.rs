//! FCFS contention model (spec.md §4.A).
//!
//! Grounded directly on `soc/memory/controller.rs`'s `DramController`: a
//! single piece of rolling state (there: `last_row`) updated by every call
//! and consulted by the next. Here the rolling state is the completion time
//! of the request at the tail of a first-come-first-served resource.

use super::QueueModel;
use crate::time::Time;

/// Tracks a single FCFS resource's completion-time tail.
pub struct ContentionModel {
    t_completion_of_tail: Time,
}

impl Default for ContentionModel {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentionModel {
    /// Creates a new, initially-idle contention tracker.
    pub fn new() -> Self {
        Self {
            t_completion_of_tail: Time::ZERO,
        }
    }

    /// Computes `max(t_start, t_tail) + t_service` and advances the tail.
    pub fn get_completion_time(&mut self, t_start: Time, t_service: Time) -> Time {
        let start = t_start.max(self.t_completion_of_tail);
        let completion = start.saturating_add(t_service);
        self.t_completion_of_tail = completion;
        completion
    }
}

impl QueueModel for ContentionModel {
    fn compute_queue_delay(&mut self, t_arrival: Time, service_time: Time) -> Time {
        let completion = self.get_completion_time(t_arrival, service_time);
        completion.checked_sub(t_arrival).checked_sub(service_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_resource_incurs_no_queue_delay() {
        let mut m = ContentionModel::new();
        assert_eq!(
            m.get_completion_time(Time::from_ns(0), Time::from_ns(10)),
            Time::from_ns(10)
        );
    }

    #[test]
    fn back_to_back_arrivals_serialize() {
        let mut m = ContentionModel::new();
        assert_eq!(
            m.get_completion_time(Time::from_ns(0), Time::from_ns(8)),
            Time::from_ns(8)
        );
        // Second arrival also at t=0, 8ns service: must wait behind the first.
        assert_eq!(
            m.get_completion_time(Time::from_ns(0), Time::from_ns(8)),
            Time::from_ns(16)
        );
    }

    #[test]
    fn monotonic_in_start_time() {
        let mut m = ContentionModel::new();
        let c1 = m.get_completion_time(Time::from_ns(0), Time::from_ns(5));
        let mut m2 = ContentionModel::new();
        let c2 = m2.get_completion_time(Time::from_ns(1), Time::from_ns(5));
        assert!(c2 >= c1);
    }
}
