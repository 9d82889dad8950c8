//! Windowed M/G/1 queueing delay estimator (spec.md §4.A).
//!
//! Maintains a sliding window of recent `(t_arrival, service_time)` pairs
//! and derives the Pollaczek-Khinchine mean-waiting-time approximation from
//! their empirical moments. Shaped like the teacher's `DramController` (a
//! small struct holding rolling state updated on every access) rather than
//! anything from a queueing-theory crate — the pack carries no such
//! dependency, and the algorithm here is the exact five-step recipe spec.md
//! §4.A spells out, not a general-purpose simulation.

use std::collections::VecDeque;

use super::QueueModel;
use crate::time::Time;

/// A single recorded arrival: `(t_arrival, service_time)`.
struct Arrival {
    t_arrival: Time,
    service_time: Time,
}

/// Windowed M/G/1 queue model (spec.md §4.A "History-list").
pub struct HistoryQueueModel {
    window: Time,
    arrivals: VecDeque<Arrival>,
}

impl HistoryQueueModel {
    /// Creates a new history-list queue model with sliding window `window`
    /// (spec.md example: 1 microsecond).
    pub fn new(window: Time) -> Self {
        Self {
            window,
            arrivals: VecDeque::new(),
        }
    }

    /// Drops arrivals older than `t - window`, per spec.md §4.A step 1.
    fn evict_stale(&mut self, t: Time) {
        let cutoff = t.as_fs().saturating_sub(self.window.as_fs());
        while let Some(front) = self.arrivals.front() {
            if front.t_arrival.as_fs() < cutoff {
                self.arrivals.pop_front();
            } else {
                break;
            }
        }
    }
}

impl QueueModel for HistoryQueueModel {
    fn compute_queue_delay(&mut self, t: Time, s: Time) -> Time {
        self.evict_stale(t);

        let delay = if self.arrivals.len() < 2 {
            Time::ZERO
        } else {
            let w = self.window.as_fs() as f64;
            let sum_s: f64 = self.arrivals.iter().map(|a| a.service_time.as_fs() as f64).sum();
            let sum_s2: f64 = self
                .arrivals
                .iter()
                .map(|a| {
                    let si = a.service_time.as_fs() as f64;
                    si * si
                })
                .sum();
            let n = self.arrivals.len() as f64;

            let rho = (sum_s / w).min(0.99);
            let lambda = n / w;
            let e_s2 = sum_s2 / n;

            let t_queue = (lambda * e_s2) / (2.0 * (1.0 - rho));
            let t_queue = t_queue.min(w);
            Time::from_fs(t_queue.max(0.0) as u64)
        };

        self.arrivals.push_back(Arrival {
            t_arrival: t,
            service_time: s,
        });

        delay
    }
}
