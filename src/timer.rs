//! Timer wheel (spec.md §4.G): exact timers driven by a min-heap, plus the
//! coarse gates the event loop (`eventloop.rs`) checks every iteration.
//!
//! Grounded on `inspircd.cpp`'s `DoOneIteration`: the `TIME % 5` gate for
//! background housekeeping, the `iterations % 15` gate for per-user
//! upkeep, and the `TIME % 3600` gate for WHOWAS compaction.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

pub type TimerId = u64;

struct ScheduledTimer {
    fire_at: i64,
    id: TimerId,
    recur_every: Option<i64>,
}

impl PartialEq for ScheduledTimer {
    fn eq(&self, other: &Self) -> bool {
        self.fire_at == other.fire_at
    }
}
impl Eq for ScheduledTimer {}
impl PartialOrd for ScheduledTimer {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for ScheduledTimer {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.fire_at.cmp(&other.fire_at)
    }
}

/// Exact-timer min-heap plus the coarse gates from spec.md §4.G.
pub struct TimerWheel {
    heap: BinaryHeap<Reverse<ScheduledTimer>>,
    next_id: TimerId,
    five_second_gate: bool,
    iterations: u64,
    last_whowas_compaction: i64,
    previous_now: i64,
}

impl Default for TimerWheel {
    fn default() -> Self {
        TimerWheel {
            heap: BinaryHeap::new(),
            next_id: 0,
            five_second_gate: false,
            iterations: 0,
            last_whowas_compaction: 0,
            previous_now: 0,
        }
    }
}

impl TimerWheel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, fire_at: i64, recur_every: Option<i64>) -> TimerId {
        let id = self.next_id;
        self.next_id += 1;
        self.heap.push(Reverse(ScheduledTimer { fire_at, id, recur_every }));
        id
    }

    pub fn cancel(&mut self, id: TimerId) {
        self.heap.retain(|Reverse(t)| t.id != id);
    }

    /// Fires every timer whose fire-time is `<= now`, rescheduling
    /// recurring ones. On a long stall the wheel catches up every missed
    /// recurrence in one fire, never once per miss (spec.md §4.G "Missed-
    /// tick catch-up").
    pub fn tick(&mut self, now: i64) -> Vec<TimerId> {
        let mut fired = Vec::new();
        while let Some(Reverse(timer)) = self.heap.peek() {
            if timer.fire_at > now {
                break;
            }
            let Reverse(timer) = self.heap.pop().unwrap();
            fired.push(timer.id);
            if let Some(period) = timer.recur_every {
                let mut next = timer.fire_at + period;
                if next <= now {
                    // Missed one or more recurrences: skip straight to the
                    // next fire-time strictly after `now` instead of
                    // re-queuing and re-popping each missed tick.
                    let missed = (now - next) / period + 1;
                    next += missed * period;
                }
                self.heap.push(Reverse(ScheduledTimer { fire_at: next, id: timer.id, recur_every: timer.recur_every }));
            }
        }
        fired
    }

    /// Runs the 5-second, 15-iteration and 3600-second gates for one event
    /// loop iteration (spec.md §4.I steps 2-5). Returns which background
    /// tasks this iteration should perform.
    pub fn advance(&mut self, now: i64) -> IterationWork {
        if now < self.previous_now {
            log::warn!("clock regression observed: {} -> {}", self.previous_now, now);
        }
        let mut work = IterationWork::default();

        if now % 5 == 0 && !self.five_second_gate {
            work.background_housekeeping = true;
            self.five_second_gate = true;
        } else if now % 5 == 1 {
            self.five_second_gate = false;
        }

        self.iterations += 1;
        if self.iterations % 15 == 0 {
            work.per_user_upkeep = true;
        }

        if now != self.previous_now && now / 3600 != self.last_whowas_compaction / 3600 {
            work.whowas_compaction = true;
            self.last_whowas_compaction = now;
        }

        self.previous_now = now;
        work
    }
}

#[derive(Default, Debug, Eq, PartialEq)]
pub struct IterationWork {
    pub background_housekeeping: bool,
    pub per_user_upkeep: bool,
    pub whowas_compaction: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_due_timers_in_order() {
        let mut wheel = TimerWheel::new();
        wheel.schedule(10, None);
        wheel.schedule(5, None);
        assert_eq!(wheel.tick(7), vec![1]); // only the one at t=5 is due
        assert_eq!(wheel.tick(10), vec![0]);
    }

    #[test]
    fn recurring_timer_reschedules() {
        let mut wheel = TimerWheel::new();
        wheel.schedule(5, Some(5));
        assert_eq!(wheel.tick(5), vec![0]);
        assert!(wheel.tick(9).is_empty());
        assert_eq!(wheel.tick(10), vec![0]);
    }

    #[test]
    fn long_stall_fires_recurrence_once_not_once_per_miss() {
        let mut wheel = TimerWheel::new();
        wheel.schedule(5, Some(5));
        // Jump straight to t=100: 19 recurrences were missed, but `tick`
        // must report exactly one fire for this timer, not nineteen.
        assert_eq!(wheel.tick(100), vec![0]);
        assert!(wheel.tick(100).is_empty());
    }

    #[test]
    fn five_second_gate_fires_once_per_window() {
        let mut wheel = TimerWheel::new();
        assert!(wheel.advance(10).background_housekeeping);
        assert!(!wheel.advance(10).background_housekeeping);
        wheel.advance(11);
        assert!(wheel.advance(15).background_housekeeping);
    }

    #[test]
    fn fifteenth_iteration_requests_per_user_upkeep() {
        let mut wheel = TimerWheel::new();
        for i in 1..15 {
            assert!(!wheel.advance(i).per_user_upkeep);
        }
        assert!(wheel.advance(15).per_user_upkeep);
    }
}
