use std::collections::HashMap;

use crate::domain::status::TerminalStatus;
use crate::domain::time_format::format_offline_duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimestampMs(pub i64);

pub trait Clock {
    fn now(&self) -> TimestampMs;
}

/// One row of the change log, created at detection time and never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRecord {
    pub terminal_id: i64,
    pub timestamp: TimestampMs,
    pub status: TerminalStatus,
    pub offline_duration: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alert {
    pub previous: TerminalStatus,
    pub current: TerminalStatus,
    pub back_online: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusChange {
    pub record: ChangeRecord,
    pub alert: Option<Alert>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    /// Observed status equals the remembered one.
    Unchanged,
    /// First observation for this terminal after process start; state is
    /// initialized silently without a record or an alert.
    Synchronized,
    Changed(StatusChange),
}

#[derive(Debug, Clone, PartialEq)]
struct TerminalState {
    current: TerminalStatus,
    previous: Option<TerminalStatus>,
    last_change: Option<TimestampMs>,
    offline_since: Option<TimestampMs>,
}

/// Per-terminal transition detector and offline-duration accumulator.
///
/// Holds one state entry per terminal id. Alerting follows the binary
/// partition {Online} vs {everything else}: churn between two non-Online
/// statuses is logged but never alerted, and never touches `offline_since`.
#[derive(Debug, Default)]
pub struct StatusTracker {
    states: HashMap<i64, TerminalState>,
}

impl StatusTracker {
    pub fn new() -> Self {
        Self {
            states: HashMap::new(),
        }
    }

    pub fn observe<C: Clock>(
        &mut self,
        terminal_id: i64,
        observed: TerminalStatus,
        clock: &C,
    ) -> Observation {
        let now = clock.now();

        let Some(state) = self.states.get_mut(&terminal_id) else {
            self.states.insert(
                terminal_id,
                TerminalState {
                    current: observed,
                    previous: None,
                    last_change: None,
                    offline_since: observed.is_offline().then_some(now),
                },
            );
            return Observation::Synchronized;
        };

        if state.current == observed {
            return Observation::Unchanged;
        }

        let previous = state.current;
        let was_offline = previous.is_offline();
        let is_now_offline = observed.is_offline();
        let back_online = was_offline && observed == TerminalStatus::Online;
        let gone_offline = previous == TerminalStatus::Online && is_now_offline;

        let offline_duration = if back_online {
            state
                .offline_since
                .map(|since| format_offline_duration(now.0.saturating_sub(since.0)))
        } else {
            None
        };

        state.previous = Some(previous);
        state.current = observed;
        state.last_change = Some(now);

        if gone_offline {
            state.offline_since = Some(now);
        } else if back_online {
            state.offline_since = None;
        } else if is_now_offline && state.offline_since.is_none() {
            state.offline_since = Some(now);
        }

        let alert = (gone_offline || back_online).then_some(Alert {
            previous,
            current: observed,
            back_online,
        });

        Observation::Changed(StatusChange {
            record: ChangeRecord {
                terminal_id,
                timestamp: now,
                status: observed,
                offline_duration,
            },
            alert,
        })
    }

    pub fn current_status(&self, terminal_id: i64) -> Option<TerminalStatus> {
        self.states.get(&terminal_id).map(|state| state.current)
    }

    pub fn offline_since(&self, terminal_id: i64) -> Option<TimestampMs> {
        self.states
            .get(&terminal_id)
            .and_then(|state| state.offline_since)
    }

    pub fn last_change(&self, terminal_id: i64) -> Option<TimestampMs> {
        self.states
            .get(&terminal_id)
            .and_then(|state| state.last_change)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::{Clock, Observation, StatusTracker, TimestampMs};
    use crate::domain::status::TerminalStatus;

    struct FakeClock {
        now: Cell<i64>,
    }

    impl FakeClock {
        fn new(start: i64) -> Self {
            Self {
                now: Cell::new(start),
            }
        }

        fn set(&self, value: i64) {
            self.now.set(value);
        }
    }

    impl Clock for FakeClock {
        fn now(&self) -> TimestampMs {
            TimestampMs(self.now.get())
        }
    }

    fn changed(observation: Observation) -> super::StatusChange {
        match observation {
            Observation::Changed(change) => change,
            other => panic!("expected a status change, got {other:?}"),
        }
    }

    #[test]
    fn first_observation_synchronizes_silently() {
        let clock = FakeClock::new(1_000);
        let mut tracker = StatusTracker::new();

        let observation = tracker.observe(42, TerminalStatus::Online, &clock);

        assert_eq!(observation, Observation::Synchronized);
        assert_eq!(tracker.current_status(42), Some(TerminalStatus::Online));
        assert_eq!(tracker.offline_since(42), None);
        assert_eq!(tracker.last_change(42), None);
    }

    #[test]
    fn first_observation_of_offline_terminal_seeds_offline_since() {
        let clock = FakeClock::new(5_000);
        let mut tracker = StatusTracker::new();

        let observation = tracker.observe(42, TerminalStatus::NoPower, &clock);

        assert_eq!(observation, Observation::Synchronized);
        assert_eq!(tracker.offline_since(42), Some(TimestampMs(5_000)));
    }

    #[test]
    fn repeated_status_produces_no_output() {
        let clock = FakeClock::new(1_000);
        let mut tracker = StatusTracker::new();

        tracker.observe(7, TerminalStatus::Online, &clock);
        clock.set(61_000);
        let observation = tracker.observe(7, TerminalStatus::Online, &clock);

        assert_eq!(observation, Observation::Unchanged);
        assert_eq!(tracker.last_change(7), None);
    }

    #[test]
    fn online_to_offline_alerts_and_starts_offline_clock() {
        let clock = FakeClock::new(1_000);
        let mut tracker = StatusTracker::new();
        tracker.observe(7, TerminalStatus::Online, &clock);

        clock.set(61_000);
        let change = changed(tracker.observe(7, TerminalStatus::Offline, &clock));

        assert_eq!(change.record.status, TerminalStatus::Offline);
        assert_eq!(change.record.offline_duration, None);
        let alert = change.alert.expect("gone-offline should alert");
        assert!(!alert.back_online);
        assert_eq!(alert.previous, TerminalStatus::Online);
        assert_eq!(tracker.offline_since(7), Some(TimestampMs(61_000)));
    }

    #[test]
    fn offline_churn_is_logged_but_never_alerted() {
        let clock = FakeClock::new(0);
        let mut tracker = StatusTracker::new();
        tracker.observe(7, TerminalStatus::Online, &clock);

        clock.set(10_000);
        tracker.observe(7, TerminalStatus::Offline, &clock);

        clock.set(20_000);
        let change = changed(tracker.observe(7, TerminalStatus::Inactive, &clock));
        assert_eq!(change.alert, None);
        assert_eq!(change.record.offline_duration, None);

        clock.set(30_000);
        let change = changed(tracker.observe(7, TerminalStatus::Error, &clock));
        assert_eq!(change.alert, None);

        // The offline clock keeps measuring from the original edge.
        assert_eq!(tracker.offline_since(7), Some(TimestampMs(10_000)));
    }

    #[test]
    fn back_online_reports_duration_from_the_original_edge() {
        let clock = FakeClock::new(0);
        let mut tracker = StatusTracker::new();
        tracker.observe(7, TerminalStatus::Online, &clock);

        clock.set(100_000);
        tracker.observe(7, TerminalStatus::Offline, &clock);
        clock.set(400_000);
        tracker.observe(7, TerminalStatus::Inactive, &clock);

        clock.set(100_000 + 3_600_000);
        let change = changed(tracker.observe(7, TerminalStatus::Online, &clock));

        assert_eq!(change.record.offline_duration.as_deref(), Some("1ч"));
        let alert = change.alert.expect("back-online should alert");
        assert!(alert.back_online);
        assert_eq!(alert.previous, TerminalStatus::Inactive);
        assert_eq!(tracker.offline_since(7), None);
    }

    #[test]
    fn back_online_after_synchronized_offline_start_has_duration() {
        let clock = FakeClock::new(50_000);
        let mut tracker = StatusTracker::new();
        tracker.observe(9, TerminalStatus::Error, &clock);

        clock.set(175_000);
        let change = changed(tracker.observe(9, TerminalStatus::Online, &clock));

        assert_eq!(change.record.offline_duration.as_deref(), Some("2м 5с"));
        assert!(change.alert.expect("alert expected").back_online);
    }

    #[test]
    fn offline_since_invariant_holds_over_arbitrary_sequences() {
        let clock = FakeClock::new(0);
        let mut tracker = StatusTracker::new();
        let sequence = [
            TerminalStatus::Online,
            TerminalStatus::Offline,
            TerminalStatus::Inactive,
            TerminalStatus::Online,
            TerminalStatus::Online,
            TerminalStatus::NoPower,
            TerminalStatus::Error,
            TerminalStatus::Offline,
            TerminalStatus::Online,
        ];

        for (index, status) in sequence.into_iter().enumerate() {
            clock.set(index as i64 * 60_000);
            tracker.observe(3, status, &clock);

            let current = tracker.current_status(3).expect("state should exist");
            assert_eq!(
                tracker.offline_since(3).is_some(),
                current.is_offline(),
                "offline_since must track the non-Online stretch (step {index})"
            );
        }
    }

    #[test]
    fn terminals_do_not_interfere() {
        let clock = FakeClock::new(0);
        let mut tracker = StatusTracker::new();
        tracker.observe(1, TerminalStatus::Online, &clock);
        tracker.observe(2, TerminalStatus::Online, &clock);

        clock.set(60_000);
        let change = changed(tracker.observe(1, TerminalStatus::Offline, &clock));
        assert!(change.alert.is_some());

        assert_eq!(tracker.current_status(2), Some(TerminalStatus::Online));
        assert_eq!(tracker.offline_since(2), None);
        assert_eq!(tracker.offline_since(1), Some(TimestampMs(60_000)));
    }
}
