//! Delayed-activation candidates for debounced alarms.
//!
//! When a comparative condition flips false → true the evaluator does not
//! activate immediately; it arms a candidate here with the configured delay.
//! If the condition flips back before the deadline the candidate is
//! disarmed and nothing happened. Candidates that survive until their
//! deadline are harvested by [`DebounceScheduler::due`] on the evaluator's
//! periodic tick and re-verified before activation.
//!
//! The scheduler is deliberately a plain data structure polled with an
//! injected timestamp rather than one timer task per alarm: candidates stay
//! fully deterministic under a manual clock, and a process restart starts
//! from an empty scheduler (no in-flight debounce survives a crash).

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use tracing::trace;

use crate::AlarmId;

/// Per-alarm delayed-activation timers.
#[derive(Debug, Default)]
pub struct DebounceScheduler {
    deadlines: HashMap<AlarmId, DateTime<Utc>>,
}

impl DebounceScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a candidate to fire at `now + delay`.
    ///
    /// Re-arming an already armed candidate is a no-op; the original
    /// deadline stands so a flapping-but-true condition cannot push the
    /// activation out indefinitely.
    pub fn arm(&mut self, alarm_id: AlarmId, now: DateTime<Utc>, delay: Duration) {
        let deadline = now + delay;
        let entry = self.deadlines.entry(alarm_id).or_insert(deadline);
        trace!("alarm {alarm_id}: candidate armed for {entry}");
    }

    /// Cancel a pending candidate. No-op when nothing is armed.
    pub fn disarm(&mut self, alarm_id: AlarmId) {
        if self.deadlines.remove(&alarm_id).is_some() {
            trace!("alarm {alarm_id}: candidate disarmed");
        }
    }

    pub fn is_armed(&self, alarm_id: AlarmId) -> bool {
        self.deadlines.contains_key(&alarm_id)
    }

    /// Remove and return every candidate whose deadline has passed.
    pub fn due(&mut self, now: DateTime<Utc>) -> Vec<AlarmId> {
        let fired: Vec<AlarmId> = self
            .deadlines
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(alarm_id, _)| *alarm_id)
            .collect();

        for alarm_id in &fired {
            self.deadlines.remove(alarm_id);
        }

        fired
    }

    /// Drop all candidates.
    pub fn clear(&mut self) {
        self.deadlines.clear();
    }

    pub fn len(&self) -> usize {
        self.deadlines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }
}
