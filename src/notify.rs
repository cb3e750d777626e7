//! Active-alarm count broadcasting.
//!
//! Whenever the active table changes size the evaluator publishes the new
//! total here, and every subscriber (API layer, dashboards) receives it.
//! The broadcast is a best-effort, low-latency hint: a missed message does
//! not affect correctness since an `ActiveAlarms` query always reflects
//! true state.

use std::sync::Mutex;

use tokio::sync::broadcast;
use tracing::trace;

use crate::actors::messages::CountNotification;

/// Broadcasts the active-alarm count to subscribed clients on change.
pub struct NotificationPublisher {
    sender: broadcast::Sender<CountNotification>,

    /// Last broadcast count; unchanged totals are suppressed.
    last_count: Mutex<Option<usize>>,
}

impl NotificationPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            last_count: Mutex::new(None),
        }
    }

    /// Subscribe to count notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<CountNotification> {
        self.sender.subscribe()
    }

    /// Publish a new total. Fire-and-forget: send errors (no subscribers)
    /// are ignored, and a total equal to the last broadcast one is
    /// suppressed.
    pub fn publish(&self, active_alarms_count: usize) {
        let mut last = self.last_count.lock().unwrap();
        if *last == Some(active_alarms_count) {
            return;
        }
        *last = Some(active_alarms_count);

        trace!("broadcasting active alarm count: {active_alarms_count}");
        let _ = self.sender.send(CountNotification {
            active_alarms_count,
        });
    }

    /// Number of connected subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for NotificationPublisher {
    fn default() -> Self {
        Self::new(64)
    }
}
