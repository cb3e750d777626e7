//! Message types exchanged between the evaluation actors and their handles.

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::{AlarmDefinition, AlarmId};

/// Commands accepted by an evaluator shard.
#[derive(Debug)]
pub enum EvaluatorCommand {
    /// Install or replace an alarm definition. A disabled definition is
    /// disarmed and, if currently active, cleared on the next tick.
    UpsertDefinition(AlarmDefinition),
    /// Remove an alarm definition. Any active occurrence is cleared.
    RemoveDefinition(AlarmId),
    /// Query the engine state of a single alarm.
    GetState {
        alarm_id: AlarmId,
        respond_to: oneshot::Sender<Option<AlarmEngineState>>,
    },
    /// Drain in-flight work and stop the shard.
    Shutdown {
        respond_to: oneshot::Sender<()>,
    },
}

/// Snapshot of an alarm's in-memory evaluation state, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlarmEngineState {
    /// Result of the most recent raw condition evaluation.
    pub last_raw_result: Option<bool>,
    /// Whether a debounce deadline is currently pending.
    pub debounce_pending: bool,
    /// Whether the engine believes this alarm is active.
    pub is_active: bool,
}

/// Broadcast to subscribers whenever the number of active alarms changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountNotification {
    pub active_alarms_count: usize,
}
