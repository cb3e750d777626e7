//! Failure path tests
//!
//! Storage faults, broken point writers, and malformed values must never
//! take the evaluation loop down or corrupt the active table.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use alarmhub::{
    ActiveAlarmRecord, AlarmDefinition, AlarmId, CompareType, ExternalAlarm, HistoryEntry, ItemId,
    PointUpdate,
    actors::evaluator::EvaluatorHandle,
    cascade::{CascadeDispatcher, PointWriter},
    clock::SystemClock,
    notify::NotificationPublisher,
    storage::{AlarmStore, HealthStatus, HistoryQuery, MemoryStore, StoreError, StoreResult},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

mod helpers;
use helpers::*;

/// Delegates to a [`MemoryStore`] but fails the first N transition
/// commits, simulating a transiently unavailable database.
struct FlakyStore {
    inner: MemoryStore,
    failures_left: AtomicUsize,
}

impl FlakyStore {
    fn new(failures: usize) -> Self {
        Self {
            inner: MemoryStore::new(),
            failures_left: AtomicUsize::new(failures),
        }
    }

    fn fail_next(&self) -> bool {
        self.failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| {
                left.checked_sub(1)
            })
            .is_ok()
    }
}

#[async_trait]
impl AlarmStore for FlakyStore {
    async fn list_definitions(&self) -> StoreResult<Vec<AlarmDefinition>> {
        self.inner.list_definitions().await
    }

    async fn get_definition(&self, id: AlarmId) -> StoreResult<Option<AlarmDefinition>> {
        self.inner.get_definition(id).await
    }

    async fn add_definition(&self, def: AlarmDefinition) -> StoreResult<AlarmDefinition> {
        self.inner.add_definition(def).await
    }

    async fn edit_definition(&self, def: AlarmDefinition) -> StoreResult<AlarmDefinition> {
        self.inner.edit_definition(def).await
    }

    async fn delete_definition(&self, id: AlarmId) -> StoreResult<()> {
        self.inner.delete_definition(id).await
    }

    async fn list_external_alarms(&self, alarm_id: AlarmId) -> StoreResult<Vec<ExternalAlarm>> {
        self.inner.list_external_alarms(alarm_id).await
    }

    async fn add_external_alarm(&self, external: ExternalAlarm) -> StoreResult<ExternalAlarm> {
        self.inner.add_external_alarm(external).await
    }

    async fn update_external_alarm(&self, external: ExternalAlarm) -> StoreResult<ExternalAlarm> {
        self.inner.update_external_alarm(external).await
    }

    async fn remove_external_alarm(&self, id: i64) -> StoreResult<()> {
        self.inner.remove_external_alarm(id).await
    }

    async fn list_active(&self, item_ids: Option<&[ItemId]>) -> StoreResult<Vec<ActiveAlarmRecord>> {
        self.inner.list_active(item_ids).await
    }

    async fn count_active(&self) -> StoreResult<usize> {
        self.inner.count_active().await
    }

    async fn query_history(&self, query: HistoryQuery) -> StoreResult<Vec<HistoryEntry>> {
        self.inner.query_history(query).await
    }

    async fn commit_activation(
        &self,
        record: ActiveAlarmRecord,
        entry: HistoryEntry,
    ) -> StoreResult<()> {
        if self.fail_next() {
            return Err(StoreError::QueryFailed("simulated outage".to_string()));
        }
        self.inner.commit_activation(record, entry).await
    }

    async fn commit_clear(&self, alarm_id: AlarmId, entry: HistoryEntry) -> StoreResult<bool> {
        if self.fail_next() {
            return Err(StoreError::QueryFailed("simulated outage".to_string()));
        }
        self.inner.commit_clear(alarm_id, entry).await
    }

    async fn health_check(&self) -> StoreResult<HealthStatus> {
        self.inner.health_check().await
    }

    async fn close(&self) -> StoreResult<()> {
        self.inner.close().await
    }
}

/// Returns false for every write, like a dead field bus.
struct RejectingWriter;

#[async_trait]
impl PointWriter for RejectingWriter {
    async fn write(
        &self,
        _item_id: &ItemId,
        _value: &str,
        _time: DateTime<Utc>,
        _duration_seconds: u32,
    ) -> bool {
        false
    }
}

async fn spawn_with_store(
    store: Arc<dyn AlarmStore>,
    writer: Arc<dyn PointWriter>,
    definitions: Vec<AlarmDefinition>,
) -> (EvaluatorHandle, broadcast::Sender<PointUpdate>) {
    let publisher = Arc::new(NotificationPublisher::default());
    let cascade = Arc::new(CascadeDispatcher::new(store.clone(), writer));
    let (update_tx, _keepalive) = broadcast::channel(64);

    let handle = EvaluatorHandle::spawn(
        definitions,
        store,
        publisher,
        cascade,
        Arc::new(SystemClock),
        &update_tx,
        Duration::from_millis(20),
        1,
    )
    .await;

    (handle, update_tx)
}

#[tokio::test]
async fn test_activation_retried_through_transient_store_outage() {
    let store = Arc::new(FlakyStore::new(2));
    let def = store
        .add_definition(comparative_alarm(
            "plant/line1/temp",
            CompareType::Greater,
            "80",
            0,
        ))
        .await
        .unwrap();

    let (handle, update_tx) =
        spawn_with_store(store.clone(), Arc::new(RejectingWriter), vec![def]).await;

    update_tx.send(point("plant/line1/temp", "85")).unwrap();

    // Two failures at 50ms + 100ms backoff, then success
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert_eq!(store.count_active().await.unwrap(), 1);
    assert_eq!(store.failures_left.load(Ordering::SeqCst), 0);

    handle.shutdown().await;
}

#[tokio::test]
async fn test_failed_disable_clear_retried_on_tick() {
    // No failures yet: the activation must commit normally
    let store = Arc::new(FlakyStore::new(0));
    let def = store
        .add_definition(comparative_alarm(
            "plant/line1/temp",
            CompareType::Greater,
            "80",
            0,
        ))
        .await
        .unwrap();

    let (handle, update_tx) =
        spawn_with_store(store.clone(), Arc::new(RejectingWriter), vec![def.clone()]).await;

    update_tx.send(point("plant/line1/temp", "85")).unwrap();
    settle().await;
    assert_eq!(store.count_active().await.unwrap(), 1);

    // Outage long enough to exhaust every commit attempt of the clear
    store.failures_left.store(4, Ordering::SeqCst);

    let mut disabled = def;
    disabled.is_disabled = true;
    store.edit_definition(disabled.clone()).await.unwrap();
    handle.upsert_definition(disabled).await;

    // The disable-path clear burns all 4 attempts against the outage;
    // a disabled definition is never re-evaluated, so only the tick
    // sweep can finish the clear once the store recovers
    tokio::time::sleep(Duration::from_millis(700)).await;

    assert_eq!(store.count_active().await.unwrap(), 0);
    assert_eq!(store.failures_left.load(Ordering::SeqCst), 0);

    handle.shutdown().await;
}

#[tokio::test]
async fn test_rejected_cascade_write_does_not_block_transition() {
    let store = Arc::new(MemoryStore::new());
    let def = store
        .add_definition(comparative_alarm(
            "plant/line1/temp",
            CompareType::Greater,
            "80",
            0,
        ))
        .await
        .unwrap();
    store
        .add_external_alarm(ExternalAlarm {
            id: 0,
            alarm_id: def.id,
            item_id: "plant/line1/fan".to_string(),
            value: "1".to_string(),
            is_disabled: false,
        })
        .await
        .unwrap();

    let (handle, update_tx) =
        spawn_with_store(store.clone(), Arc::new(RejectingWriter), vec![def]).await;

    update_tx.send(point("plant/line1/temp", "85")).unwrap();
    settle().await;

    // The transition committed even though every cascade write bounced
    assert_eq!(store.count_active().await.unwrap(), 1);

    handle.shutdown().await;
}

#[tokio::test]
async fn test_disabled_external_alarms_are_skipped() {
    let engine = spawn_engine(
        vec![comparative_alarm(
            "plant/line1/temp",
            CompareType::Greater,
            "80",
            0,
        )],
        1,
    )
    .await;

    let def = &engine.store.list_definitions().await.unwrap()[0];
    engine
        .store
        .add_external_alarm(ExternalAlarm {
            id: 0,
            alarm_id: def.id,
            item_id: "plant/line1/fan".to_string(),
            value: "1".to_string(),
            is_disabled: true,
        })
        .await
        .unwrap();
    engine
        .store
        .add_external_alarm(ExternalAlarm {
            id: 0,
            alarm_id: def.id,
            item_id: "plant/line1/valve".to_string(),
            value: "0".to_string(),
            is_disabled: false,
        })
        .await
        .unwrap();

    engine.update_tx.send(point("plant/line1/temp", "85")).unwrap();
    settle().await;

    let writes = engine.writer.writes.lock().unwrap().clone();
    assert_eq!(
        writes,
        vec![("plant/line1/valve".to_string(), "0".to_string())]
    );

    engine.handle.shutdown().await;
}

#[tokio::test]
async fn test_malformed_value_fails_safe_and_engine_recovers() {
    let engine = spawn_engine(
        vec![comparative_alarm(
            "plant/line1/temp",
            CompareType::Greater,
            "80",
            0,
        )],
        1,
    )
    .await;

    engine
        .update_tx
        .send(point("plant/line1/temp", "not-a-number"))
        .unwrap();
    settle().await;
    assert_eq!(engine.store.count_active().await.unwrap(), 0);

    // A later well-formed value still activates
    engine.update_tx.send(point("plant/line1/temp", "85")).unwrap();
    settle().await;
    assert_eq!(engine.store.count_active().await.unwrap(), 1);

    engine.handle.shutdown().await;
}
