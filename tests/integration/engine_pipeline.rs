//! End-to-end engine tests
//!
//! These run real spawned shards against in-memory storage with a fast
//! tick, feeding values through the broadcast channel exactly like the
//! daemon does.

use std::time::Duration;

use alarmhub::{
    CompareType, ExternalAlarm,
    storage::{AlarmStore, HistoryQuery},
};
use chrono::Utc;

mod helpers;
use helpers::*;

#[tokio::test]
async fn test_zero_delay_activation_end_to_end() {
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
    let mut count_rx = engine.publisher.subscribe();

    engine.update_tx.send(point("plant/line1/temp", "85")).unwrap();
    settle().await;

    assert_eq!(engine.store.count_active().await.unwrap(), 1);
    assert_eq!(count_rx.recv().await.unwrap().active_alarms_count, 1);

    let active = engine.store.list_active(None).await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].item_id, "plant/line1/temp");

    engine.handle.shutdown().await;
}

#[tokio::test]
async fn test_debounce_transient_spike_ignored() {
    // 1 second delay against a 20ms tick
    let engine = spawn_engine(
        vec![comparative_alarm(
            "plant/line1/temp",
            CompareType::Greater,
            "80",
            1,
        )],
        1,
    )
    .await;

    engine.update_tx.send(point("plant/line1/temp", "85")).unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    engine.update_tx.send(point("plant/line1/temp", "75")).unwrap();

    // Well past the would-be deadline
    tokio::time::sleep(Duration::from_millis(1200)).await;

    assert_eq!(engine.store.count_active().await.unwrap(), 0);
    let history = engine
        .store
        .query_history(recent_history_query())
        .await
        .unwrap();
    assert!(history.is_empty(), "transient spike must leave no trace");

    engine.handle.shutdown().await;
}

#[tokio::test]
async fn test_debounce_sustained_condition_activates_exactly_once() {
    let engine = spawn_engine(
        vec![comparative_alarm(
            "plant/line1/temp",
            CompareType::Greater,
            "80",
            1,
        )],
        1,
    )
    .await;

    engine.update_tx.send(point("plant/line1/temp", "85")).unwrap();
    tokio::time::sleep(Duration::from_millis(1500)).await;

    assert_eq!(engine.store.count_active().await.unwrap(), 1);
    let history = engine
        .store
        .query_history(recent_history_query())
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert!(history[0].is_active);

    engine.handle.shutdown().await;
}

#[tokio::test]
async fn test_timeout_alarm_full_cycle() {
    let engine = spawn_engine(vec![timeout_alarm("plant/line1/heartbeat", 1)], 1).await;

    // Silent past the window
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(engine.store.count_active().await.unwrap(), 1);

    // First value clears
    engine
        .update_tx
        .send(point("plant/line1/heartbeat", "1"))
        .unwrap();
    settle().await;
    assert_eq!(engine.store.count_active().await.unwrap(), 0);

    let history = engine
        .store
        .query_history(recent_history_query())
        .await
        .unwrap();
    assert_eq!(history.len(), 2);
    assert!(!history[0].is_active);
    assert!(history[1].is_active);

    engine.handle.shutdown().await;
}

#[tokio::test]
async fn test_cascade_writes_fire_on_activation() {
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

    let defs = engine.store.list_definitions().await.unwrap();
    engine
        .store
        .add_external_alarm(ExternalAlarm {
            id: 0,
            alarm_id: defs[0].id,
            item_id: "plant/line1/fan".to_string(),
            value: "1".to_string(),
            is_disabled: false,
        })
        .await
        .unwrap();

    engine.update_tx.send(point("plant/line1/temp", "85")).unwrap();
    // Further true values while active must not re-fire the cascade
    engine.update_tx.send(point("plant/line1/temp", "90")).unwrap();
    settle().await;

    let writes = engine.writer.writes.lock().unwrap().clone();
    assert_eq!(
        writes,
        vec![("plant/line1/fan".to_string(), "1".to_string())]
    );

    engine.handle.shutdown().await;
}

#[tokio::test]
async fn test_runtime_upsert_and_remove() {
    let engine = spawn_engine(vec![], 1).await;

    // Install a definition through the handle at runtime
    let def = engine
        .store
        .add_definition(comparative_alarm(
            "plant/line2/pressure",
            CompareType::GreaterOrEqual,
            "10",
            0,
        ))
        .await
        .unwrap();
    engine.handle.upsert_definition(def.clone()).await;
    settle().await;

    engine
        .update_tx
        .send(point("plant/line2/pressure", "12"))
        .unwrap();
    settle().await;
    assert_eq!(engine.store.count_active().await.unwrap(), 1);

    // Removal clears the active occurrence and stops evaluation. The
    // engine hears about it first so the Clear lands in the ledger before
    // the row disappears.
    engine.handle.remove_definition(def.id).await;
    settle().await;
    engine.store.delete_definition(def.id).await.unwrap();
    assert_eq!(engine.store.count_active().await.unwrap(), 0);

    engine
        .update_tx
        .send(point("plant/line2/pressure", "99"))
        .unwrap();
    settle().await;
    assert_eq!(engine.store.count_active().await.unwrap(), 0);

    engine.handle.shutdown().await;
}

#[tokio::test]
async fn test_delete_and_readd_is_independent() {
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

    let old = engine.store.list_definitions().await.unwrap().remove(0);

    engine.update_tx.send(point("plant/line1/temp", "85")).unwrap();
    settle().await;
    assert_eq!(engine.store.count_active().await.unwrap(), 1);

    engine.handle.remove_definition(old.id).await;
    settle().await;
    engine.store.delete_definition(old.id).await.unwrap();

    // Old ledger entries survive the definition
    let history = engine
        .store
        .query_history(recent_history_query())
        .await
        .unwrap();
    assert_eq!(history.len(), 2);

    // Re-added rule starts from a blank slate
    let fresh = engine
        .store
        .add_definition(comparative_alarm(
            "plant/line1/temp",
            CompareType::Greater,
            "80",
            0,
        ))
        .await
        .unwrap();
    assert_ne!(fresh.id, old.id);
    engine.handle.upsert_definition(fresh).await;
    settle().await;

    engine.update_tx.send(point("plant/line1/temp", "90")).unwrap();
    settle().await;
    assert_eq!(engine.store.count_active().await.unwrap(), 1);

    engine.handle.shutdown().await;
}

#[tokio::test]
async fn test_count_notifications_deduplicated() {
    let engine = spawn_engine(
        vec![
            comparative_alarm("a", CompareType::Greater, "1", 0),
            comparative_alarm("b", CompareType::Greater, "1", 0),
        ],
        1,
    )
    .await;
    let mut count_rx = engine.publisher.subscribe();

    engine.update_tx.send(point("a", "5")).unwrap();
    settle().await;
    // Second activation moves the count to 2; repeated true values do not
    // re-publish 1
    engine.update_tx.send(point("a", "6")).unwrap();
    engine.update_tx.send(point("b", "5")).unwrap();
    settle().await;

    assert_eq!(count_rx.recv().await.unwrap().active_alarms_count, 1);
    assert_eq!(count_rx.recv().await.unwrap().active_alarms_count, 2);

    engine.handle.shutdown().await;
}

fn recent_history_query() -> HistoryQuery {
    HistoryQuery {
        start: Utc::now() - chrono::Duration::minutes(5),
        end: Utc::now() + chrono::Duration::minutes(5),
        item_ids: None,
        page: 1,
        page_size: 100,
    }
}
