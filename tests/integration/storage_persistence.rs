//! SQLite persistence tests
//!
//! The in-file backend must survive a close/reopen cycle with definitions,
//! the active table, and the history ledger intact, and the engine must
//! run against it exactly like against the in-memory store.

use std::sync::Arc;
use std::time::Duration;

use alarmhub::{
    CompareType, ExternalAlarm,
    actors::evaluator::EvaluatorHandle,
    cascade::CascadeDispatcher,
    clock::SystemClock,
    notify::NotificationPublisher,
    storage::{AlarmStore, HistoryQuery, SqliteStore},
};
use chrono::Utc;
use tokio::sync::broadcast;

mod helpers;
use helpers::*;

#[tokio::test]
async fn test_definitions_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("alarms.db");

    {
        let store = SqliteStore::new(&db_path).await.unwrap();
        store
            .add_definition(comparative_alarm(
                "plant/line1/temp",
                CompareType::Greater,
                "80",
                5,
            ))
            .await
            .unwrap();
        store.add_definition(timeout_alarm("plant/line1/heartbeat", 30)).await.unwrap();
        store.close().await.unwrap();
    }

    let store = SqliteStore::new(&db_path).await.unwrap();
    let defs = store.list_definitions().await.unwrap();
    assert_eq!(defs.len(), 2);
    assert_eq!(defs[0].item_id, "plant/line1/temp");
    store.close().await.unwrap();
}

#[tokio::test]
async fn test_active_table_and_ledger_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("alarms.db");
    let alarm_id;

    {
        let store = Arc::new(SqliteStore::new(&db_path).await.unwrap());
        let def = store
            .add_definition(comparative_alarm(
                "plant/line1/temp",
                CompareType::Greater,
                "80",
                0,
            ))
            .await
            .unwrap();
        alarm_id = def.id;

        let publisher = Arc::new(NotificationPublisher::default());
        let writer = Arc::new(RecordingWriter::default());
        let cascade = Arc::new(CascadeDispatcher::new(store.clone(), writer));
        let (update_tx, _keepalive) = broadcast::channel(16);

        let handle = EvaluatorHandle::spawn(
            vec![def],
            store.clone(),
            publisher,
            cascade,
            Arc::new(SystemClock),
            &update_tx,
            Duration::from_millis(20),
            1,
        )
        .await;

        update_tx.send(point("plant/line1/temp", "85")).unwrap();
        settle().await;
        assert_eq!(store.count_active().await.unwrap(), 1);

        handle.shutdown().await;
        store.close().await.unwrap();
    }

    // A fresh process sees the committed state
    let store = SqliteStore::new(&db_path).await.unwrap();

    let active = store.list_active(None).await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].alarm_id, alarm_id);

    let history = store
        .query_history(HistoryQuery {
            start: Utc::now() - chrono::Duration::minutes(5),
            end: Utc::now() + chrono::Duration::minutes(5),
            item_ids: None,
            page: 1,
            page_size: 100,
        })
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert!(history[0].is_active);
    assert_eq!(history[0].context.observed_value, "85");

    store.close().await.unwrap();
}

#[tokio::test]
async fn test_history_outlives_definition_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("alarms.db");

    let store = SqliteStore::new(&db_path).await.unwrap();
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

    let record = alarmhub::ActiveAlarmRecord {
        id: 0,
        alarm_id: def.id,
        item_id: def.item_id.clone(),
        activated_at: Utc::now(),
    };
    let entry = alarmhub::HistoryEntry {
        id: 0,
        alarm_id: def.id,
        item_id: def.item_id.clone(),
        time: Utc::now(),
        is_active: true,
        context: alarmhub::TransitionContext {
            observed_value: "85".to_string(),
            threshold: def.rule.threshold_text(),
            satisfied: true,
        },
    };
    store.commit_activation(record, entry).await.unwrap();

    store.delete_definition(def.id).await.unwrap();

    // Definition, externals, and active row are gone; the ledger stays
    assert!(store.get_definition(def.id).await.unwrap().is_none());
    assert!(store.list_external_alarms(def.id).await.unwrap().is_empty());
    assert_eq!(store.count_active().await.unwrap(), 0);

    let history = store
        .query_history(HistoryQuery {
            start: Utc::now() - chrono::Duration::minutes(5),
            end: Utc::now() + chrono::Duration::minutes(5),
            item_ids: None,
            page: 1,
            page_size: 100,
        })
        .await
        .unwrap();
    assert_eq!(history.len(), 1);

    store.close().await.unwrap();
}
