//! In-memory alarm store (no persistence)
//!
//! Keeps everything behind one `RwLock`, which gives the same atomicity
//! guarantees the SQLite backend gets from transactions: a transition
//! commit and a cascade-rule batch are each applied under a single write
//! lock, so readers always observe a consistent snapshot.
//!
//! Used for tests and for deployments that accept losing the active set
//! and history on restart.

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::{ActiveAlarmRecord, AlarmDefinition, AlarmId, ExternalAlarm, HistoryEntry, ItemId};

use super::backend::{AlarmStore, HealthStatus, HistoryQuery};
use super::error::{StoreError, StoreResult};

#[derive(Debug, Default)]
struct Tables {
    definitions: Vec<AlarmDefinition>,
    external_alarms: Vec<ExternalAlarm>,
    active: Vec<ActiveAlarmRecord>,
    history: Vec<HistoryEntry>,
    next_id: i64,
}

impl Tables {
    fn assign_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn recompute_has_external(&mut self, alarm_id: AlarmId) {
        let has_any = self.external_alarms.iter().any(|e| e.alarm_id == alarm_id);
        if let Some(def) = self.definitions.iter_mut().find(|d| d.id == alarm_id) {
            def.has_external_alarm = has_any;
        }
    }
}

/// In-memory alarm store
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AlarmStore for MemoryStore {
    async fn list_definitions(&self) -> StoreResult<Vec<AlarmDefinition>> {
        Ok(self.tables.read().await.definitions.clone())
    }

    async fn get_definition(&self, id: AlarmId) -> StoreResult<Option<AlarmDefinition>> {
        Ok(self
            .tables
            .read()
            .await
            .definitions
            .iter()
            .find(|d| d.id == id)
            .cloned())
    }

    async fn add_definition(&self, mut def: AlarmDefinition) -> StoreResult<AlarmDefinition> {
        def.validate()?;

        let mut tables = self.tables.write().await;
        def.id = tables.assign_id();
        def.has_external_alarm = false;
        tables.definitions.push(def.clone());
        Ok(def)
    }

    async fn edit_definition(&self, def: AlarmDefinition) -> StoreResult<AlarmDefinition> {
        def.validate()?;

        let mut tables = self.tables.write().await;
        let has_external = tables
            .external_alarms
            .iter()
            .any(|e| e.alarm_id == def.id);

        let Some(stored) = tables.definitions.iter_mut().find(|d| d.id == def.id) else {
            return Err(StoreError::DefinitionNotFound(def.id));
        };

        *stored = AlarmDefinition {
            has_external_alarm: has_external,
            ..def
        };
        Ok(stored.clone())
    }

    async fn delete_definition(&self, id: AlarmId) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.definitions.iter().any(|d| d.id == id) {
            return Err(StoreError::DefinitionNotFound(id));
        }

        // cascade rules and active record go with the parent; history stays
        tables.definitions.retain(|d| d.id != id);
        tables.external_alarms.retain(|e| e.alarm_id != id);
        tables.active.retain(|a| a.alarm_id != id);
        Ok(())
    }

    async fn list_external_alarms(&self, alarm_id: AlarmId) -> StoreResult<Vec<ExternalAlarm>> {
        Ok(self
            .tables
            .read()
            .await
            .external_alarms
            .iter()
            .filter(|e| e.alarm_id == alarm_id)
            .cloned()
            .collect())
    }

    async fn add_external_alarm(&self, mut external: ExternalAlarm) -> StoreResult<ExternalAlarm> {
        let mut tables = self.tables.write().await;
        if !tables.definitions.iter().any(|d| d.id == external.alarm_id) {
            return Err(StoreError::DefinitionNotFound(external.alarm_id));
        }

        external.id = tables.assign_id();
        tables.external_alarms.push(external.clone());
        tables.recompute_has_external(external.alarm_id);
        Ok(external)
    }

    async fn update_external_alarm(&self, external: ExternalAlarm) -> StoreResult<ExternalAlarm> {
        let mut tables = self.tables.write().await;
        let Some(stored) = tables
            .external_alarms
            .iter_mut()
            .find(|e| e.id == external.id)
        else {
            return Err(StoreError::ExternalAlarmNotFound(external.id));
        };

        *stored = external.clone();
        Ok(external)
    }

    async fn remove_external_alarm(&self, id: i64) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let Some(index) = tables.external_alarms.iter().position(|e| e.id == id) else {
            return Err(StoreError::ExternalAlarmNotFound(id));
        };

        let removed = tables.external_alarms.remove(index);
        tables.recompute_has_external(removed.alarm_id);
        Ok(())
    }

    async fn list_active(
        &self,
        item_ids: Option<&[ItemId]>,
    ) -> StoreResult<Vec<ActiveAlarmRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .active
            .iter()
            .filter(|a| match item_ids {
                Some(items) => items.contains(&a.item_id),
                None => true,
            })
            .cloned()
            .collect())
    }

    async fn count_active(&self) -> StoreResult<usize> {
        Ok(self.tables.read().await.active.len())
    }

    async fn query_history(&self, query: HistoryQuery) -> StoreResult<Vec<HistoryEntry>> {
        let page_size = query.effective_page_size();
        let offset = query.offset();

        let tables = self.tables.read().await;
        let mut matching: Vec<HistoryEntry> = tables
            .history
            .iter()
            .filter(|h| h.time >= query.start && h.time <= query.end)
            .filter(|h| match &query.item_ids {
                Some(items) => items.contains(&h.item_id),
                None => true,
            })
            .cloned()
            .collect();

        matching.sort_by(|a, b| b.time.cmp(&a.time).then(b.id.cmp(&a.id)));

        Ok(matching.into_iter().skip(offset).take(page_size).collect())
    }

    async fn commit_activation(
        &self,
        mut record: ActiveAlarmRecord,
        mut entry: HistoryEntry,
    ) -> StoreResult<()> {
        let mut tables = self.tables.write().await;

        // level-triggered: at most one active record per alarm
        if tables.active.iter().any(|a| a.alarm_id == record.alarm_id) {
            return Ok(());
        }

        record.id = tables.assign_id();
        entry.id = tables.assign_id();
        tables.active.push(record);
        tables.history.push(entry);
        Ok(())
    }

    async fn commit_clear(&self, alarm_id: AlarmId, mut entry: HistoryEntry) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;

        let Some(index) = tables.active.iter().position(|a| a.alarm_id == alarm_id) else {
            return Ok(false);
        };

        tables.active.remove(index);
        entry.id = tables.assign_id();
        tables.history.push(entry);
        Ok(true)
    }

    async fn health_check(&self) -> StoreResult<HealthStatus> {
        let tables = self.tables.read().await;
        Ok(HealthStatus {
            healthy: true,
            message: format!(
                "in-memory store operational ({} definitions, {} active, {} history entries)",
                tables.definitions.len(),
                tables.active.len(),
                tables.history.len()
            ),
        })
    }

    async fn close(&self) -> StoreResult<()> {
        debug!("closing in-memory store (no-op)");
        Ok(())
    }
}
