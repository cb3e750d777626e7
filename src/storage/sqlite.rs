//! SQLite alarm store implementation
//!
//! - **Embedded**: no separate database server required
//! - **WAL mode**: better concurrency for reads during writes
//! - **Connection pooling**: efficient resource usage
//! - **Migrations**: automatic schema versioning with sqlx
//!
//! Transition commits (`commit_activation` / `commit_clear`) run inside a
//! transaction so an active-table mutation and its history entry are
//! written atomically. The derived `has_external_alarm` flag is computed
//! with an EXISTS subquery at read time, so it can never drift from the
//! external_alarms table.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, instrument, warn};

use crate::{
    ActiveAlarmRecord, AlarmDefinition, AlarmId, AlarmKind, AlarmRule, CompareType, ExternalAlarm,
    HistoryEntry, ItemId, Priority, TransitionContext,
};

use super::backend::{AlarmStore, HealthStatus, HistoryQuery};
use super::error::{StoreError, StoreResult};

const DEFINITION_COLUMNS: &str = "id, item_id, kind, compare_type, value1, value2, \
     timeout_seconds, delay_seconds, priority, message, message_localized, is_disabled, \
     EXISTS(SELECT 1 FROM external_alarms e WHERE e.alarm_id = alarm_definitions.id) \
     AS has_external_alarm";

/// SQLite alarm store
pub struct SqliteStore {
    pool: Pool<Sqlite>,
    db_path: String,
}

impl SqliteStore {
    /// Open (creating if missing) an alarm database and run migrations.
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>) -> StoreResult<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();

        info!("initializing SQLite alarm store at: {}", db_path_str);

        let options = SqliteConnectOptions::new()
            .filename(&db_path_str)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;

        debug!("running database migrations");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::MigrationFailed(e.to_string()))?;

        info!("alarm store ready");

        Ok(Self {
            pool,
            db_path: db_path_str,
        })
    }

    fn timestamp_to_millis(dt: &DateTime<Utc>) -> i64 {
        dt.timestamp_millis()
    }

    fn millis_to_timestamp(millis: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
    }

    fn decode_definition(row: &SqliteRow) -> StoreResult<AlarmDefinition> {
        let kind_code: i64 = row.get("kind");
        let kind = AlarmKind::try_from(kind_code as u8)
            .map_err(StoreError::SerializationError)?;

        let rule = match kind {
            AlarmKind::Comparative => {
                let compare_code: Option<i64> = row.get("compare_type");
                let compare_code = compare_code.ok_or_else(|| {
                    StoreError::SerializationError(
                        "comparative definition without compare_type".to_string(),
                    )
                })?;
                let compare = CompareType::try_from(compare_code as u8)
                    .map_err(StoreError::SerializationError)?;

                AlarmRule::Comparative {
                    compare,
                    value1: row.get::<Option<String>, _>("value1").unwrap_or_default(),
                    value2: row.get("value2"),
                }
            }
            AlarmKind::Timeout => {
                let timeout: Option<i64> = row.get("timeout_seconds");
                AlarmRule::Timeout {
                    timeout_seconds: timeout.unwrap_or(0) as u32,
                }
            }
        };

        let priority_code: i64 = row.get("priority");
        let priority = Priority::try_from(priority_code as u8)
            .map_err(StoreError::SerializationError)?;

        Ok(AlarmDefinition {
            id: row.get("id"),
            item_id: row.get("item_id"),
            rule,
            delay_seconds: row.get::<i64, _>("delay_seconds") as u32,
            priority,
            message: row.get("message"),
            message_localized: row.get("message_localized"),
            is_disabled: row.get("is_disabled"),
            has_external_alarm: row.get("has_external_alarm"),
        })
    }

    fn decode_external(row: &SqliteRow) -> ExternalAlarm {
        ExternalAlarm {
            id: row.get("id"),
            alarm_id: row.get("alarm_id"),
            item_id: row.get("item_id"),
            value: row.get("value"),
            is_disabled: row.get("is_disabled"),
        }
    }

    fn decode_history(row: &SqliteRow) -> StoreResult<HistoryEntry> {
        let context_json: String = row.get("context");
        let context: TransitionContext = serde_json::from_str(&context_json).map_err(|e| {
            StoreError::SerializationError(format!("failed to deserialize context: {}", e))
        })?;

        Ok(HistoryEntry {
            id: row.get("id"),
            alarm_id: row.get("alarm_id"),
            item_id: row.get("item_id"),
            time: Self::millis_to_timestamp(row.get("time")),
            is_active: row.get("is_active"),
            context,
        })
    }

    /// Split the rule into the nullable kind-dependent columns.
    fn rule_columns(
        rule: &AlarmRule,
    ) -> (u8, Option<u8>, Option<&str>, Option<&str>, Option<i64>) {
        match rule {
            AlarmRule::Comparative {
                compare,
                value1,
                value2,
            } => (
                AlarmKind::Comparative.into(),
                Some((*compare).into()),
                Some(value1.as_str()),
                value2.as_deref(),
                None,
            ),
            AlarmRule::Timeout { timeout_seconds } => (
                AlarmKind::Timeout.into(),
                None,
                None,
                None,
                Some(*timeout_seconds as i64),
            ),
        }
    }
}

#[async_trait]
impl AlarmStore for SqliteStore {
    #[instrument(skip(self))]
    async fn list_definitions(&self) -> StoreResult<Vec<AlarmDefinition>> {
        let sql = format!("SELECT {DEFINITION_COLUMNS} FROM alarm_definitions ORDER BY id");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        rows.iter().map(Self::decode_definition).collect()
    }

    #[instrument(skip(self))]
    async fn get_definition(&self, id: AlarmId) -> StoreResult<Option<AlarmDefinition>> {
        let sql = format!("SELECT {DEFINITION_COLUMNS} FROM alarm_definitions WHERE id = ?");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;

        row.as_ref().map(Self::decode_definition).transpose()
    }

    #[instrument(skip(self, def), fields(item_id = %def.item_id))]
    async fn add_definition(&self, def: AlarmDefinition) -> StoreResult<AlarmDefinition> {
        def.validate()?;

        let (kind, compare, value1, value2, timeout) = Self::rule_columns(&def.rule);

        let result = sqlx::query(
            r#"
            INSERT INTO alarm_definitions (
                item_id, kind, compare_type, value1, value2, timeout_seconds,
                delay_seconds, priority, message, message_localized, is_disabled
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&def.item_id)
        .bind(kind)
        .bind(compare)
        .bind(value1)
        .bind(value2)
        .bind(timeout)
        .bind(def.delay_seconds as i64)
        .bind(u8::from(def.priority))
        .bind(&def.message)
        .bind(&def.message_localized)
        .bind(def.is_disabled)
        .execute(&self.pool)
        .await?;

        Ok(AlarmDefinition {
            id: result.last_insert_rowid(),
            has_external_alarm: false,
            ..def
        })
    }

    #[instrument(skip(self, def), fields(alarm_id = def.id))]
    async fn edit_definition(&self, def: AlarmDefinition) -> StoreResult<AlarmDefinition> {
        def.validate()?;

        let (kind, compare, value1, value2, timeout) = Self::rule_columns(&def.rule);

        let result = sqlx::query(
            r#"
            UPDATE alarm_definitions SET
                item_id = ?, kind = ?, compare_type = ?, value1 = ?, value2 = ?,
                timeout_seconds = ?, delay_seconds = ?, priority = ?,
                message = ?, message_localized = ?, is_disabled = ?
            WHERE id = ?
            "#,
        )
        .bind(&def.item_id)
        .bind(kind)
        .bind(compare)
        .bind(value1)
        .bind(value2)
        .bind(timeout)
        .bind(def.delay_seconds as i64)
        .bind(u8::from(def.priority))
        .bind(&def.message)
        .bind(&def.message_localized)
        .bind(def.is_disabled)
        .bind(def.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::DefinitionNotFound(def.id));
        }

        self.get_definition(def.id)
            .await?
            .ok_or(StoreError::DefinitionNotFound(def.id))
    }

    #[instrument(skip(self))]
    async fn delete_definition(&self, id: AlarmId) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        // external_alarms go via ON DELETE CASCADE; history is retained
        let result = sqlx::query("DELETE FROM alarm_definitions WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::DefinitionNotFound(id));
        }

        sqlx::query("DELETE FROM active_alarms WHERE alarm_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_external_alarms(&self, alarm_id: AlarmId) -> StoreResult<Vec<ExternalAlarm>> {
        let rows = sqlx::query(
            "SELECT id, alarm_id, item_id, value, is_disabled \
             FROM external_alarms WHERE alarm_id = ? ORDER BY id",
        )
        .bind(alarm_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(Self::decode_external).collect())
    }

    #[instrument(skip(self, external), fields(alarm_id = external.alarm_id))]
    async fn add_external_alarm(&self, external: ExternalAlarm) -> StoreResult<ExternalAlarm> {
        let exists: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM alarm_definitions WHERE id = ?")
                .bind(external.alarm_id)
                .fetch_optional(&self.pool)
                .await?;
        if exists.is_none() {
            return Err(StoreError::DefinitionNotFound(external.alarm_id));
        }

        let result = sqlx::query(
            "INSERT INTO external_alarms (alarm_id, item_id, value, is_disabled) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(external.alarm_id)
        .bind(&external.item_id)
        .bind(&external.value)
        .bind(external.is_disabled)
        .execute(&self.pool)
        .await?;

        Ok(ExternalAlarm {
            id: result.last_insert_rowid(),
            ..external
        })
    }

    #[instrument(skip(self, external), fields(id = external.id))]
    async fn update_external_alarm(&self, external: ExternalAlarm) -> StoreResult<ExternalAlarm> {
        let result = sqlx::query(
            "UPDATE external_alarms SET item_id = ?, value = ?, is_disabled = ? WHERE id = ?",
        )
        .bind(&external.item_id)
        .bind(&external.value)
        .bind(external.is_disabled)
        .bind(external.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::ExternalAlarmNotFound(external.id));
        }

        Ok(external)
    }

    #[instrument(skip(self))]
    async fn remove_external_alarm(&self, id: i64) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM external_alarms WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::ExternalAlarmNotFound(id));
        }

        Ok(())
    }

    #[instrument(skip(self, item_ids))]
    async fn list_active(
        &self,
        item_ids: Option<&[ItemId]>,
    ) -> StoreResult<Vec<ActiveAlarmRecord>> {
        let base = "SELECT id, alarm_id, item_id, activated_at FROM active_alarms";

        let rows = match item_ids {
            Some(items) if !items.is_empty() => {
                let placeholders = vec!["?"; items.len()].join(", ");
                let sql = format!(
                    "{base} WHERE item_id IN ({placeholders}) ORDER BY activated_at DESC"
                );
                let mut query = sqlx::query(&sql);
                for item in items {
                    query = query.bind(item);
                }
                query.fetch_all(&self.pool).await?
            }
            Some(_) => Vec::new(),
            None => {
                let sql = format!("{base} ORDER BY activated_at DESC");
                sqlx::query(&sql).fetch_all(&self.pool).await?
            }
        };

        Ok(rows
            .iter()
            .map(|row| ActiveAlarmRecord {
                id: row.get("id"),
                alarm_id: row.get("alarm_id"),
                item_id: row.get("item_id"),
                activated_at: Self::millis_to_timestamp(row.get("activated_at")),
            })
            .collect())
    }

    async fn count_active(&self) -> StoreResult<usize> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM active_alarms")
            .fetch_one(&self.pool)
            .await?;

        Ok(row.0 as usize)
    }

    #[instrument(skip(self, query), fields(page = query.page))]
    async fn query_history(&self, query: HistoryQuery) -> StoreResult<Vec<HistoryEntry>> {
        let page_size = query.effective_page_size();
        let offset = query.offset();

        let start_millis = Self::timestamp_to_millis(&query.start);
        let end_millis = Self::timestamp_to_millis(&query.end);

        let item_filter = match &query.item_ids {
            Some(items) if !items.is_empty() => {
                let placeholders = vec!["?"; items.len()].join(", ");
                format!("AND item_id IN ({placeholders})")
            }
            Some(_) => return Ok(Vec::new()),
            None => String::new(),
        };

        let sql = format!(
            r#"
            SELECT id, alarm_id, item_id, time, is_active, context
            FROM alarm_history
            WHERE time >= ? AND time <= ? {item_filter}
            ORDER BY time DESC, id DESC
            LIMIT ? OFFSET ?
            "#,
        );

        let mut db_query = sqlx::query(&sql).bind(start_millis).bind(end_millis);
        if let Some(items) = &query.item_ids {
            for item in items {
                db_query = db_query.bind(item);
            }
        }
        db_query = db_query.bind(page_size as i64).bind(offset as i64);

        let rows = db_query.fetch_all(&self.pool).await?;
        rows.iter().map(Self::decode_history).collect()
    }

    #[instrument(skip(self, record, entry), fields(alarm_id = record.alarm_id))]
    async fn commit_activation(
        &self,
        record: ActiveAlarmRecord,
        entry: HistoryEntry,
    ) -> StoreResult<()> {
        let context_json = serde_json::to_string(&entry.context).map_err(|e| {
            StoreError::SerializationError(format!("failed to serialize context: {}", e))
        })?;

        let mut tx = self.pool.begin().await?;

        // level-triggered: the UNIQUE constraint keeps one row per alarm
        let result = sqlx::query(
            "INSERT OR IGNORE INTO active_alarms (alarm_id, item_id, activated_at) \
             VALUES (?, ?, ?)",
        )
        .bind(record.alarm_id)
        .bind(&record.item_id)
        .bind(Self::timestamp_to_millis(&record.activated_at))
        .execute(&mut *tx)
        .await?;

        // already active: suppress the duplicate history row too
        if result.rows_affected() == 0 {
            warn!(
                "alarm {} already active, suppressing duplicate activation",
                record.alarm_id
            );
            return Ok(());
        }

        sqlx::query(
            "INSERT INTO alarm_history (alarm_id, item_id, time, is_active, context) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(entry.alarm_id)
        .bind(&entry.item_id)
        .bind(Self::timestamp_to_millis(&entry.time))
        .bind(entry.is_active)
        .bind(context_json)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self, entry))]
    async fn commit_clear(&self, alarm_id: AlarmId, entry: HistoryEntry) -> StoreResult<bool> {
        let context_json = serde_json::to_string(&entry.context).map_err(|e| {
            StoreError::SerializationError(format!("failed to serialize context: {}", e))
        })?;

        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("DELETE FROM active_alarms WHERE alarm_id = ?")
            .bind(alarm_id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        sqlx::query(
            "INSERT INTO alarm_history (alarm_id, item_id, time, is_active, context) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(entry.alarm_id)
        .bind(&entry.item_id)
        .bind(Self::timestamp_to_millis(&entry.time))
        .bind(entry.is_active)
        .bind(context_json)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> StoreResult<HealthStatus> {
        match sqlx::query("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => Ok(HealthStatus {
                healthy: true,
                message: format!("SQLite alarm store operational ({})", self.db_path),
            }),
            Err(e) => {
                warn!("health check failed: {}", e);
                Ok(HealthStatus {
                    healthy: false,
                    message: format!("health check failed: {}", e),
                })
            }
        }
    }

    async fn close(&self) -> StoreResult<()> {
        info!("closing SQLite alarm store");
        self.pool.close().await;
        Ok(())
    }
}
