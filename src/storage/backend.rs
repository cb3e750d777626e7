//! Alarm store trait definition
//!
//! This module defines the core `AlarmStore` trait that all storage
//! implementations must implement: alarm definitions and their cascade
//! rules, the active-alarm table, and the append-only transition history.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{ActiveAlarmRecord, AlarmDefinition, AlarmId, ExternalAlarm, HistoryEntry, ItemId};

use super::error::StoreResult;

/// Server-side cap on history page size.
pub const MAX_HISTORY_PAGE_SIZE: usize = 1000;

/// Query parameters for the history ledger.
///
/// Results are ordered by time descending and paginated; `page` is 1-based
/// and `page_size` is clamped to [`MAX_HISTORY_PAGE_SIZE`].
#[derive(Debug, Clone)]
pub struct HistoryQuery {
    /// Start of time range (inclusive)
    pub start: DateTime<Utc>,

    /// End of time range (inclusive)
    pub end: DateTime<Utc>,

    /// Restrict to these watched items; `None` means all items
    pub item_ids: Option<Vec<ItemId>>,

    /// 1-based page number
    pub page: u32,

    /// Entries per page (clamped server-side)
    pub page_size: usize,
}

impl HistoryQuery {
    /// Effective page size after the server-side cap.
    pub fn effective_page_size(&self) -> usize {
        self.page_size.clamp(1, MAX_HISTORY_PAGE_SIZE)
    }

    /// Number of entries to skip for this page.
    pub fn offset(&self) -> usize {
        let page = self.page.max(1) as usize;
        (page - 1) * self.effective_page_size()
    }
}

/// Health status of the alarm store
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Is the backend operational?
    pub healthy: bool,

    /// Human-readable status message
    pub message: String,
}

/// Durable repository for alarm definitions, cascade rules, the active set
/// and the transition history.
///
/// Implementations must be `Send + Sync` as they are shared across actor
/// tasks behind an `Arc`.
///
/// ## Invariants implementations must uphold
///
/// - Definition writes validate first ([`AlarmDefinition::validate`]) and
///   reject invalid rules with `StoreError::Validation`.
/// - `has_external_alarm` on a stored definition always equals "at least
///   one external alarm exists for it"; every external-alarm mutation
///   maintains it.
/// - Deleting a definition deletes its external alarms and active record
///   but never its history (history outlives the rule for compliance).
/// - At most one active record per alarm id.
/// - `commit_activation` / `commit_clear` couple the active-table mutation
///   with its history entry atomically; a crash can never leave one
///   without the other.
/// - History is append-only: no update or delete operations exist.
/// - External-alarm reads (`list_external_alarms`) observe a consistent
///   snapshot relative to concurrent batch mutations; a cascade dispatch
///   never sees a partially-updated set.
#[async_trait]
pub trait AlarmStore: Send + Sync {
    // ========================================================================
    // Alarm definitions
    // ========================================================================

    /// List all definitions.
    async fn list_definitions(&self) -> StoreResult<Vec<AlarmDefinition>>;

    /// Fetch one definition by id.
    async fn get_definition(&self, id: AlarmId) -> StoreResult<Option<AlarmDefinition>>;

    /// Insert a definition. The `id` field of the argument is ignored; the
    /// stored definition with its assigned id is returned.
    async fn add_definition(&self, def: AlarmDefinition) -> StoreResult<AlarmDefinition>;

    /// Update an existing definition in place. Edits change future
    /// evaluation only; history is never rewritten. The derived
    /// `has_external_alarm` flag is recomputed by the store, not taken from
    /// the caller.
    async fn edit_definition(&self, def: AlarmDefinition) -> StoreResult<AlarmDefinition>;

    /// Delete a definition together with its external alarms and any active
    /// record. History entries referencing the id are retained.
    async fn delete_definition(&self, id: AlarmId) -> StoreResult<()>;

    // ========================================================================
    // External alarms (cascade rules)
    // ========================================================================

    /// List the cascade rules of one parent alarm.
    async fn list_external_alarms(&self, alarm_id: AlarmId) -> StoreResult<Vec<ExternalAlarm>>;

    /// Add a cascade rule. The `id` field of the argument is ignored.
    async fn add_external_alarm(&self, external: ExternalAlarm) -> StoreResult<ExternalAlarm>;

    /// Update a cascade rule in place.
    async fn update_external_alarm(&self, external: ExternalAlarm) -> StoreResult<ExternalAlarm>;

    /// Remove a cascade rule.
    async fn remove_external_alarm(&self, id: i64) -> StoreResult<()>;

    // ========================================================================
    // Active alarm table
    // ========================================================================

    /// List active alarms, optionally filtered by watched item.
    async fn list_active(&self, item_ids: Option<&[ItemId]>)
    -> StoreResult<Vec<ActiveAlarmRecord>>;

    /// Number of currently active alarms.
    async fn count_active(&self) -> StoreResult<usize>;

    // ========================================================================
    // History ledger
    // ========================================================================

    /// Range query over the history ledger, time descending, paginated.
    async fn query_history(&self, query: HistoryQuery) -> StoreResult<Vec<HistoryEntry>>;

    // ========================================================================
    // Transactional transitions
    // ========================================================================

    /// Commit an Activate: insert the active record and append its history
    /// entry in one transaction. The `id` fields of both arguments are
    /// ignored.
    async fn commit_activation(
        &self,
        record: ActiveAlarmRecord,
        entry: HistoryEntry,
    ) -> StoreResult<()>;

    /// Commit a Clear: remove the active record for `alarm_id` and append
    /// the history entry in one transaction. Returns false when no active
    /// record existed (in which case nothing is appended either).
    async fn commit_clear(&self, alarm_id: AlarmId, entry: HistoryEntry) -> StoreResult<bool>;

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Check store health.
    async fn health_check(&self) -> StoreResult<HealthStatus>;

    /// Close the store and release resources.
    async fn close(&self) -> StoreResult<()>;
}
