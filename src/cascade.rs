//! External-alarm cascade dispatch.
//!
//! When a parent alarm activates, its configured external alarms each
//! write a value to another point through the platform's point-write
//! interface. The writes are best-effort: a failed target is logged and
//! the rest of the cascade proceeds, and no failure ever reaches back
//! into the parent alarm's own state transition (which has already been
//! committed by the time dispatch runs).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, instrument, warn};

use crate::storage::AlarmStore;
use crate::{AlarmId, ItemId};

/// Point-write interface of the platform (field drivers, control loop).
///
/// `write` returns whether the write was accepted; failures are non-fatal
/// for callers in this crate.
#[async_trait]
pub trait PointWriter: Send + Sync {
    async fn write(
        &self,
        item_id: &ItemId,
        value: &str,
        time: DateTime<Utc>,
        duration_seconds: u32,
    ) -> bool;
}

/// Dispatches cascade writes for activated alarms.
pub struct CascadeDispatcher {
    store: Arc<dyn AlarmStore>,
    writer: Arc<dyn PointWriter>,

    /// How long a cascaded write should be held by the point layer.
    write_duration_seconds: u32,
}

impl CascadeDispatcher {
    pub fn new(store: Arc<dyn AlarmStore>, writer: Arc<dyn PointWriter>) -> Self {
        Self {
            store,
            writer,
            write_duration_seconds: 0,
        }
    }

    pub fn with_write_duration(mut self, seconds: u32) -> Self {
        self.write_duration_seconds = seconds;
        self
    }

    /// Fire the cascade for one activation.
    ///
    /// Reads a consistent snapshot of the parent's external alarms (a
    /// concurrent cascade-rule batch is either fully visible or not at
    /// all), then issues one best-effort write per enabled target.
    /// Invoked once per Activate transition, not once per value sample,
    /// and never on Clear (last-written values stay in place).
    #[instrument(skip(self, time))]
    pub async fn dispatch(&self, alarm_id: AlarmId, time: DateTime<Utc>) {
        let externals = match self.store.list_external_alarms(alarm_id).await {
            Ok(externals) => externals,
            Err(e) => {
                warn!("alarm {alarm_id}: failed to load external alarms, skipping cascade: {e}");
                return;
            }
        };

        let enabled = externals.iter().filter(|e| !e.is_disabled);

        for external in enabled {
            let accepted = self
                .writer
                .write(
                    &external.item_id,
                    &external.value,
                    time,
                    self.write_duration_seconds,
                )
                .await;

            if accepted {
                debug!(
                    "alarm {alarm_id}: cascaded {} -> {}",
                    external.value, external.item_id
                );
            } else {
                warn!(
                    "alarm {alarm_id}: cascade write to {} failed, continuing",
                    external.item_id
                );
            }
        }
    }
}
