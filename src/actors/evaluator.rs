//! EvaluatorActor - Runs the alarm state machine over the value feed
//!
//! One actor instance owns one shard of the watched items. Every alarm on
//! an item lives on the shard that owns the item, so per-alarm transitions
//! are evaluated by a single writer and Activate/Clear can never interleave.
//!
//! ## Transition State Machine
//!
//! ```text
//! Comparative alarm:
//!   Inactive, raw flips true, delay == 0  → Activate now
//!   Inactive, raw flips true, delay > 0   → arm debounce candidate
//!   candidate armed, raw flips false      → disarm, nothing happened
//!   candidate due on tick                 → re-verify against latest value,
//!                                           then Activate
//!   Active, raw false                     → Clear immediately (no debounce)
//!   Active, raw true                      → no-op (no duplicate records)
//!
//! Timeout alarm:
//!   now − last_seen > timeout             → Activate (no debounce)
//!   Active, any value arrives             → Clear, baseline resets
//! ```
//!
//! Transitions commit atomically through the store before anything else
//! observes them; the count broadcast and the external-alarm cascade run
//! strictly after the commit, and the cascade is detached so a slow point
//! write never stalls evaluation.

use std::collections::{HashMap, HashSet};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, instrument, trace, warn};

use crate::{
    ActiveAlarmRecord, AlarmDefinition, AlarmId, AlarmRule, HistoryEntry, ItemId, PointUpdate,
    TransitionContext,
    cascade::CascadeDispatcher,
    clock::Clock,
    compare::compare,
    debounce::DebounceScheduler,
    notify::NotificationPublisher,
    storage::AlarmStore,
};

use super::messages::{AlarmEngineState, EvaluatorCommand};

/// How many times a transition commit is attempted before giving up.
const COMMIT_ATTEMPTS: u32 = 4;

/// Initial backoff between commit attempts; doubles per retry.
const COMMIT_BACKOFF: StdDuration = StdDuration::from_millis(50);

/// Shard owning an item, stable across restarts of the same worker count.
pub(crate) fn shard_for(item_id: &str, shards: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    item_id.hash(&mut hasher);
    (hasher.finish() as usize) % shards.max(1)
}

/// Per-alarm in-memory evaluation state.
///
/// Raw results are re-derived from fresh values after a restart; activity
/// is adopted from the persisted active table so a committed record is
/// never stranded by a process boundary.
#[derive(Debug)]
struct EvaluationState {
    /// Item the alarm watches; kept here so a committed record can still
    /// be cleared after its definition is gone.
    item_id: ItemId,

    /// Most recent raw condition result, before debounce.
    last_raw_result: Option<bool>,

    /// Whether an Activate has been committed that has not been cleared
    /// yet.
    is_active: bool,

    /// Floor for the timeout-silence calculation, captured when the
    /// definition is installed. Starting from install time (not the epoch)
    /// keeps a boot or a freshly added watchdog from firing instantly for
    /// items that simply have not spoken yet.
    timeout_baseline: DateTime<Utc>,
}

impl EvaluationState {
    fn new(item_id: ItemId, installed_at: DateTime<Utc>) -> Self {
        Self {
            item_id,
            last_raw_result: None,
            is_active: false,
            timeout_baseline: installed_at,
        }
    }
}

/// Actor that evaluates one shard of alarms against the value feed.
pub struct EvaluatorActor {
    /// Which shard of the item space this actor owns.
    shard: usize,

    /// Total number of shards.
    shards: usize,

    /// Definitions owned by this shard, by alarm id.
    definitions: HashMap<AlarmId, AlarmDefinition>,

    /// Alarms watching each item.
    watchers: HashMap<ItemId, HashSet<AlarmId>>,

    /// Per-alarm evaluation state.
    states: HashMap<AlarmId, EvaluationState>,

    /// Latest value seen per item; doubles as the timeout baseline.
    latest: HashMap<ItemId, PointUpdate>,

    /// Pending delayed-activation candidates.
    debounce: DebounceScheduler,

    store: Arc<dyn AlarmStore>,
    publisher: Arc<NotificationPublisher>,
    cascade: Arc<CascadeDispatcher>,
    clock: Arc<dyn Clock>,

    /// Command receiver
    command_rx: mpsc::Receiver<EvaluatorCommand>,

    /// Value feed receiver (broadcast subscription)
    update_rx: broadcast::Receiver<PointUpdate>,

    tick_interval: StdDuration,
}

impl EvaluatorActor {
    #[allow(clippy::too_many_arguments)]
    fn new(
        shard: usize,
        shards: usize,
        store: Arc<dyn AlarmStore>,
        publisher: Arc<NotificationPublisher>,
        cascade: Arc<CascadeDispatcher>,
        clock: Arc<dyn Clock>,
        command_rx: mpsc::Receiver<EvaluatorCommand>,
        update_rx: broadcast::Receiver<PointUpdate>,
        tick_interval: StdDuration,
    ) -> Self {
        Self {
            shard,
            shards,
            definitions: HashMap::new(),
            watchers: HashMap::new(),
            states: HashMap::new(),
            latest: HashMap::new(),
            debounce: DebounceScheduler::new(),
            store,
            publisher,
            cascade,
            clock,
            command_rx,
            update_rx,
            tick_interval,
        }
    }

    fn owns(&self, item_id: &str) -> bool {
        shard_for(item_id, self.shards) == self.shard
    }

    /// Install a definition on this shard.
    ///
    /// Enabled or not, the definition is stored so a later enable does not
    /// need a reload; disabled definitions are simply never evaluated. The
    /// timeout baseline restarts from now on every (re)install.
    fn install(&mut self, def: AlarmDefinition) {
        let now = self.clock.now();
        self.watchers
            .entry(def.item_id.clone())
            .or_default()
            .insert(def.id);
        let state = self
            .states
            .entry(def.id)
            .or_insert_with(|| EvaluationState::new(def.item_id.clone(), now));
        state.item_id = def.item_id.clone();
        state.timeout_baseline = now;
        self.definitions.insert(def.id, def);
    }

    /// Adopt active records committed by a previous run.
    ///
    /// Records with a live, enabled definition resume as Active and clear
    /// through the normal path when their condition turns false. Records
    /// whose definition is gone or disabled are swept by the next tick's
    /// stale reconciliation.
    fn adopt_active(&mut self, records: Vec<ActiveAlarmRecord>) {
        let now = self.clock.now();
        for record in records {
            if !self.owns(&record.item_id) {
                continue;
            }
            debug!(
                "alarm {}: adopting active record from previous run",
                record.alarm_id
            );
            self.states
                .entry(record.alarm_id)
                .or_insert_with(|| EvaluationState::new(record.item_id.clone(), now))
                .is_active = true;
        }
    }

    /// Run the actor's main loop
    #[instrument(skip(self), fields(shard = self.shard))]
    pub async fn run(mut self) {
        debug!("starting evaluator shard");

        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                // Periodic tick: harvest due candidates, check timeouts
                _ = ticker.tick() => {
                    let now = self.clock.now();
                    self.handle_tick(now).await;
                }

                // Receive value updates
                result = self.update_rx.recv() => {
                    match result {
                        Ok(update) => {
                            self.handle_update(update).await;
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!("evaluator shard lagged, skipped {skipped} updates");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            warn!("value feed closed, shutting down");
                            break;
                        }
                    }
                }

                // Handle commands
                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        EvaluatorCommand::UpsertDefinition(def) => {
                            self.handle_upsert(def).await;
                        }

                        EvaluatorCommand::RemoveDefinition(alarm_id) => {
                            self.handle_remove(alarm_id).await;
                        }

                        EvaluatorCommand::GetState { alarm_id, respond_to } => {
                            let _ = respond_to.send(self.engine_state(alarm_id));
                        }

                        EvaluatorCommand::Shutdown { respond_to } => {
                            debug!("received shutdown command");
                            let _ = respond_to.send(());
                            break;
                        }
                    }
                }

                // Command channel closed
                else => {
                    warn!("command channel closed, shutting down");
                    break;
                }
            }
        }

        debug!("evaluator shard stopped");
    }

    /// Evaluate every alarm watching the updated item.
    #[instrument(skip(self, update), fields(item_id = %update.item_id))]
    pub(crate) async fn handle_update(&mut self, update: PointUpdate) {
        if !self.owns(&update.item_id) {
            return;
        }

        self.latest.insert(update.item_id.clone(), update.clone());

        let Some(alarm_ids) = self.watchers.get(&update.item_id) else {
            return;
        };
        let alarm_ids: Vec<AlarmId> = alarm_ids.iter().copied().collect();

        for alarm_id in alarm_ids {
            let Some(def) = self.definitions.get(&alarm_id).cloned() else {
                continue;
            };
            if def.is_disabled {
                continue;
            }

            match &def.rule {
                AlarmRule::Timeout { .. } => {
                    // A live value always satisfies the liveness watchdog.
                    // The baseline reset is implicit in the `latest` cache.
                    if self.is_active(alarm_id) {
                        self.clear(&def, update.value.clone(), update.time).await;
                    }
                }

                AlarmRule::Comparative {
                    compare: op,
                    value1,
                    value2,
                } => {
                    let raw = match compare(*op, &update.value, value1, value2.as_deref()) {
                        Ok(raw) => raw,
                        Err(e) => {
                            // Fail safe: a broken threshold or value never
                            // activates and never poisons other alarms.
                            warn!("alarm {alarm_id}: evaluation fault, treating as false: {e}");
                            false
                        }
                    };

                    trace!(
                        "alarm {alarm_id}: {} vs {} → {raw}",
                        update.value,
                        def.rule.threshold_text()
                    );

                    if raw {
                        if !self.is_active(alarm_id) {
                            if def.delay_seconds == 0 {
                                self.activate(&def, update.value.clone(), update.time).await;
                            } else {
                                let now = self.clock.now();
                                self.debounce.arm(
                                    alarm_id,
                                    now,
                                    Duration::seconds(i64::from(def.delay_seconds)),
                                );
                            }
                        }
                    } else {
                        self.debounce.disarm(alarm_id);
                        if self.is_active(alarm_id) {
                            self.clear(&def, update.value.clone(), update.time).await;
                        }
                    }

                    if let Some(state) = self.states.get_mut(&alarm_id) {
                        state.last_raw_result = Some(raw);
                    }
                }
            }
        }
    }

    /// Harvest due debounce candidates and check timeout liveness.
    pub(crate) async fn handle_tick(&mut self, now: DateTime<Utc>) {
        for alarm_id in self.debounce.due(now) {
            self.fire_candidate(alarm_id, now).await;
        }

        let timeout_ids: Vec<AlarmId> = self
            .definitions
            .values()
            .filter(|d| matches!(d.rule, AlarmRule::Timeout { .. }) && !d.is_disabled)
            .map(|d| d.id)
            .collect();

        for alarm_id in timeout_ids {
            self.check_timeout(alarm_id, now).await;
        }

        self.sweep_stale(now).await;
    }

    /// Clear active records whose definition is gone or disabled.
    ///
    /// Normally the disable/remove handlers clear inline; this sweep
    /// catches what they could not: records adopted from a previous run
    /// and clears whose commit exhausted its retries (a disabled or
    /// removed definition is never re-evaluated, so nothing else would
    /// try again).
    async fn sweep_stale(&mut self, now: DateTime<Utc>) {
        let stale: Vec<AlarmId> = self
            .states
            .iter()
            .filter(|(id, state)| {
                state.is_active && self.definitions.get(*id).is_none_or(|d| d.is_disabled)
            })
            .map(|(id, _)| *id)
            .collect();

        for alarm_id in stale {
            match self.definitions.get(&alarm_id).cloned() {
                Some(def) => {
                    self.clear(&def, "disabled".to_string(), now).await;
                }
                None => {
                    let Some(item_id) = self.states.get(&alarm_id).map(|s| s.item_id.clone())
                    else {
                        continue;
                    };
                    self.clear_entry(alarm_id, item_id, String::new(), "deleted".to_string(), now)
                        .await;
                    if !self.is_active(alarm_id) {
                        self.states.remove(&alarm_id);
                    }
                }
            }
        }
    }

    /// Re-verify and activate a debounce candidate that reached its
    /// deadline.
    ///
    /// Conditions can flip between arming and firing without a disarm ever
    /// reaching us (definition edits), so the rule is re-evaluated against
    /// the latest value and the current definition before committing.
    async fn fire_candidate(&mut self, alarm_id: AlarmId, now: DateTime<Utc>) {
        let Some(def) = self.definitions.get(&alarm_id).cloned() else {
            trace!("alarm {alarm_id}: candidate fired after removal, dropping");
            return;
        };
        if def.is_disabled || self.is_active(alarm_id) {
            return;
        }

        let AlarmRule::Comparative {
            compare: op,
            value1,
            value2,
        } = &def.rule
        else {
            return;
        };

        let Some(latest) = self.latest.get(&def.item_id).cloned() else {
            return;
        };

        let still_true = match compare(*op, &latest.value, value1, value2.as_deref()) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("alarm {alarm_id}: evaluation fault at deadline, treating as false: {e}");
                false
            }
        };
        if still_true {
            self.activate(&def, latest.value, now).await;
        } else {
            trace!("alarm {alarm_id}: condition no longer holds at deadline, dropping candidate");
        }
    }

    /// Activate a timeout alarm whose item has been silent too long.
    async fn check_timeout(&mut self, alarm_id: AlarmId, now: DateTime<Utc>) {
        let Some(def) = self.definitions.get(&alarm_id).cloned() else {
            return;
        };
        let AlarmRule::Timeout { timeout_seconds } = def.rule else {
            return;
        };
        if self.is_active(alarm_id) {
            return;
        }

        let baseline = self
            .states
            .get(&alarm_id)
            .map(|s| s.timeout_baseline)
            .unwrap_or(now);
        let last_seen = self
            .latest
            .get(&def.item_id)
            .map(|u| u.time.max(baseline))
            .unwrap_or(baseline);

        let silence = now - last_seen;
        if silence > Duration::seconds(i64::from(timeout_seconds)) {
            let observed = format!("no update for {}s", silence.num_seconds());
            self.activate(&def, observed, now).await;
        }
    }

    /// Install or replace a definition, clearing any active occurrence if
    /// the new revision is disabled.
    async fn handle_upsert(&mut self, def: AlarmDefinition) {
        if !self.owns(&def.item_id) {
            return;
        }

        // An edit may have moved the alarm to a different item.
        let old_item = self
            .definitions
            .get(&def.id)
            .filter(|old| old.item_id != def.item_id)
            .map(|old| old.item_id.clone());
        if let Some(old_item) = old_item
            && let Some(watchers) = self.watchers.get_mut(&old_item)
        {
            watchers.remove(&def.id);
        }

        // Any pending candidate belongs to the old revision.
        self.debounce.disarm(def.id);
        if let Some(state) = self.states.get_mut(&def.id) {
            state.last_raw_result = None;
        }

        if def.is_disabled && self.is_active(def.id) {
            let now = self.clock.now();
            self.clear(&def, "disabled".to_string(), now).await;
        }

        debug!(
            "alarm {}: definition installed (disabled: {})",
            def.id, def.is_disabled
        );
        self.install(def);
    }

    /// Remove a definition, clearing any active occurrence first.
    async fn handle_remove(&mut self, alarm_id: AlarmId) {
        let Some(def) = self.definitions.get(&alarm_id).cloned() else {
            return;
        };

        self.debounce.disarm(alarm_id);
        if self.is_active(alarm_id) {
            let now = self.clock.now();
            self.clear(&def, "deleted".to_string(), now).await;
        }

        self.definitions.remove(&alarm_id);
        // A clear that exhausted its commit attempts leaves the state
        // behind for the tick sweep to retry.
        if !self.is_active(alarm_id) {
            self.states.remove(&alarm_id);
        }
        if let Some(watchers) = self.watchers.get_mut(&def.item_id) {
            watchers.remove(&alarm_id);
        }
        debug!("alarm {alarm_id}: definition removed");
    }

    fn is_active(&self, alarm_id: AlarmId) -> bool {
        self.states
            .get(&alarm_id)
            .map(|s| s.is_active)
            .unwrap_or(false)
    }

    fn engine_state(&self, alarm_id: AlarmId) -> Option<AlarmEngineState> {
        self.states.get(&alarm_id).map(|state| AlarmEngineState {
            last_raw_result: state.last_raw_result,
            debounce_pending: self.debounce.is_armed(alarm_id),
            is_active: state.is_active,
        })
    }

    /// Commit an Activate transition, then notify and cascade.
    async fn activate(&mut self, def: &AlarmDefinition, observed_value: String, time: DateTime<Utc>) {
        let record = ActiveAlarmRecord {
            id: 0,
            alarm_id: def.id,
            item_id: def.item_id.clone(),
            activated_at: time,
        };
        let entry = HistoryEntry {
            id: 0,
            alarm_id: def.id,
            item_id: def.item_id.clone(),
            time,
            is_active: true,
            context: TransitionContext {
                observed_value,
                threshold: def.rule.threshold_text(),
                satisfied: true,
            },
        };

        let mut backoff = COMMIT_BACKOFF;
        for attempt in 1..=COMMIT_ATTEMPTS {
            match self
                .store
                .commit_activation(record.clone(), entry.clone())
                .await
            {
                Ok(()) => {
                    debug!("alarm {}: activated ({})", def.id, entry.context.observed_value);
                    if let Some(state) = self.states.get_mut(&def.id) {
                        state.is_active = true;
                    }
                    self.publish_count().await;
                    self.spawn_cascade(def.id, time);
                    return;
                }
                Err(e) if attempt < COMMIT_ATTEMPTS => {
                    warn!(
                        "alarm {}: activation commit failed (attempt {attempt}), retrying: {e}",
                        def.id
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                Err(e) => {
                    warn!("alarm {}: activation commit failed, will retry next tick: {e}", def.id);
                    // The condition is still true; a zero-delay candidate
                    // makes the next tick attempt the commit again.
                    self.debounce.arm(def.id, time, Duration::zero());
                }
            }
        }
    }

    /// Commit a Clear transition, then notify.
    async fn clear(&mut self, def: &AlarmDefinition, observed_value: String, time: DateTime<Utc>) {
        self.clear_entry(
            def.id,
            def.item_id.clone(),
            def.rule.threshold_text(),
            observed_value,
            time,
        )
        .await;
    }

    async fn clear_entry(
        &mut self,
        alarm_id: AlarmId,
        item_id: ItemId,
        threshold: String,
        observed_value: String,
        time: DateTime<Utc>,
    ) {
        let entry = HistoryEntry {
            id: 0,
            alarm_id,
            item_id,
            time,
            is_active: false,
            context: TransitionContext {
                observed_value,
                threshold,
                satisfied: false,
            },
        };

        let mut backoff = COMMIT_BACKOFF;
        for attempt in 1..=COMMIT_ATTEMPTS {
            match self.store.commit_clear(alarm_id, entry.clone()).await {
                Ok(was_active) => {
                    if was_active {
                        debug!("alarm {alarm_id}: cleared");
                    } else {
                        trace!("alarm {alarm_id}: clear was a no-op, store had no active record");
                    }
                    if let Some(state) = self.states.get_mut(&alarm_id) {
                        state.is_active = false;
                    }
                    self.publish_count().await;
                    return;
                }
                Err(e) if attempt < COMMIT_ATTEMPTS => {
                    warn!(
                        "alarm {alarm_id}: clear commit failed (attempt {attempt}), retrying: {e}"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                Err(e) => {
                    // Engine keeps the alarm active; the next false value,
                    // or the tick sweep for disabled/removed definitions,
                    // retries the clear.
                    warn!("alarm {alarm_id}: clear commit failed, keeping active: {e}");
                }
            }
        }
    }

    async fn publish_count(&self) {
        match self.store.count_active().await {
            Ok(count) => self.publisher.publish(count),
            Err(e) => warn!("failed to read active alarm count: {e}"),
        }
    }

    /// Cascade runs detached so evaluation never blocks on point writes.
    fn spawn_cascade(&self, alarm_id: AlarmId, time: DateTime<Utc>) {
        let cascade = self.cascade.clone();
        tokio::spawn(async move {
            cascade.dispatch(alarm_id, time).await;
        });
    }
}

/// Handle for controlling the evaluator shards
#[derive(Clone)]
pub struct EvaluatorHandle {
    senders: Vec<mpsc::Sender<EvaluatorCommand>>,
}

impl EvaluatorHandle {
    /// Spawn the evaluator shards
    ///
    /// Active records persisted by a previous run are read back and
    /// adopted by the shard that owns their item, so a restart picks up
    /// exactly where the last process stopped.
    ///
    /// # Arguments
    /// - `definitions`: Initial alarm definitions (each lands on the shard
    ///   that owns its item)
    /// - `update_tx`: Value feed; every shard gets its own subscription
    /// - `tick_interval`: Debounce/timeout harvest period
    /// - `workers`: Number of shards
    #[allow(clippy::too_many_arguments)]
    pub async fn spawn(
        definitions: Vec<AlarmDefinition>,
        store: Arc<dyn AlarmStore>,
        publisher: Arc<NotificationPublisher>,
        cascade: Arc<CascadeDispatcher>,
        clock: Arc<dyn Clock>,
        update_tx: &broadcast::Sender<PointUpdate>,
        tick_interval: StdDuration,
        workers: usize,
    ) -> Self {
        let shards = workers.max(1);

        let active = match store.list_active(None).await {
            Ok(records) => records,
            Err(e) => {
                warn!("failed to read active alarms at startup, adopting none: {e}");
                Vec::new()
            }
        };

        let mut senders = Vec::with_capacity(shards);

        for shard in 0..shards {
            let (cmd_tx, cmd_rx) = mpsc::channel(32);

            let mut actor = EvaluatorActor::new(
                shard,
                shards,
                store.clone(),
                publisher.clone(),
                cascade.clone(),
                clock.clone(),
                cmd_rx,
                update_tx.subscribe(),
                tick_interval,
            );

            for def in definitions.iter() {
                if shard_for(&def.item_id, shards) == shard {
                    actor.install(def.clone());
                }
            }

            let records: Vec<ActiveAlarmRecord> = active
                .iter()
                .filter(|record| shard_for(&record.item_id, shards) == shard)
                .cloned()
                .collect();
            actor.adopt_active(records);

            tokio::spawn(actor.run());
            senders.push(cmd_tx);
        }

        Self { senders }
    }

    /// Install or replace an alarm definition.
    ///
    /// An edit that moves the alarm to a different item can also move it to
    /// a different shard, so every other shard gets a removal for the same
    /// id; shards that never held it ignore that.
    pub async fn upsert_definition(&self, def: AlarmDefinition) {
        let owner = shard_for(&def.item_id, self.senders.len());
        for (shard, sender) in self.senders.iter().enumerate() {
            if shard != owner {
                let _ = sender
                    .send(EvaluatorCommand::RemoveDefinition(def.id))
                    .await;
            }
        }
        let _ = self.senders[owner]
            .send(EvaluatorCommand::UpsertDefinition(def))
            .await;
    }

    /// Remove an alarm definition.
    ///
    /// The owning shard is not derivable from the id alone, so the removal
    /// goes to every shard; non-owners ignore it.
    pub async fn remove_definition(&self, alarm_id: AlarmId) {
        for sender in &self.senders {
            let _ = sender
                .send(EvaluatorCommand::RemoveDefinition(alarm_id))
                .await;
        }
    }

    /// Query the engine state of an alarm, wherever it lives.
    pub async fn get_state(&self, alarm_id: AlarmId) -> Option<AlarmEngineState> {
        for sender in &self.senders {
            let (tx, rx) = oneshot::channel();
            if sender
                .send(EvaluatorCommand::GetState {
                    alarm_id,
                    respond_to: tx,
                })
                .await
                .is_err()
            {
                continue;
            }
            if let Ok(Some(state)) = rx.await {
                return Some(state);
            }
        }
        None
    }

    /// Shut down every shard and wait for each to acknowledge.
    pub async fn shutdown(&self) {
        for sender in &self.senders {
            let (tx, rx) = oneshot::channel();
            if sender
                .send(EvaluatorCommand::Shutdown { respond_to: tx })
                .await
                .is_ok()
            {
                let _ = rx.await;
            }
        }
    }
}
