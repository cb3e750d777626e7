use std::sync::Arc;
use std::time::Duration;

use alarmhub::{
    ItemId, PointUpdate,
    actors::evaluator::EvaluatorHandle,
    cascade::{CascadeDispatcher, PointWriter},
    clock::SystemClock,
    config::{Config, EngineConfig, StorageConfig, read_config_file},
    notify::NotificationPublisher,
    storage::AlarmStore,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing::{debug, error, info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short)]
    file: String,
}

fn init() {
    let filter = filter::Targets::new().with_targets(vec![
        ("alarmhub", LevelFilter::TRACE),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

/// Cascaded point writes leave the daemon as NDJSON on stdout, one object
/// per write, for whatever control-plane process is downstream.
struct StdoutPointWriter;

#[async_trait]
impl PointWriter for StdoutPointWriter {
    async fn write(
        &self,
        item_id: &ItemId,
        value: &str,
        time: DateTime<Utc>,
        duration_seconds: u32,
    ) -> bool {
        let line = serde_json::json!({
            "item_id": item_id,
            "value": value,
            "time": time,
            "duration_seconds": duration_seconds,
        });
        println!("{line}");
        true
    }
}

async fn open_store(config: &Config) -> anyhow::Result<Arc<dyn AlarmStore>> {
    match config.storage.clone().unwrap_or(StorageConfig::None) {
        StorageConfig::None => {
            info!("using in-memory storage (no persistence)");
            Ok(Arc::new(alarmhub::storage::MemoryStore::new()))
        }

        #[cfg(feature = "storage-sqlite")]
        StorageConfig::Sqlite { path } => {
            info!("using SQLite storage at {}", path.display());
            let store = alarmhub::storage::SqliteStore::new(&path).await?;
            Ok(Arc::new(store))
        }

        #[cfg(not(feature = "storage-sqlite"))]
        StorageConfig::Sqlite { .. } => {
            anyhow::bail!("built without the storage-sqlite feature")
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = read_config_file(&args.file)?;
    let engine = config.engine.clone().unwrap_or_default();

    let store = open_store(&config).await?;
    let definitions = store.list_definitions().await?;
    info!("loaded {} alarm definitions", definitions.len());

    let publisher = Arc::new(NotificationPublisher::default());
    let cascade = Arc::new(
        CascadeDispatcher::new(store.clone(), Arc::new(StdoutPointWriter))
            .with_write_duration(engine.cascade_write_duration_secs),
    );
    let (update_tx, _keepalive) = broadcast::channel(1024);

    let EngineConfig {
        tick_interval_secs,
        workers,
        ..
    } = engine;
    let handle = EvaluatorHandle::spawn(
        definitions,
        store.clone(),
        publisher.clone(),
        cascade,
        Arc::new(SystemClock),
        &update_tx,
        Duration::from_secs(tick_interval_secs.max(1)),
        workers,
    )
    .await;
    info!("evaluator running with {} shard(s), {tick_interval_secs}s tick", workers.max(1));

    // Count notifications are surfaced as log lines; an API layer would
    // subscribe here instead.
    let mut count_rx = publisher.subscribe();
    tokio::spawn(async move {
        loop {
            match count_rx.recv().await {
                Ok(notification) => {
                    info!("active alarms: {}", notification.active_alarms_count);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("count listener lagged, skipped {skipped} notifications");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    tokio::select! {
        result = feed_from_stdin(update_tx.clone()) => {
            if let Err(e) = result {
                error!("value feed failed: {e}");
            } else {
                info!("value feed ended");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    handle.shutdown().await;
    store.close().await?;
    info!("shut down cleanly");

    Ok(())
}

/// Read NDJSON point updates from stdin and fan them out to the shards.
///
/// Malformed lines are logged and skipped so one bad producer cannot take
/// the feed down.
async fn feed_from_stdin(update_tx: broadcast::Sender<PointUpdate>) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<PointUpdate>(&line) {
            Ok(update) => {
                debug!("feed: {} = {}", update.item_id, update.value);
                if update_tx.send(update).is_err() {
                    warn!("no evaluator shards listening, stopping feed");
                    break;
                }
            }
            Err(e) => {
                warn!("skipping malformed feed line: {e}");
            }
        }
    }

    Ok(())
}
