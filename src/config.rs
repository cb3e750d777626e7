use std::path::PathBuf;

use tracing::trace;

/// Storage backend configuration
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (no persistence)
    #[serde(rename = "none")]
    None,

    /// SQLite database (default for most deployments)
    Sqlite {
        /// Path to the SQLite database file
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Sqlite {
            path: default_sqlite_path(),
        }
    }
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./alarms.db")
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    /// Engine tuning (optional - sensible defaults)
    pub engine: Option<EngineConfig>,

    /// Storage configuration (optional - defaults to in-memory)
    pub storage: Option<StorageConfig>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct EngineConfig {
    /// Debounce/timeout harvest period in seconds
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,

    /// Number of evaluator shards (items are hash-routed across them)
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Hold duration passed along with cascaded point writes, in seconds
    #[serde(default)]
    pub cascade_write_duration_secs: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval_secs(),
            workers: default_workers(),
            cascade_write_duration_secs: 0,
        }
    }
}

fn default_tick_interval_secs() -> u64 {
    1
}

fn default_workers() -> usize {
    1
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    serde_json::from_str(&file_content)
        .map_err(|_| anyhow::anyhow!("Invalid configuration file provided!"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}
