use std::path::PathBuf;
use std::time::Duration;
use serde::{Deserialize, Serialize};

/// Writer tuning knobs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TuningProfile {
    pub merge_factor: usize,        // Segments allowed before a merge
    pub max_buffered_docs: usize,   // Documents buffered before a segment flush
}

impl TuningProfile {
    pub fn incremental() -> Self {
        TuningProfile {
            merge_factor: 10,
            max_buffered_docs: 100,
        }
    }

    pub fn batch() -> Self {
        TuningProfile {
            merge_factor: 50,
            max_buffered_docs: 5000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage_root: PathBuf,
    pub storage_id: String,

    pub pool_size: usize,                  // Normal (always fresh) reader pool
    pub aging_pool_size: usize,            // Reader pool tolerating staleness
    pub aging_max_staleness_secs: i64,     // <= 0 refreshes on every borrow

    pub force_unlock_on_open: bool,        // Remove a stale engine lock file at open
    pub commits_per_optimize: u32,         // 0 disables periodic optimize

    pub incremental: TuningProfile,
    pub batch: TuningProfile,

    pub shutdown_lock_timeout_secs: u64,
}

impl Config {
    pub fn new(storage_root: impl Into<PathBuf>, storage_id: impl Into<String>) -> Self {
        Config {
            storage_root: storage_root.into(),
            storage_id: storage_id.into(),
            ..Config::default()
        }
    }

    /// `<storage_root>/<storage_id>`
    pub fn index_path(&self) -> PathBuf {
        self.storage_root.join(&self.storage_id)
    }

    pub fn shutdown_lock_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_lock_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            storage_root: PathBuf::from("./data"),
            storage_id: "property_index".to_string(),
            pool_size: 4,
            aging_pool_size: 2,
            aging_max_staleness_secs: 60,
            force_unlock_on_open: false,
            commits_per_optimize: 0,
            incremental: TuningProfile::incremental(),
            batch: TuningProfile::batch(),
            shutdown_lock_timeout_secs: 30,
        }
    }
}
