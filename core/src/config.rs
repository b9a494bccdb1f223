use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use tracing::debug;

const DEFAULT_COMPACT_AFTER: u64 = 1_024;
const DEFAULT_VECTOR_WEIGHT: f64 = 0.6;
const DEFAULT_GRAPH_WEIGHT: f64 = 0.4;
const DEFAULT_TOP_K: usize = 5;

/// How mutations reach disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PersistMode {
    /// Nothing is written unless the caller checkpoints explicitly.
    #[default]
    Manual,
    /// Every mutation rewrites the full snapshot before returning.
    Snapshot,
    /// Every mutation appends one log record; the snapshot is rewritten
    /// and the log truncated every `compact_after` records.
    WriteAhead,
}

/// What to do when the snapshot or log exists but cannot be read at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LoadFailurePolicy {
    #[default]
    Fail,
    /// Start with an empty graph. Whatever was on disk is lost on the next write.
    StartEmpty,
}

/// What to do when persisting fails after the in-memory mutation succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PersistFailurePolicy {
    /// Return the error to the caller. The in-memory mutation stays applied.
    #[default]
    Propagate,
    LogOnly,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct StorageConfig {
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,
    #[serde(default)]
    pub wal_path: Option<PathBuf>,
    #[serde(default)]
    pub persist_mode: PersistMode,
    #[serde(default = "default_compact_after")]
    pub compact_after: u64,
    #[serde(default)]
    pub load_failure: LoadFailurePolicy,
    #[serde(default)]
    pub persist_failure: PersistFailurePolicy,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct FusionDefaults {
    #[serde(default = "default_vector_weight")]
    pub vector_weight: f64,
    #[serde(default = "default_graph_weight")]
    pub graph_weight: f64,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub fusion: FusionDefaults,
}

impl StorageConfig {
    /// Purely in-memory store; nothing is read or written.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Rewrite the snapshot at `path` on every mutation.
    pub fn snapshot(path: impl Into<PathBuf>) -> Self {
        Self {
            snapshot_path: Some(path.into()),
            persist_mode: PersistMode::Snapshot,
            ..Self::default()
        }
    }

    /// Log every mutation to `wal_path` and compact into `snapshot_path`.
    pub fn write_ahead(snapshot_path: impl Into<PathBuf>, wal_path: impl Into<PathBuf>) -> Self {
        Self {
            snapshot_path: Some(snapshot_path.into()),
            wal_path: Some(wal_path.into()),
            persist_mode: PersistMode::WriteAhead,
            ..Self::default()
        }
    }

    pub fn with_snapshot_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot_path = Some(path.into());
        self
    }

    pub fn with_compact_after(mut self, records: u64) -> Self {
        self.compact_after = records.max(1);
        self
    }

    pub fn with_load_failure(mut self, policy: LoadFailurePolicy) -> Self {
        self.load_failure = policy;
        self
    }

    pub fn with_persist_failure(mut self, policy: PersistFailurePolicy) -> Self {
        self.persist_failure = policy;
        self
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            snapshot_path: None,
            wal_path: None,
            persist_mode: PersistMode::Manual,
            compact_after: DEFAULT_COMPACT_AFTER,
            load_failure: LoadFailurePolicy::Fail,
            persist_failure: PersistFailurePolicy::Propagate,
        }
    }
}

impl Default for FusionDefaults {
    fn default() -> Self {
        Self {
            vector_weight: DEFAULT_VECTOR_WEIGHT,
            graph_weight: DEFAULT_GRAPH_WEIGHT,
            top_k: DEFAULT_TOP_K,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Layer `<dir>/default`, `<dir>/<RUN_MODE>` (optional) and `HYBRIDGRAPH__*` env vars.
    pub fn load_from(dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let dir = dir.as_ref();
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .add_source(File::with_name(&dir.join("default").to_string_lossy()))
            .add_source(
                File::with_name(&dir.join(&run_mode).to_string_lossy()).required(false),
            )
            .add_source(Environment::with_prefix("HYBRIDGRAPH").separator("__"));

        let config: Self = builder.build()?.try_deserialize()?;
        debug!(
            "Loaded configuration from {} (RUN_MODE={})",
            dir.display(),
            run_mode
        );
        Ok(config)
    }
}

const fn default_compact_after() -> u64 {
    DEFAULT_COMPACT_AFTER
}

const fn default_vector_weight() -> f64 {
    DEFAULT_VECTOR_WEIGHT
}

const fn default_graph_weight() -> f64 {
    DEFAULT_GRAPH_WEIGHT
}

const fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn load_reads_storage_section_and_fills_defaults() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("default.toml"),
            r#"
[storage]
persist_mode = "write_ahead"
snapshot_path = "data/graph.json"
wal_path = "data/graph.wal"
load_failure = "start_empty"

[fusion]
top_k = 10
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(dir.path()).unwrap();

        assert_eq!(config.storage.persist_mode, PersistMode::WriteAhead);
        assert_eq!(
            config.storage.snapshot_path,
            Some(PathBuf::from("data/graph.json"))
        );
        assert_eq!(config.storage.load_failure, LoadFailurePolicy::StartEmpty);
        assert_eq!(config.storage.persist_failure, PersistFailurePolicy::Propagate);
        assert_eq!(config.storage.compact_after, DEFAULT_COMPACT_AFTER);
        assert_eq!(config.fusion.top_k, 10);
        assert_eq!(config.fusion.vector_weight, DEFAULT_VECTOR_WEIGHT);
    }

    #[test]
    fn load_fails_without_default_file() {
        let dir = tempdir().unwrap();
        assert!(AppConfig::load_from(dir.path()).is_err());
    }

    #[test]
    fn builders_set_mode_and_paths() {
        let config = StorageConfig::write_ahead("g.json", "g.wal").with_compact_after(0);
        assert_eq!(config.persist_mode, PersistMode::WriteAhead);
        assert_eq!(config.compact_after, 1);
        assert_eq!(StorageConfig::in_memory().persist_mode, PersistMode::Manual);
    }
}
