use std::{fs, path::PathBuf};

use common::prelude::{
    AccessMode, Address, DistributedRepo, FileSnapshotStore, RebroadcastOptions, SnapshotError,
    DEFAULT_SCHEMA,
};
use serde::{Deserialize, Serialize};

pub const APP_NAME: &str = "swarm";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const SNAPSHOT_FILE_NAME: &str = "snapshot.bin";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Name this node announces itself with
    #[serde(default = "default_node_name")]
    pub node_name: String,
    /// Default tracing directive; RUST_LOG still wins
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Directory for daily rolling log files (stderr only if not set)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
    /// Channels to gossip on
    #[serde(default)]
    pub channels: Vec<String>,
    /// Buckets re-announced on every tick
    #[serde(default = "default_rebroadcast_buckets")]
    pub rebroadcast_buckets: Vec<Address>,
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
    #[serde(default = "default_snapshot_interval_secs")]
    pub snapshot_interval_secs: u64,
    /// How endorsers are matched against bucket access lists
    #[serde(default)]
    pub access_mode: AccessMode,
    #[serde(default)]
    pub rebroadcast: RebroadcastConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebroadcastConfig {
    #[serde(default = "default_min_delta_secs")]
    pub min_delta_secs: f64,
    #[serde(default = "default_min_silence_secs")]
    pub min_silence_secs: f64,
    #[serde(default = "default_max_n")]
    pub max_n: usize,
}

fn default_node_name() -> String {
    APP_NAME.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_rebroadcast_buckets() -> Vec<Address> {
    DEFAULT_SCHEMA
        .iter()
        .map(|(name, _)| Address::root().child(*name))
        .collect()
}

fn default_tick_interval_secs() -> u64 {
    5
}

fn default_snapshot_interval_secs() -> u64 {
    60
}

fn default_min_delta_secs() -> f64 {
    RebroadcastOptions::default().min_delta
}

fn default_min_silence_secs() -> f64 {
    RebroadcastOptions::default().min_silence
}

fn default_max_n() -> usize {
    RebroadcastOptions::default().max_n
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_name: default_node_name(),
            log_level: default_log_level(),
            log_dir: None,
            channels: Vec::new(),
            rebroadcast_buckets: default_rebroadcast_buckets(),
            tick_interval_secs: default_tick_interval_secs(),
            snapshot_interval_secs: default_snapshot_interval_secs(),
            access_mode: AccessMode::default(),
            rebroadcast: RebroadcastConfig::default(),
        }
    }
}

impl Default for RebroadcastConfig {
    fn default() -> Self {
        Self {
            min_delta_secs: default_min_delta_secs(),
            min_silence_secs: default_min_silence_secs(),
            max_n: default_max_n(),
        }
    }
}

impl From<&RebroadcastConfig> for RebroadcastOptions {
    fn from(config: &RebroadcastConfig) -> Self {
        Self {
            min_delta: config.min_delta_secs,
            min_silence: config.min_silence_secs,
            max_n: config.max_n,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    /// Path to the swarm directory (~/.swarm)
    pub swarm_dir: PathBuf,
    /// Path to the replicated state snapshot
    pub snapshot_path: PathBuf,
    /// Path to the config file
    pub config_path: PathBuf,
    /// Loaded configuration
    pub config: AppConfig,
}

impl AppState {
    /// Get the swarm directory path (custom or default ~/.swarm)
    pub fn swarm_dir(custom_path: Option<PathBuf>) -> Result<PathBuf, StateError> {
        if let Some(path) = custom_path {
            return Ok(path);
        }

        let home = dirs::home_dir().ok_or(StateError::NoHomeDirectory)?;
        Ok(home.join(format!(".{}", APP_NAME)))
    }

    /// Initialize a new swarm state directory with an empty,
    ///  schema-only snapshot
    pub fn init(
        custom_path: Option<PathBuf>,
        config: Option<AppConfig>,
    ) -> Result<Self, StateError> {
        let swarm_dir = Self::swarm_dir(custom_path)?;

        if swarm_dir.exists() {
            return Err(StateError::AlreadyInitialized);
        }

        fs::create_dir_all(&swarm_dir)?;

        let config = config.unwrap_or_default();
        let config_path = swarm_dir.join(CONFIG_FILE_NAME);
        let config_toml = toml::to_string_pretty(&config)?;
        fs::write(&config_path, config_toml)?;

        let state = Self {
            snapshot_path: swarm_dir.join(SNAPSHOT_FILE_NAME),
            swarm_dir,
            config_path,
            config,
        };

        let mut repo = DistributedRepo::new().with_access_mode(state.config.access_mode);
        repo.init_default_schema();
        state.save_repo(&repo)?;

        Ok(state)
    }

    /// Load existing state from the swarm directory
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, StateError> {
        let swarm_dir = Self::swarm_dir(custom_path)?;

        if !swarm_dir.exists() {
            return Err(StateError::NotInitialized);
        }

        let snapshot_path = swarm_dir.join(SNAPSHOT_FILE_NAME);
        let config_path = swarm_dir.join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            return Err(StateError::MissingFile(CONFIG_FILE_NAME.to_string()));
        }

        let config_toml = fs::read_to_string(&config_path)?;
        let config: AppConfig = toml::from_str(&config_toml)?;

        Ok(Self {
            swarm_dir,
            snapshot_path,
            config_path,
            config,
        })
    }

    pub fn snapshot_store(&self) -> FileSnapshotStore {
        FileSnapshotStore::new(&self.snapshot_path)
    }

    /// The replicated state as last saved, with the default schema
    ///  installed on top. A missing or stale snapshot yields an
    ///  empty repo.
    pub fn open_repo(&self) -> Result<DistributedRepo, StateError> {
        let mut repo = DistributedRepo::new().with_access_mode(self.config.access_mode);
        repo.load_from(&self.snapshot_store())?;
        repo.init_default_schema();
        Ok(repo)
    }

    pub fn save_repo(&self, repo: &DistributedRepo) -> Result<(), StateError> {
        repo.save_to(&self.snapshot_store())?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("swarm directory not initialized. Run 'swarm init' first")]
    NotInitialized,

    #[error("swarm directory already initialized")]
    AlreadyInitialized,

    #[error("no home directory found")]
    NoHomeDirectory,

    #[error("missing required file: {0}")]
    MissingFile(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}
