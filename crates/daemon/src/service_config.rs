use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use common::prelude::{AccessMode, Address, RebroadcastOptions};

use crate::state::AppState;

#[derive(Debug, Clone)]
pub struct Config {
    // gossip configuration
    /// name used as the sender of our envelopes
    pub node_name: String,
    /// channels we gossip on
    pub channels: Vec<String>,
    /// buckets re-announced on every tick
    pub rebroadcast_buckets: Vec<Address>,
    pub rebroadcast: RebroadcastOptions,
    /// applied to the repo the node is built with
    pub access_mode: AccessMode,

    // loop timing
    pub tick_interval: Duration,
    pub snapshot_interval: Duration,
    /// longest a single receive may block the loop
    pub receive_timeout: Duration,

    // persistence
    /// where snapshots are written, if anywhere
    pub snapshot_path: Option<PathBuf>,

    // logging
    pub log_level: tracing::Level,
    /// Directory for log files (optional, logs to stderr only if not set)
    pub log_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node_name: "swarm".to_string(),
            channels: Vec::new(),
            rebroadcast_buckets: Vec::new(),
            rebroadcast: RebroadcastOptions::default(),
            access_mode: AccessMode::default(),
            tick_interval: Duration::from_secs(5),
            snapshot_interval: Duration::from_secs(60),
            receive_timeout: Duration::from_secs(1),
            snapshot_path: None,
            log_level: tracing::Level::INFO,
            log_dir: None,
        }
    }
}

impl Config {
    pub fn from_app_state(state: &AppState) -> Result<Self, ConfigError> {
        let app = &state.config;
        let log_level = tracing::Level::from_str(&app.log_level)
            .map_err(|_| ConfigError::InvalidLogLevel(app.log_level.clone()))?;
        if app.tick_interval_secs == 0 {
            return Err(ConfigError::ZeroInterval("tick_interval_secs"));
        }
        if app.snapshot_interval_secs == 0 {
            return Err(ConfigError::ZeroInterval("snapshot_interval_secs"));
        }
        Ok(Self {
            node_name: app.node_name.clone(),
            channels: app.channels.clone(),
            rebroadcast_buckets: app.rebroadcast_buckets.clone(),
            rebroadcast: (&app.rebroadcast).into(),
            access_mode: app.access_mode,
            tick_interval: Duration::from_secs(app.tick_interval_secs),
            snapshot_interval: Duration::from_secs(app.snapshot_interval_secs),
            snapshot_path: Some(state.snapshot_path.clone()),
            log_level,
            log_dir: app.log_dir.clone(),
            ..Default::default()
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid log level: {0}")]
    InvalidLogLevel(String),
    #[error("{0} must be greater than zero")]
    ZeroInterval(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AppConfig;

    #[test]
    fn test_from_app_state() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig {
            node_name: "alice".to_string(),
            log_level: "debug".to_string(),
            channels: vec!["lobby".to_string()],
            tick_interval_secs: 2,
            ..Default::default()
        };
        let state = AppState::init(Some(dir.path().join("swarm")), Some(config)).unwrap();

        let service = Config::from_app_state(&state).unwrap();
        assert_eq!(service.node_name, "alice");
        assert_eq!(service.log_level, tracing::Level::DEBUG);
        assert_eq!(service.channels, vec!["lobby".to_string()]);
        assert_eq!(service.tick_interval, Duration::from_secs(2));
        assert_eq!(service.rebroadcast, RebroadcastOptions::default());
        assert_eq!(service.snapshot_path, Some(state.snapshot_path.clone()));
    }

    #[test]
    fn test_rejects_bad_values() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = AppState::init(Some(dir.path().join("swarm")), None).unwrap();

        state.config.log_level = "loud".to_string();
        assert!(matches!(
            Config::from_app_state(&state),
            Err(ConfigError::InvalidLogLevel(_))
        ));

        state.config.log_level = "info".to_string();
        state.config.snapshot_interval_secs = 0;
        assert!(matches!(
            Config::from_app_state(&state),
            Err(ConfigError::ZeroInterval("snapshot_interval_secs"))
        ));
    }
}
