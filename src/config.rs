use crate::{
    domain::{BoardConfig, BoardId},
    error::{HlaviError, Result},
};
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, path::Path, time::Duration};
use tokio::fs;

/// Runtime configuration for the board service and sync hub
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Board used when a request does not name one
    pub default_board: BoardId,
    pub board: BoardConfig,
    /// Upper bound on waiting for partition locks
    pub lock_timeout_ms: u64,
    /// Upper bound on any single store call
    pub store_timeout_ms: u64,
    /// Events buffered per subscriber before it starts lagging
    pub broadcast_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_board: BoardId::default(),
            board: BoardConfig::default(),
            lock_timeout_ms: 5_000,
            store_timeout_ms: 5_000,
            broadcast_capacity: 256,
        }
    }
}

impl Config {
    /// Loads and validates a JSON configuration file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).await.map_err(|e| {
            HlaviError::ConfigError(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: Config = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.lock_timeout_ms == 0 || self.store_timeout_ms == 0 {
            return Err(HlaviError::ConfigError(
                "timeouts must be greater than zero".to_string(),
            ));
        }
        if self.broadcast_capacity == 0 {
            return Err(HlaviError::ConfigError(
                "broadcast_capacity must be greater than zero".to_string(),
            ));
        }
        if self.default_board.as_str().trim().is_empty() {
            return Err(HlaviError::ConfigError(
                "default_board must not be empty".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for column in &self.board.columns {
            if column.id.is_empty() {
                return Err(HlaviError::ConfigError(
                    "column ids must not be empty".to_string(),
                ));
            }
            if !seen.insert(&column.id) {
                return Err(HlaviError::ConfigError(format!(
                    "duplicate column id '{}'",
                    column.id
                )));
            }
        }
        Ok(())
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}
