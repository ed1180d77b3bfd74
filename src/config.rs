use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

use crate::error::{CoreError, CoreResult};

pub const DEFAULT_GRID_WIDTH: usize = 32;
/// Widest grid accepted; anything larger is a misconfiguration for a sensor mat.
pub const MAX_GRID_WIDTH: usize = 256;

/// Startup inputs supplied by the embedding application.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct CoreConfig {
    /// Directory holding the pre-recorded dataset files.
    pub catalog_dir: PathBuf,
    pub dataset_extension: String,
    pub database_path: PathBuf,
    pub grid_width: usize,
    pub field_delimiter: char,
    pub read_timeout_ms: u64,
    /// History change gate: a capture is skipped when peak, contact area and
    /// average all moved by less than this.
    pub change_epsilon: f64,
    pub datasets_per_subject: usize,
    pub replay_fps: f64,
    pub refresh_ms: u64,
    pub preview_frame_limit: usize,
    pub alert_list_limit: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            catalog_dir: PathBuf::from("datasets"),
            dataset_extension: "csv".into(),
            database_path: PathBuf::from("pressuretrace.sqlite3"),
            grid_width: DEFAULT_GRID_WIDTH,
            field_delimiter: ',',
            read_timeout_ms: 5_000,
            change_epsilon: 1.0,
            datasets_per_subject: 3,
            replay_fps: 15.0,
            refresh_ms: 3_000,
            preview_frame_limit: 10,
            alert_list_limit: 5,
        }
    }
}

impl CoreConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.grid_width == 0 || self.grid_width > MAX_GRID_WIDTH {
            return Err(CoreError::InvalidConfig(format!(
                "gridWidth must be between 1 and {MAX_GRID_WIDTH}, got {}",
                self.grid_width
            )));
        }
        if !self.change_epsilon.is_finite() || self.change_epsilon < 0.0 {
            return Err(CoreError::InvalidConfig(format!(
                "changeEpsilon must be a non-negative number, got {}",
                self.change_epsilon
            )));
        }
        if !self.replay_fps.is_finite() || self.replay_fps <= 0.0 {
            return Err(CoreError::InvalidConfig(format!(
                "replayFps must be positive, got {}",
                self.replay_fps
            )));
        }
        if self.read_timeout_ms == 0 {
            return Err(CoreError::InvalidConfig("readTimeoutMs must be positive".into()));
        }
        Ok(())
    }
}

/// JSON-file backed holder for [`CoreConfig`].
pub struct ConfigStore {
    path: PathBuf,
    data: RwLock<CoreConfig>,
}

impl ConfigStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config at {}", path.display()))?
        } else {
            CoreConfig::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn current(&self) -> CoreConfig {
        self.read_guard().clone()
    }

    pub fn update(&self, config: CoreConfig) -> CoreResult<()> {
        config.validate()?;
        let mut guard = self.write_guard();
        *guard = config;
        self.persist(&guard)?;
        Ok(())
    }

    fn persist(&self, data: &CoreConfig) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write config to {}", self.path.display()))
    }

    fn read_guard(&self) -> RwLockReadGuard<'_, CoreConfig> {
        match self.data.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, CoreConfig> {
        match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("core.json")).unwrap();
        let config = store.current();
        assert_eq!(config.grid_width, 32);
        assert_eq!(config.datasets_per_subject, 3);
        assert_eq!(config.change_epsilon, 1.0);
    }

    #[test]
    fn partial_file_fills_remaining_fields_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("core.json");
        fs::write(&path, r#"{ "catalogDir": "/data/mats", "refreshMs": 1000 }"#).unwrap();

        let config = ConfigStore::new(path).unwrap().current();
        assert_eq!(config.catalog_dir, PathBuf::from("/data/mats"));
        assert_eq!(config.refresh_ms, 1000);
        assert_eq!(config.field_delimiter, ',');
    }

    #[test]
    fn update_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("core.json");
        let store = ConfigStore::new(path.clone()).unwrap();

        let mut config = store.current();
        config.datasets_per_subject = 5;
        store.update(config).unwrap();

        let reloaded = ConfigStore::new(path).unwrap().current();
        assert_eq!(reloaded.datasets_per_subject, 5);
    }

    #[test]
    fn validate_rejects_zero_width() {
        let config = CoreConfig {
            grid_width: 0,
            ..CoreConfig::default()
        };
        assert!(matches!(config.validate(), Err(CoreError::InvalidConfig(_))));
    }

    #[test]
    fn validate_rejects_oversized_width() {
        for grid_width in [MAX_GRID_WIDTH + 1, 1 << 20, usize::MAX] {
            let config = CoreConfig {
                grid_width,
                ..CoreConfig::default()
            };
            assert!(matches!(config.validate(), Err(CoreError::InvalidConfig(_))));
        }

        let widest = CoreConfig {
            grid_width: MAX_GRID_WIDTH,
            ..CoreConfig::default()
        };
        assert!(widest.validate().is_ok());
    }

    #[test]
    fn update_refuses_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("core.json")).unwrap();
        let config = CoreConfig {
            change_epsilon: f64::NAN,
            ..CoreConfig::default()
        };
        assert!(store.update(config).is_err());
        assert_eq!(store.current().change_epsilon, 1.0);
    }
}
