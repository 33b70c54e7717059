use crate::error::{KeyStatsError, Result};
use serde::{Deserialize, Serialize};
use std::{
    env,
    path::{Path, PathBuf},
    time::Duration,
};

const ENV_CONFIG_FILE: &str = "KEYSTATS_CONFIG";
const ENV_DATA_FILE: &str = "KEYSTATS_DATA_FILE";

const DEFAULT_DATA_FILE: &str = "./data/keyboard_log.json";
const BACKUP_DIR_NAME: &str = "backup";

// Smallest window that still holds a trigram.
const MIN_SEQUENCE_WINDOW: usize = 3;

/// Runtime options consulted by the store, the save scheduler and the recorder.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub save: SaveConfig,
    pub analysis: AnalysisConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_file: PathBuf,
    /// Number of backup snapshots kept
    pub backup_retention: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_file: PathBuf::from(DEFAULT_DATA_FILE),
            backup_retention: 10,
        }
    }
}

impl StorageConfig {
    pub fn for_data_file(data_file: impl Into<PathBuf>) -> Self {
        Self {
            data_file: data_file.into(),
            ..Self::default()
        }
    }

    /// Sibling `backup` directory next to the data file.
    pub fn backup_dir(&self) -> PathBuf {
        self.data_dir().join(BACKUP_DIR_NAME)
    }

    pub fn data_dir(&self) -> PathBuf {
        match self.data_file.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

/// Save timing, all durations in seconds.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SaveConfig {
    pub auto_save: bool,
    /// Delay after the last keystroke before an idle save
    pub idle_save_delay: f64,
    /// Longest uninterrupted typing streak before a forced save
    pub continuous_save_interval: f64,
    /// Unsaved keystrokes that force a save regardless of timing
    pub keystroke_batch_save: u64,
    /// Minimum time between backups taken by scheduled saves
    pub backup_interval: f64,
}

impl Default for SaveConfig {
    fn default() -> Self {
        Self {
            auto_save: true,
            idle_save_delay: 1.0,
            continuous_save_interval: 300.0,
            keystroke_batch_save: 100,
            backup_interval: 3600.0,
        }
    }
}

fn seconds(value: f64, fallback: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or_else(|_| Duration::from_secs_f64(fallback))
}

impl SaveConfig {
    pub fn idle_delay(&self) -> Duration {
        seconds(self.idle_save_delay, Self::default().idle_save_delay)
    }

    pub fn continuous_interval(&self) -> Duration {
        seconds(
            self.continuous_save_interval,
            Self::default().continuous_save_interval,
        )
    }

    pub fn backup_every(&self) -> Duration {
        seconds(self.backup_interval, Self::default().backup_interval)
    }

    pub fn batch_threshold(&self) -> u64 {
        self.keystroke_batch_save.max(1)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub track_modifiers: bool,
    pub track_bigrams: bool,
    pub track_trigrams: bool,
    /// Recent key-codes kept by the recorder for n-gram extraction
    pub max_sequence_length: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            track_modifiers: true,
            track_bigrams: true,
            track_trigrams: true,
            max_sequence_length: 1000,
        }
    }
}

impl Config {
    /// Builds the configuration from `KEYSTATS_CONFIG` and `KEYSTATS_DATA_FILE`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let mut config = match non_blank(ENV_CONFIG_FILE) {
            Some(path) => Self::load_from_file(Path::new(path.trim()))?,
            None => Self::default(),
        };

        if let Some(data_file) = non_blank(ENV_DATA_FILE) {
            config.storage.data_file = PathBuf::from(data_file.trim());
        }

        config.validate()?;
        Ok(config)
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            KeyStatsError::InvalidConfiguration(format!(
                "Failed to read config file '{}': {e}",
                path.display()
            ))
        })?;

        let config = Self::from_toml_str(&content).map_err(|e| {
            KeyStatsError::InvalidConfiguration(format!(
                "Failed to parse config file '{}': {e}",
                path.display()
            ))
        })?;

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn validate(&self) -> Result<()> {
        let data_file = &self.storage.data_file;
        if data_file.as_os_str().is_empty() {
            return Err(KeyStatsError::InvalidConfiguration(
                "storage.data_file must not be empty".to_string(),
            ));
        }
        // If the path already exists but is a directory, reject early.
        if data_file.is_dir() {
            return Err(KeyStatsError::InvalidConfiguration(format!(
                "Data file path is a directory: {}",
                data_file.display()
            )));
        }
        if self.storage.backup_retention == 0 {
            return Err(KeyStatsError::InvalidConfiguration(
                "storage.backup_retention must be at least 1".to_string(),
            ));
        }

        let save = &self.save;
        for (name, value) in [
            ("save.idle_save_delay", save.idle_save_delay),
            ("save.continuous_save_interval", save.continuous_save_interval),
            ("save.backup_interval", save.backup_interval),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(KeyStatsError::InvalidConfiguration(format!(
                    "{name} must be a positive number of seconds, got {value}"
                )));
            }
        }
        if save.keystroke_batch_save == 0 {
            return Err(KeyStatsError::InvalidConfiguration(
                "save.keystroke_batch_save must be at least 1".to_string(),
            ));
        }

        if self.analysis.max_sequence_length < MIN_SEQUENCE_WINDOW {
            return Err(KeyStatsError::InvalidConfiguration(format!(
                "analysis.max_sequence_length must be at least {MIN_SEQUENCE_WINDOW}, got {}",
                self.analysis.max_sequence_length
            )));
        }

        Ok(())
    }
}
