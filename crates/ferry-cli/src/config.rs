//! Configuration system for FERRY CLI.

use ferry_core::{QueueConfig, StepPolicy};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// FERRY configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Upload queue configuration
    #[serde(default)]
    pub queue: QueueSection,
    /// Transfer history configuration
    #[serde(default)]
    pub records: RecordsSection,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Upload queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSection {
    /// Maximum files per batch
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Fixed progress step per tick (ignored when `random_step` is set)
    #[serde(default = "default_step")]
    pub step: u8,
    /// Random step range `[min, max]` per tick
    #[serde(skip_serializing_if = "Option::is_none")]
    pub random_step: Option<[u8; 2]>,
    /// Simulator tick interval in milliseconds
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Pause after each completion in milliseconds
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
}

/// Transfer history configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordsSection {
    /// Record log file (JSON Lines)
    #[serde(default = "default_records_path")]
    pub path: PathBuf,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log file path
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

// Default values

fn default_capacity() -> usize {
    ferry_core::config::DEFAULT_CAPACITY
}

fn default_step() -> u8 {
    ferry_core::config::DEFAULT_STEP
}

fn default_tick_interval_ms() -> u64 {
    ferry_core::config::DEFAULT_TICK_INTERVAL.as_millis() as u64
}

fn default_settle_delay_ms() -> u64 {
    ferry_core::config::DEFAULT_SETTLE_DELAY.as_millis() as u64
}

fn default_records_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("ferry/records.jsonl")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for QueueSection {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            step: default_step(),
            random_step: None,
            tick_interval_ms: default_tick_interval_ms(),
            settle_delay_ms: default_settle_delay_ms(),
        }
    }
}

impl Default for RecordsSection {
    fn default() -> Self {
        Self {
            path: default_records_path(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, contents)?;
        Ok(())
    }

    /// Get default config path
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("ferry/config.toml")
    }

    /// Load config from default path, or create default if it doesn't exist
    ///
    /// # Errors
    ///
    /// Returns an error if reading or creating the config fails.
    pub fn load_or_default() -> anyhow::Result<Self> {
        let path = Self::default_path();

        if path.exists() {
            Self::load(&path)
        } else {
            let config = Self::default();
            config.save(&path)?;
            Ok(config)
        }
    }

    /// Build the core queue configuration
    #[must_use]
    pub fn to_queue_config(&self) -> QueueConfig {
        let step = match self.queue.random_step {
            Some([min, max]) => StepPolicy::Random { min, max },
            None => StepPolicy::Fixed(self.queue.step),
        };

        QueueConfig {
            capacity: self.queue.capacity,
            step,
            tick_interval: Duration::from_millis(self.queue.tick_interval_ms),
            settle_delay: Duration::from_millis(self.queue.settle_delay_ms),
            ..QueueConfig::default()
        }
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is invalid.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.queue.capacity == 0 || self.queue.capacity > 1000 {
            anyhow::bail!("Queue capacity must be between 1 and 1000");
        }

        // Step policy and tick interval
        self.to_queue_config().validate()?;

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!(
                "Invalid log level: {}. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            );
        }

        if self.records.path.as_os_str().is_empty() {
            anyhow::bail!("Record log path must not be empty");
        }

        Ok(())
    }
}
