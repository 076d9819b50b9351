//! Host configuration.
//!
//! Loaded from a JSON file; every field has a default, so an empty object is
//! a valid configuration. Command-line flags override what the file says.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::tick::TickConfig;

/// Why a configuration file could not be loaded.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("reading config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid configuration JSON.
    #[error("parsing config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The tick rate is zero, negative or not a number.
    #[error("tick rate must be a positive number of ticks per second, got {0}")]
    InvalidTickRate(f64),
}

/// Configuration for the host process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Target ticks per second.
    pub tick_rate: f64,
    /// Maximum number of ticks to run (0 = unlimited).
    pub max_ticks: u64,
    /// How often source watchers poll, in milliseconds.
    pub watch_interval_ms: u64,
    /// Guest slots to load at startup.
    pub slots: Vec<SlotConfig>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60.0,
            max_ticks: 0,
            watch_interval_ms: 500,
            slots: Vec::new(),
        }
    }
}

/// One guest slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotConfig {
    /// Slot name, used in logs and diagnostic keys.
    pub name: String,
    /// World manifest the slot's compiler reads.
    pub manifest: PathBuf,
    /// Path to watch for changes. Defaults to the manifest itself.
    #[serde(default)]
    pub watch: Option<PathBuf>,
    /// Command run before the manifest is read, e.g. a generator script.
    #[serde(default)]
    pub build_command: Option<Vec<String>>,
}

impl SlotConfig {
    /// Create a slot for `manifest` with no build step.
    #[must_use]
    pub fn new(name: impl Into<String>, manifest: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            manifest: manifest.into(),
            watch: None,
            build_command: None,
        }
    }

    /// The path whose changes trigger a reload.
    #[must_use]
    pub fn watch_path(&self) -> &Path {
        self.watch.as_deref().unwrap_or(&self.manifest)
    }
}

impl HostConfig {
    /// Read a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that parse but cannot drive the host.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.tick_rate.is_finite() || self.tick_rate <= 0.0 {
            return Err(ConfigError::InvalidTickRate(self.tick_rate));
        }
        Ok(())
    }

    /// Override the tick rate.
    #[must_use]
    pub fn with_tick_rate(mut self, tick_rate: f64) -> Self {
        self.tick_rate = tick_rate;
        self
    }

    /// Override the tick limit.
    #[must_use]
    pub fn with_max_ticks(mut self, max_ticks: u64) -> Self {
        self.max_ticks = max_ticks;
        self
    }

    /// Add a slot.
    #[must_use]
    pub fn with_slot(mut self, slot: SlotConfig) -> Self {
        self.slots.push(slot);
        self
    }

    /// The tick loop settings.
    #[must_use]
    pub fn tick(&self) -> TickConfig {
        TickConfig {
            tick_rate: self.tick_rate,
            max_ticks: self.max_ticks,
        }
    }

    /// The watcher poll interval.
    #[must_use]
    pub fn watch_interval(&self) -> Duration {
        Duration::from_millis(self.watch_interval_ms)
    }
}
