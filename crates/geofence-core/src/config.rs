//! Configuration types for the geofence engine
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

use crate::model::Region;

/// Main geofence configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeofenceConfig {
    /// Regions to monitor when the session starts
    #[serde(default)]
    pub regions: Vec<Region>,

    /// Optional engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl GeofenceConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a configuration from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, crate::Error> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        let mut seen = HashSet::new();
        for region in &self.regions {
            region
                .validate()
                .map_err(|e| crate::Error::config(e.to_string()))?;
            if !seen.insert(region.id.as_str()) {
                return Err(crate::Error::config(format!(
                    "Region id '{}' is configured twice",
                    region.id
                )));
            }
        }

        self.engine.validate()
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Minimum time between two accepted transitions of the same kind for
    /// the same region (in milliseconds)
    ///
    /// Repeats inside this window are dropped. A change of kind is always
    /// accepted regardless of timing.
    #[serde(default = "default_dwell_interval_ms")]
    pub dwell_interval_ms: u64,

    /// Capacity of the engine command queue
    ///
    /// When full, start/stop calls are rejected with `ENGINE_UNAVAILABLE`
    /// and custom events are dropped (with a warning log).
    ///
    /// Default: 1000 commands
    #[serde(default = "default_command_channel_capacity")]
    pub command_channel_capacity: usize,

    /// Additional metadata to attach to operations
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl EngineConfig {
    /// Dwell interval as a `Duration`
    pub fn dwell_interval(&self) -> Duration {
        Duration::from_millis(self.dwell_interval_ms)
    }

    /// Set the dwell interval
    pub fn with_dwell_interval(mut self, dwell: Duration) -> Self {
        self.dwell_interval_ms = dwell.as_millis() as u64;
        self
    }

    /// Validate the engine configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.command_channel_capacity == 0 {
            return Err(crate::Error::config(
                "Command channel capacity must be > 0",
            ));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dwell_interval_ms: default_dwell_interval_ms(),
            command_channel_capacity: default_command_channel_capacity(),
            metadata: HashMap::new(),
        }
    }
}

fn default_dwell_interval_ms() -> u64 {
    30_000
}

fn default_command_channel_capacity() -> usize {
    1000
}
