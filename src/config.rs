/// Load-time configuration for the loading pipeline
///
/// All values are constants for the lifetime of a session. The struct is
/// serialized to JSON so it can be tuned without a rebuild; missing fields
/// fall back to the defaults below.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::pipeline::{DecodeSize, Priority};
use crate::window::PressureLevel;

/// All tunables of the loading pipeline
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct LoadingConfig {
    // ========== Window ==========

    /// Number of items around the current index whose preview/full
    /// resources are kept resident (half on each side)
    pub window_size: usize,

    /// Distance from the end of the loaded items that triggers loading
    /// the next batch of thumbnails
    pub preload_threshold: usize,

    /// Number of items around the current index that get a full-quality
    /// preload request (half on each side)
    pub high_quality_window: usize,

    /// Number of assets turned into items per pagination batch
    pub preload_batch_size: usize,

    // ========== Loading ==========

    /// Maximum number of decodes in flight at once
    pub max_concurrent_loads: usize,

    /// Capacity of the decoded-resource cache (FIFO eviction)
    pub cache_size: usize,

    /// Depth of the terminal load-event channel
    pub event_capacity: usize,

    // ========== Decode sizes ==========

    /// Target box for thumbnails
    pub thumbnail_size: DecodeSize,

    /// Target box for previews
    pub preview_size: DecodeSize,
}

impl Default for LoadingConfig {
    fn default() -> Self {
        Self {
            window_size: 101,
            preload_threshold: 20,
            high_quality_window: 100,
            preload_batch_size: 20,
            max_concurrent_loads: 3,
            cache_size: 150,
            event_capacity: 256,
            thumbnail_size: DecodeSize::new(100, 100),
            preview_size: DecodeSize::new(500, 500),
        }
    }
}

impl LoadingConfig {
    /// Parse from a JSON string
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Convert to a JSON string
    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load and validate a JSON config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Load the user config if one exists, otherwise use the defaults
    ///
    /// - Linux: ~/.config/media-sweep/config.json
    /// - macOS: ~/Library/Application Support/media-sweep/config.json
    /// - Windows: %APPDATA%\media-sweep\config.json
    pub fn load_or_default() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) if path.exists() => {
                log::info!("Loading config from {}", path.display());
                Self::load(&path)
            }
            _ => Ok(Self::default()),
        }
    }

    /// Location of the user config file
    pub fn default_path() -> Option<PathBuf> {
        let mut path = dirs::config_dir()?;
        path.push("media-sweep");
        path.push("config.json");
        Some(path)
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field, reason: &str| ConfigError::Invalid {
            field,
            reason: reason.to_string(),
        };

        if self.max_concurrent_loads == 0 {
            return Err(invalid("max_concurrent_loads", "must be at least 1"));
        }
        if self.window_size == 0 {
            return Err(invalid("window_size", "must be at least 1"));
        }
        if self.cache_size == 0 {
            return Err(invalid("cache_size", "must be at least 1"));
        }
        if self.event_capacity == 0 {
            return Err(invalid("event_capacity", "must be at least 1"));
        }
        if self.thumbnail_size.is_empty() {
            return Err(invalid("thumbnail_size", "width and height must be non-zero"));
        }
        if self.preview_size.is_empty() {
            return Err(invalid("preview_size", "width and height must be non-zero"));
        }
        if self.cache_size < self.window_size {
            log::warn!(
                "cache_size {} is smaller than window_size {}; resident items will miss the cache",
                self.cache_size,
                self.window_size
            );
        }
        Ok(())
    }

    /// Scheduling tier for an item `distance` indices away from the current one
    pub fn priority_for_distance(distance: usize) -> Priority {
        match distance {
            0 => Priority::Immediate,
            1..=10 => Priority::High,
            11..=30 => Priority::Normal,
            _ => Priority::Low,
        }
    }

    /// Effective resident window under the given memory pressure
    pub fn adjusted_window_size(&self, level: PressureLevel) -> usize {
        match level {
            PressureLevel::None => self.window_size,
            PressureLevel::Low => self.window_size.saturating_mul(3) / 4,
            PressureLevel::High => self.window_size / 2,
            PressureLevel::Critical => self.window_size / 4,
        }
    }
}
