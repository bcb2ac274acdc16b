//! Configuration module for kaliscope-rs
//!
//! This module handles:
//! - The hierarchical [`SettingsTree`] used for pipelines and presets
//! - Engine tuning ([`EngineConfig`])
//! - Application state persisted across sessions ([`AppConfig`])
//!
//! # App Data Location
//!
//! Application data is stored in the platform-appropriate location:
//! - **Linux**: `~/.local/share/dev.hxyulin.kaliscope-rs/`
//! - **macOS**: `~/Library/Application Support/dev.hxyulin.kaliscope-rs/`
//! - **Windows**: `%APPDATA%\dev.hxyulin.kaliscope-rs\`
//!
//! # Files
//!
//! - `app_config.json` - Engine tuning and recently used pipelines
//! - `~/.kaliscope_pipeline.json` - Default pipeline, loaded on startup
//! - `./presets/*.{json,toml}` - Read-only pipeline presets

pub mod settings_tree;

pub use settings_tree::{ConfigValue, SettingsFormat, SettingsNode, SettingsTree};

use crate::error::{KaliscopeError, Result, ResultExt};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application identifier for data directories
pub const APP_ID: &str = "dev.hxyulin.kaliscope-rs";

/// App config filename
pub const APP_CONFIG_FILE: &str = "app_config.json";

/// Default pipeline file, relative to the user's home directory
pub const DEFAULT_PIPELINE_FILE: &str = ".kaliscope_pipeline.json";

/// Preset directory, relative to the working directory
pub const PRESETS_DIRECTORY: &str = "presets";

/// Maximum number of recent pipeline files to remember
pub const MAX_RECENT_PIPELINES: usize = 10;

/// Default number of frames kept in the frame cache
pub const DEFAULT_CACHE_CAPACITY: usize = 64;

/// Default number of published frames a consumer may leave unacknowledged
pub const DEFAULT_MAX_FRAMES_IN_FLIGHT: usize = 4;

/// Default per-subscriber event queue length
pub const DEFAULT_SUBSCRIBER_QUEUE_CAPACITY: usize = 16;

/// Frame rate assumed when a reader does not report one
pub const DEFAULT_FRAME_RATE: f64 = 24.0;

// ==================== App Data Directory ====================

/// Get the application data directory path
pub fn app_data_dir() -> Option<PathBuf> {
    dirs_next::data_dir().map(|p| p.join(APP_ID))
}

/// Ensure the app data directory exists
pub fn ensure_app_data_dir() -> Result<PathBuf> {
    let dir = app_data_dir().ok_or_else(|| {
        KaliscopeError::Config("Could not determine app data directory".to_string())
    })?;

    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| {
            KaliscopeError::Config(format!("Failed to create app data directory: {}", e))
        })?;
    }

    Ok(dir)
}

/// Path of the default pipeline file in the user's home directory
pub fn default_pipeline_path() -> Option<PathBuf> {
    dirs_next::home_dir().map(|p| p.join(DEFAULT_PIPELINE_FILE))
}

/// Path of the app config file
pub fn app_config_path() -> Option<PathBuf> {
    app_data_dir().map(|p| p.join(APP_CONFIG_FILE))
}

// ==================== Engine Config ====================

/// Tuning knobs for the playback engine and its frame cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Frames retained by the LRU frame cache
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Published frames allowed without a `frame_processed` acknowledgement.
    /// Zero disables backpressure.
    #[serde(default = "default_max_frames_in_flight")]
    pub max_frames_in_flight: usize,

    /// Capacity of each subscriber's event queue
    #[serde(default = "default_subscriber_queue_capacity")]
    pub subscriber_queue_capacity: usize,

    /// Frame rate used by readers that do not know their own
    #[serde(default = "default_frame_rate")]
    pub default_frame_rate: f64,
}

fn default_cache_capacity() -> usize {
    DEFAULT_CACHE_CAPACITY
}

fn default_max_frames_in_flight() -> usize {
    DEFAULT_MAX_FRAMES_IN_FLIGHT
}

fn default_subscriber_queue_capacity() -> usize {
    DEFAULT_SUBSCRIBER_QUEUE_CAPACITY
}

fn default_frame_rate() -> f64 {
    DEFAULT_FRAME_RATE
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            max_frames_in_flight: DEFAULT_MAX_FRAMES_IN_FLIGHT,
            subscriber_queue_capacity: DEFAULT_SUBSCRIBER_QUEUE_CAPACITY,
            default_frame_rate: DEFAULT_FRAME_RATE,
        }
    }
}

impl EngineConfig {
    /// Builder-style setter for the cache capacity
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Builder-style setter for the backpressure window
    pub fn with_max_frames_in_flight(mut self, frames: usize) -> Self {
        self.max_frames_in_flight = frames;
        self
    }

    /// Builder-style setter for the subscriber queue capacity
    pub fn with_subscriber_queue_capacity(mut self, capacity: usize) -> Self {
        self.subscriber_queue_capacity = capacity;
        self
    }

    /// Builder-style setter for the frame rate given to readers
    pub fn with_default_frame_rate(mut self, rate: f64) -> Self {
        self.default_frame_rate = rate;
        self
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.cache_capacity == 0 {
            return Err(KaliscopeError::Config(
                "cache_capacity must be at least 1".to_string(),
            ));
        }
        if self.subscriber_queue_capacity == 0 {
            return Err(KaliscopeError::Config(
                "subscriber_queue_capacity must be at least 1".to_string(),
            ));
        }
        if !(self.default_frame_rate.is_finite() && self.default_frame_rate > 0.0) {
            return Err(KaliscopeError::Config(format!(
                "default_frame_rate must be positive, got {}",
                self.default_frame_rate
            )));
        }
        Ok(())
    }
}

// ==================== App Config ====================

/// Persistent application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Version for future migration support
    #[serde(default = "default_app_config_version")]
    pub version: u32,

    /// Engine tuning
    #[serde(default)]
    pub engine: EngineConfig,

    /// Directory scanned for presets
    #[serde(default = "default_preset_directory")]
    pub preset_directory: PathBuf,

    /// Recently opened pipeline files, most recent first
    #[serde(default)]
    pub recent_pipelines: Vec<PathBuf>,
}

fn default_app_config_version() -> u32 {
    1
}

fn default_preset_directory() -> PathBuf {
    PathBuf::from(PRESETS_DIRECTORY)
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: 1,
            engine: EngineConfig::default(),
            preset_directory: default_preset_directory(),
            recent_pipelines: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Load app config from the default location
    pub fn load() -> Result<Self> {
        let path = app_config_path().ok_or_else(|| {
            KaliscopeError::Config("Could not determine app config path".to_string())
        })?;

        if !path.exists() {
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load app config from an explicit file
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| KaliscopeError::Config(format!("Failed to read app config: {}", e)))?;

        let config: Self = serde_json::from_str(&content)
            .map_err(|e| KaliscopeError::Config(format!("Failed to parse app config: {}", e)))?;
        config
            .engine
            .validate()
            .with_context(|| format!("Invalid engine settings in {}", path.as_ref().display()))?;
        Ok(config)
    }

    /// Load app config, returning defaults on any error
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            tracing::warn!("Failed to load app config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save app config to the default location
    pub fn save(&self) -> Result<()> {
        let dir = ensure_app_data_dir()?;
        self.save_to(dir.join(APP_CONFIG_FILE))
    }

    /// Save app config to an explicit file
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            KaliscopeError::Config(format!("Failed to serialize app config: {}", e))
        })?;

        std::fs::write(path.as_ref(), content)
            .map_err(|e| KaliscopeError::Config(format!("Failed to write app config: {}", e)))
    }

    /// Move `path` to the front of the recent pipeline list
    pub fn add_recent_pipeline(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref().to_path_buf();
        self.recent_pipelines.retain(|p| p != &path);
        self.recent_pipelines.insert(0, path);
        self.recent_pipelines.truncate(MAX_RECENT_PIPELINES);
    }

    /// Most recent pipeline file that still exists
    pub fn last_pipeline(&self) -> Option<&Path> {
        self.recent_pipelines
            .iter()
            .find(|p| p.exists())
            .map(PathBuf::as_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_default_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cache_capacity, DEFAULT_CACHE_CAPACITY);
    }

    #[test]
    fn test_engine_config_rejects_zero_cache() {
        let config = EngineConfig::default().with_cache_capacity(0);
        assert!(matches!(config.validate(), Err(KaliscopeError::Config(_))));
    }

    #[test]
    fn test_zero_in_flight_is_valid() {
        let config = EngineConfig::default().with_max_frames_in_flight(0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_names_file_with_invalid_engine() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app_config.json");
        std::fs::write(&path, r#"{"engine": {"default_frame_rate": 0.0}}"#).unwrap();

        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, KaliscopeError::WithContext { .. }));
        let message = err.to_string();
        assert!(message.contains("app_config.json"));
        assert!(message.contains("default_frame_rate"));
    }

    #[test]
    fn test_app_config_partial_json_fills_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"engine": {"cache_capacity": 8}}"#).unwrap();
        assert_eq!(config.engine.cache_capacity, 8);
        assert_eq!(
            config.engine.subscriber_queue_capacity,
            DEFAULT_SUBSCRIBER_QUEUE_CAPACITY
        );
        assert_eq!(config.preset_directory, PathBuf::from(PRESETS_DIRECTORY));
    }

    #[test]
    fn test_recent_pipelines_dedup_and_limit() {
        let mut config = AppConfig::default();
        for i in 0..15 {
            config.add_recent_pipeline(format!("/tmp/pipeline_{}.json", i));
        }
        config.add_recent_pipeline("/tmp/pipeline_3.json");

        assert_eq!(config.recent_pipelines.len(), MAX_RECENT_PIPELINES);
        assert_eq!(
            config.recent_pipelines[0],
            PathBuf::from("/tmp/pipeline_3.json")
        );
        let count = config
            .recent_pipelines
            .iter()
            .filter(|p| p.ends_with("pipeline_3.json"))
            .count();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_app_config_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(APP_CONFIG_FILE);

        let mut config = AppConfig::default();
        config.engine.max_frames_in_flight = 2;
        config.add_recent_pipeline("/tmp/a.json");
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_from_rejects_invalid_engine() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(APP_CONFIG_FILE);
        std::fs::write(&path, r#"{"engine": {"subscriber_queue_capacity": 0}}"#).unwrap();
        assert!(AppConfig::load_from(&path).is_err());
    }
}
