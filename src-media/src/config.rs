//! Configuration management for ajamedia.
//!
//! Handles loading and saving user configuration to platform-standard config directories:
//! - Linux: `~/.config/ajamedia/config.json`
//! - macOS: `~/Library/Application Support/ajamedia/config.json`
//! - Windows: `%APPDATA%\ajamedia\config.json`

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use ajamedia_common::OutputConfig;

/// Texture sample pool settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Maximum number of samples in flight between device and renderer.
    #[serde(default = "default_pool_capacity")]
    pub capacity: usize,
    /// Allocate every sample buffer up front for the configured frame size.
    #[serde(default)]
    pub preallocate: bool,
}

fn default_pool_capacity() -> usize {
    8
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            capacity: default_pool_capacity(),
            preallocate: false,
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MediaConfig {
    /// Output channel settings.
    #[serde(default)]
    pub output: OutputConfig,
    /// Sample pool settings.
    #[serde(default)]
    pub pool: PoolConfig,
}

impl MediaConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }
}

/// Get the path to the config file.
pub fn get_config_path() -> Result<PathBuf, String> {
    let proj_dirs =
        ProjectDirs::from("", "", "ajamedia").ok_or("Could not determine config directory")?;

    Ok(proj_dirs.config_dir().join("config.json"))
}

/// Load configuration from disk.
/// Returns default config if file doesn't exist or is invalid.
pub fn load_config() -> MediaConfig {
    match get_config_path() {
        Ok(path) => load_config_from(&path),
        Err(e) => {
            warn!("Failed to get config path: {}", e);
            MediaConfig::default()
        }
    }
}

/// Load configuration from a specific file, with the same fallbacks as [`load_config`].
pub fn load_config_from(path: &Path) -> MediaConfig {
    if !path.exists() {
        debug!("No config file at {:?}, using defaults", path);
        return MediaConfig::default();
    }

    match fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str::<MediaConfig>(&contents) {
            Ok(config) => {
                info!("Loaded config from {:?}", path);
                config
            }
            Err(e) => {
                warn!("Failed to parse config file: {}. Using defaults.", e);
                MediaConfig::default()
            }
        },
        Err(e) => {
            warn!("Failed to read config file: {}. Using defaults.", e);
            MediaConfig::default()
        }
    }
}

/// Save configuration to disk.
/// Creates the config directory if it doesn't exist.
pub fn save_config(config: &MediaConfig) -> Result<PathBuf, String> {
    let path = get_config_path()?;
    save_config_to(config, &path)?;
    Ok(path)
}

/// Save configuration to a specific file.
pub fn save_config_to(config: &MediaConfig, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }

    let json = serde_json::to_string_pretty(config)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;

    fs::write(path, json).map_err(|e| format!("Failed to write config file: {}", e))?;

    info!("Saved config to {:?}", path);
    Ok(())
}
