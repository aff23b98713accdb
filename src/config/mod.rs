//! Configuration file management
//!
//! Loads TOML configuration files and provides defaults for the
//! command line options. Default config path: ~/.config/pixcat/config.toml

use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::constants::DEFAULT_DETECTION_TIMEOUT_SECS;

/// Application settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Transfer channel detection
    pub detection: DetectionConfig,
    /// How images are shown
    pub display: DisplayConfig,
    /// Worker pool
    pub workers: WorkersConfig,
}

/// Transfer channel detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// "detect" | "stream" | "file" | "memory"
    pub transfer_mode: String,
    /// Seconds to wait for the terminal to answer
    pub timeout: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            transfer_mode: "detect".to_string(),
            timeout: DEFAULT_DETECTION_TIMEOUT_SECS,
        }
    }
}

/// Display settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Z index, a leading "--" draws under text with background color
    pub z_index: String,
    /// Background color for transparent pixels: "none", #rrggbb, rgb:rr/gg/bb or a name
    pub background: String,
    /// "none" | "horizontal" | "vertical" | "both"
    pub mirror: String,
    /// Delete visible images before showing new ones
    pub clear: bool,
    /// Wait for Enter before exiting
    pub hold: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            z_index: "0".to_string(),
            background: "none".to_string(),
            mirror: "none".to_string(),
            clear: false,
            hold: false,
        }
    }
}

/// Worker settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    /// Maximum worker threads (0 = one per CPU)
    pub max: usize,
}

impl Config {
    const SYSTEM_CONFIG_PATH: &'static str = "/etc/pixcat/config.toml";

    /// Get the path that would be used for loading config
    /// Returns None if using built-in defaults
    pub fn config_path() -> Option<PathBuf> {
        // 1. PIXCAT_CONFIG environment variable
        if let Ok(path) = std::env::var("PIXCAT_CONFIG") {
            let p = Path::new(&path);
            if p.exists() {
                return Some(p.to_path_buf());
            }
        }

        // 2. User config: ~/.config/pixcat/config.toml
        if let Some(config_dir) = dirs::config_dir() {
            let config_path = config_dir.join("pixcat").join("config.toml");
            if config_path.exists() {
                return Some(config_path);
            }
        }

        // 3. System config: /etc/pixcat/config.toml
        let system_config = Path::new(Self::SYSTEM_CONFIG_PATH);
        if system_config.exists() {
            return Some(system_config.to_path_buf());
        }

        None
    }

    /// Load configuration with priority:
    /// 1. `explicit` (the --config option)
    /// 2. PIXCAT_CONFIG environment variable
    /// 3. ~/.config/pixcat/config.toml (user config)
    /// 4. /etc/pixcat/config.toml (system config)
    /// 5. Built-in defaults
    pub fn load(explicit: Option<&Path>) -> Self {
        let path = explicit.map(Path::to_path_buf).or_else(Self::config_path);
        if let Some(path) = path {
            match Self::load_from_file(&path) {
                Ok(config) => {
                    info!("Loaded config: {}", path.display());
                    return config;
                }
                Err(e) => {
                    warn!("Failed to load config {}: {:#}", path.display(), e);
                }
            }
        }
        info!("Using built-in default config");
        Self::default()
    }

    /// Load settings from specified path
    fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }
}
