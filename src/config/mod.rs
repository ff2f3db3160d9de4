//! Configuration module for Neurochain
//!
//! A single TOML file holds every section: `scheduler`, `logging`, `source`
//! and `limits`. Missing sections and fields fall back to their defaults.
//!
//! # App Data Location
//!
//! The default configuration file lives in the platform data directory:
//! - **Linux**: `~/.local/share/neurochain/`
//! - **macOS**: `~/Library/Application Support/neurochain/`
//! - **Windows**: `%APPDATA%\neurochain\`
//!
//! # Example
//!
//! ```ignore
//! use neurochain::config::PipelineConfig;
//!
//! let config = PipelineConfig::load_or_default(PipelineConfig::default_path());
//! config.scheduler.validate()?;
//! ```

pub mod settings;

pub use settings::*;

use crate::error::{NeurochainError, Result, ResultExt};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application identifier for data directories
pub const APP_ID: &str = "neurochain";

/// Config filename
pub const CONFIG_FILE: &str = "neurochain.toml";

// ==================== App Data Directory ====================

/// Get the application data directory path
pub fn app_data_dir() -> Option<PathBuf> {
    dirs_next::data_dir().map(|p| p.join(APP_ID))
}

/// Ensure the app data directory exists
pub fn ensure_app_data_dir() -> Result<PathBuf> {
    let dir = app_data_dir().ok_or_else(|| {
        NeurochainError::Config("Could not determine app data directory".to_string())
    })?;

    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| {
            NeurochainError::Config(format!("Failed to create app data directory: {}", e))
        })?;
    }

    Ok(dir)
}

// ==================== Pipeline Config ====================

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub scheduler: SchedulerConfig,
    pub logging: LoggingConfig,
    pub source: SourceConfig,
    pub limits: LimitsConfig,
}

impl PipelineConfig {
    /// Default config path, `<data dir>/neurochain/neurochain.toml`.
    pub fn default_path() -> Option<PathBuf> {
        app_data_dir().map(|p| p.join(CONFIG_FILE))
    }

    /// Load and validate a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            NeurochainError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| {
            NeurochainError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        config.scheduler.validate()?;
        Ok(config)
    }

    /// Load `path` if given and readable, otherwise the defaults.
    pub fn load_or_default(path: Option<impl AsRef<Path>>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Self::default();
        }
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(NeurochainError::from)
                .with_context(|| format!("Failed to create config directory {}", parent.display()))?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| NeurochainError::Serialization(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| {
            NeurochainError::Config(format!("Failed to write {}: {}", path.display(), e))
        })
    }
}
