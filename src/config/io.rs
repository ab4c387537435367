//! Configuration file I/O operations

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::Config;
use crate::storage;

impl Config {
    /// Get the global config directory path (~/.kyco/)
    pub fn global_config_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".kyco")
    }

    /// Get the global config file path (~/.kyco/sessions.toml)
    pub fn global_config_path() -> PathBuf {
        Self::global_config_dir().join("sessions.toml")
    }

    /// Parse a TOML config; missing sections fall back to defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Invalid config in {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config in {}", path.display()))?;
        Ok(config)
    }

    /// Write the config as TOML through the same locked tmp+rename path
    /// the session stores use, so the CLI and a running server never
    /// observe a truncated file.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        storage::write_atomic(path, content.as_bytes())
            .with_context(|| format!("Failed to write config file: {}", path.display()))
    }

    /// Load configuration from `path` (or the global path).
    /// If no config exists yet, one with defaults is written first.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(Self::global_config_path);

        if !path.exists() {
            let config = Self::default();
            match config.save_to_file(&path) {
                Ok(()) => tracing::info!("Created {}", path.display()),
                // Read-only home directories still get a working default config
                Err(e) => tracing::warn!("Failed to write default config: {}", e),
            }
            return Ok(config);
        }

        Self::from_file(&path)
    }
}
