//! Configuration for frametimer

use std::fs;
use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::frame::FrameConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Frame clock settings
    pub frame: FrameConfig,
}

impl Config {
    /// Load configuration with fallback chain
    ///
    /// Order: explicit path, `./.frametimer.yml`,
    /// `~/.config/frametimer/frametimer.yml`, then defaults.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        for candidate in Self::default_paths() {
            if candidate.exists() {
                match Self::load_from_file(&candidate) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {:#}", candidate.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, before logging is set up
    ///
    /// Errors are swallowed; the full load reports them once logging works.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let read = |path: &Path| -> Option<String> {
            let content = fs::read_to_string(path).ok()?;
            let config: Self = serde_yaml::from_str(&content).ok()?;
            config.log_level
        };

        match config_path {
            Some(path) => read(path),
            None => Self::default_paths()
                .into_iter()
                .find(|p| p.exists())
                .and_then(|p| read(&p)),
        }
    }

    /// Write the configuration as YAML
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = self.to_yaml()?;
        fs::write(path, content).context(format!("Failed to write config to {}", path.display()))?;
        Ok(())
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize config")
    }

    fn default_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(".frametimer.yml")];
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("frametimer").join("frametimer.yml"));
        }
        paths
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        config.frame.validate()?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}
