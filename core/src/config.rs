//! On-disk configuration
//!
//! `settings.toml` holds [`UpkeepSettings`] and is managed through confy.
//! `silenced_fx.toml` holds the per-name FX silence list.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use upkeep_types::UpkeepSettings;

const APP_DIR: &str = "upkeep";
const SETTINGS_FILE: &str = "settings.toml";
const SILENCED_FILE: &str = "silenced_fx.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load settings from {}: {source}", path.display())]
    Load {
        path: PathBuf,
        source: confy::ConfyError,
    },
    #[error("failed to store settings to {}: {source}", path.display())]
    Store {
        path: PathBuf,
        source: confy::ConfyError,
    },
    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("parse error in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("serialize error for {}: {source}", path.display())]
    Serialize {
        path: PathBuf,
        source: toml::ser::Error,
    },
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SilencedFile {
    #[serde(default)]
    names: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ConfigStore {
    dir: PathBuf,
}

impl ConfigStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store under the platform config directory, if there is one.
    pub fn default_location() -> Option<Self> {
        default_dir().map(Self::new)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn settings_path(&self) -> PathBuf {
        self.dir.join(SETTINGS_FILE)
    }

    pub fn silenced_path(&self) -> PathBuf {
        self.dir.join(SILENCED_FILE)
    }

    /// Load settings, writing a default file when none exists.
    pub fn load_settings(&self) -> Result<UpkeepSettings, ConfigError> {
        let path = self.settings_path();
        confy::load_path(&path).map_err(|e| ConfigError::Load { path, source: e })
    }

    pub fn store_settings(&self, settings: &UpkeepSettings) -> Result<(), ConfigError> {
        let path = self.settings_path();
        confy::store_path(&path, settings).map_err(|e| ConfigError::Store { path, source: e })
    }

    /// Silenced names. A missing file is an empty list.
    pub fn load_silenced(&self) -> Result<Vec<String>, ConfigError> {
        let path = self.silenced_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let contents = fs::read_to_string(&path).map_err(|e| ConfigError::Io {
            path: path.clone(),
            source: e,
        })?;
        let file: SilencedFile = toml::from_str(&contents).map_err(|e| ConfigError::Parse { path, source: e })?;
        Ok(file.names)
    }

    pub fn save_silenced(&self, names: &[String]) -> Result<(), ConfigError> {
        let path = self.silenced_path();
        let file = SilencedFile {
            names: names.to_vec(),
        };
        let contents = toml::to_string_pretty(&file).map_err(|e| ConfigError::Serialize {
            path: path.clone(),
            source: e,
        })?;

        fs::create_dir_all(&self.dir).map_err(|e| ConfigError::Io {
            path: self.dir.clone(),
            source: e,
        })?;
        fs::write(&path, contents).map_err(|e| ConfigError::Io { path, source: e })?;
        tracing::debug!(count = names.len(), "Saved silenced FX names");
        Ok(())
    }
}

/// `<config_dir>/upkeep`
pub fn default_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join(APP_DIR))
}
