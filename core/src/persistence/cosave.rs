//! Cosave files on disk
//!
//! The cosave sits next to the save it belongs to, with the save's extension
//! replaced by `.skse`. All reads and writes go through [`CosaveStore`],
//! which serializes them behind a lock.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use thiserror::Error;
use upkeep_types::DiagnosticsSettings;

use crate::host::Notifier;

use super::codec::{self, CodecError, PersistedEntry};

pub const COSAVE_EXTENSION: &str = "skse";

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("cosave not found: {}", .0.display())]
    MissingCosave(PathBuf),
    #[error("cosave is empty: {}", .0.display())]
    EmptyCosave(PathBuf),
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("no saves directory: {0}")]
    NoSaveRoot(String),
}

/// Resolves the saves directory and the cosave belonging to a save name.
#[derive(Debug, Clone)]
pub struct CosaveLocator {
    saves_path: Option<PathBuf>,
    game_folder: String,
    documents: Option<PathBuf>,
}

impl CosaveLocator {
    pub fn from_settings(settings: &DiagnosticsSettings) -> Self {
        Self {
            saves_path: settings.saves_path.as_ref().map(PathBuf::from),
            game_folder: settings.game_folder.clone(),
            documents: dirs::document_dir(),
        }
    }

    /// Locator rooted at an explicit saves directory.
    pub fn with_saves_path(path: impl Into<PathBuf>) -> Self {
        Self {
            saves_path: Some(path.into()),
            game_folder: String::new(),
            documents: None,
        }
    }

    /// The saves directory. An unusable override is reported to the player.
    pub fn save_root<N: Notifier + ?Sized>(&self, notifier: &mut N) -> Result<PathBuf, PersistError> {
        if let Some(path) = &self.saves_path {
            if !path.exists() {
                let message = format!(
                    "Maintained abilities could not be loaded: the configured SavesPath does not exist: {}",
                    path.display()
                );
                tracing::error!(path = %path.display(), "Configured saves path does not exist");
                notifier.alert(&message);
                return Err(PersistError::NoSaveRoot(message));
            }
            if !path.is_dir() {
                let message = format!(
                    "Maintained abilities could not be loaded: the configured SavesPath is not a directory: {}",
                    path.display()
                );
                tracing::error!(path = %path.display(), "Configured saves path is not a directory");
                notifier.alert(&message);
                return Err(PersistError::NoSaveRoot(message));
            }
            return Ok(path.clone());
        }

        let documents = self
            .documents
            .as_ref()
            .ok_or_else(|| PersistError::NoSaveRoot("documents directory unavailable".to_string()))?;
        Ok(documents.join("My Games").join(&self.game_folder).join("saves"))
    }

    pub fn cosave_path<N: Notifier + ?Sized>(&self, save_name: &str, notifier: &mut N) -> Result<PathBuf, PersistError> {
        let root = self.save_root(notifier)?;
        Ok(root.join(Path::new(save_name).with_extension(COSAVE_EXTENSION)))
    }
}

/// Serialized access to cosave blobs.
#[derive(Debug, Default)]
pub struct CosaveStore {
    lock: Mutex<()>,
}

impl CosaveStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read_blob(&self, path: &Path) -> Result<Vec<u8>, PersistError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        if !path.exists() {
            return Err(PersistError::MissingCosave(path.to_path_buf()));
        }
        let bytes = fs::read(path).map_err(|e| PersistError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        if bytes.is_empty() {
            return Err(PersistError::EmptyCosave(path.to_path_buf()));
        }
        Ok(bytes)
    }

    /// Encode under the lock.
    pub fn encode(&self, entries: &[PersistedEntry]) -> Result<Vec<u8>, PersistError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(codec::encode(entries)?)
    }

    pub fn write(&self, path: &Path, entries: &[PersistedEntry]) -> Result<usize, PersistError> {
        let bytes = self.encode(entries)?;
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| PersistError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        fs::write(path, &bytes).map_err(|e| PersistError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        tracing::debug!(path = %path.display(), bytes = bytes.len(), entries = entries.len(), "Wrote cosave");
        Ok(bytes.len())
    }

    /// Read and decode the cosave at `path`.
    pub fn load(&self, path: &Path) -> Result<Vec<PersistedEntry>, PersistError> {
        let bytes = self.read_blob(path)?;
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(codec::decode(&bytes)?)
    }
}
