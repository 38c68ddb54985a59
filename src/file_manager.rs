// src/file_manager.rs - Script upload directory
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;
use tokio::fs;

#[derive(Debug, Error)]
pub enum ScriptStoreError {
    #[error("Invalid script name '{0}'")]
    InvalidName(String),
    #[error("File '{0}' not found.")]
    NotFound(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

/// Flat directory of uploaded motion scripts.
///
/// Names are plain file names; anything that could escape the directory
/// is rejected before touching the filesystem.
#[derive(Debug, Clone)]
pub struct ScriptStore {
    directory: PathBuf,
}

impl ScriptStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Create the directory if it does not exist yet.
    pub async fn ensure_directory(&self) -> Result<(), ScriptStoreError> {
        fs::create_dir_all(&self.directory).await?;
        Ok(())
    }

    /// Path of `name` inside the store. Does not check that the file exists.
    pub fn resolve(&self, name: &str) -> Result<PathBuf, ScriptStoreError> {
        if !is_valid_name(name) {
            return Err(ScriptStoreError::InvalidName(name.to_string()));
        }
        Ok(self.directory.join(name))
    }

    /// Regular files in the store, sorted by name.
    pub async fn list(&self) -> Result<Vec<FileInfo>, ScriptStoreError> {
        let mut entries = fs::read_dir(&self.directory).await?;
        let mut files = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let modified = match metadata.modified() {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!("Failed to get modified time for '{}': {}", name, e);
                    SystemTime::UNIX_EPOCH
                }
            };
            files.push(FileInfo {
                name,
                size: metadata.len(),
                modified: DateTime::<Utc>::from(modified),
            });
        }

        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }

    pub async fn save(&self, name: &str, content: &[u8]) -> Result<PathBuf, ScriptStoreError> {
        let path = self.resolve(name)?;
        fs::write(&path, content).await?;
        tracing::info!("Saved script '{}' ({} bytes)", name, content.len());
        Ok(path)
    }

    pub async fn delete(&self, name: &str) -> Result<(), ScriptStoreError> {
        let path = self.resolve(name)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                tracing::info!("Deleted script '{}'", name);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ScriptStoreError::NotFound(name.to_string())),
            Err(e) => Err(e.into()),
        }
    }
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}
