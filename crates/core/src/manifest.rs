//! Manifest recording the last successful library update.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata describing the currently installed library snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryManifest {
    /// Archive URL the library was installed from.
    pub source_url: String,
    /// When the swap completed.
    pub updated_at: DateTime<Utc>,
    /// Number of games listed right after the update.
    pub game_count: usize,
}

impl LibraryManifest {
    /// Manifest for an update that just finished.
    pub fn new(source_url: impl Into<String>, game_count: usize) -> Self {
        Self {
            source_url: source_url.into(),
            updated_at: Utc::now(),
            game_count,
        }
    }

    /// Load the manifest from the given path, returning `None` if it does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Option<Self>> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read manifest {}", path.display()))?;
        let manifest = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse manifest {}", path.display()))?;
        Ok(Some(manifest))
    }

    /// Persist the manifest to the given file, creating parent directories if needed.
    pub fn persist(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create manifest directory {}", parent.display())
            })?;
        }

        let serialized =
            serde_json::to_string_pretty(self).context("failed to serialize library manifest")?;
        fs::write(path, serialized)
            .with_context(|| format!("failed to write manifest {}", path.display()))
    }
}

/// Manifest location inside the games root (outside the live library).
pub fn manifest_path(games_root: impl AsRef<Path>) -> PathBuf {
    games_root.as_ref().join(".para-manifest.json")
}
