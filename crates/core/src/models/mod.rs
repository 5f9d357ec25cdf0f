//! Shared domain models.

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::Deserialize;

/// File name of the per-game descriptor.
pub const DESCRIPTOR_FILE: &str = "para_info.txt";
/// Textual format of `releaseDate` in descriptors.
pub const RELEASE_DATE_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Metadata read from a game's `para_info.txt`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameDescriptor {
    /// Display name of the game.
    pub name: String,
    /// Author credit.
    pub author: String,
    /// Release timestamp, used for ordering.
    pub release_date: NaiveDateTime,
    /// Directory the descriptor was read from. Not part of the file.
    pub path: PathBuf,
}

/// Reason a descriptor could not be turned into a [`GameDescriptor`].
#[derive(Debug, thiserror::Error)]
pub enum DescriptorError {
    /// Not JSON, or required fields missing or mistyped.
    #[error("invalid descriptor: {0}")]
    Json(#[from] serde_json::Error),
    /// `releaseDate` does not match `YYYY-MM-DD HH:MM`.
    #[error("invalid releaseDate {value:?}: {source}")]
    ReleaseDate {
        /// Raw value found in the file.
        value: String,
        /// Parser failure.
        #[source]
        source: chrono::ParseError,
    },
}

#[derive(Debug, Deserialize)]
struct RawDescriptor {
    name: String,
    author: String,
    #[serde(rename = "releaseDate")]
    release_date: String,
}

impl GameDescriptor {
    /// Parse descriptor JSON belonging to the game directory `path`.
    pub fn from_json(contents: &str, path: impl Into<PathBuf>) -> Result<Self, DescriptorError> {
        let raw: RawDescriptor = serde_json::from_str(contents)?;
        let release_date =
            NaiveDateTime::parse_from_str(raw.release_date.trim(), RELEASE_DATE_FORMAT).map_err(
                |source| DescriptorError::ReleaseDate {
                    value: raw.release_date.clone(),
                    source,
                },
            )?;

        Ok(Self {
            name: raw.name,
            author: raw.author,
            release_date,
            path: path.into(),
        })
    }

    /// Name of the game's directory inside the library.
    pub fn folder_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    /// Release date formatted for the table (`YYYY-MM-DD`).
    pub fn release_day(&self) -> String {
        self.release_date.format("%Y-%m-%d").to_string()
    }

    /// Path of the descriptor file.
    pub fn descriptor_path(&self) -> PathBuf {
        descriptor_path(&self.path)
    }
}

/// Descriptor location for a game directory.
pub fn descriptor_path(game_dir: &Path) -> PathBuf {
    game_dir.join(DESCRIPTOR_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_required_fields_and_ignores_extras() {
        let json = r#"{
            "name": "Tetris",
            "author": "faiface",
            "releaseDate": "2019-03-01 18:30",
            "tags": ["puzzle"]
        }"#;
        let game = GameDescriptor::from_json(json, "/lib/all/tetris").unwrap();
        assert_eq!(game.name, "Tetris");
        assert_eq!(game.author, "faiface");
        assert_eq!(game.release_day(), "2019-03-01");
        assert_eq!(game.folder_name(), "tetris");
        assert_eq!(
            game.descriptor_path(),
            PathBuf::from("/lib/all/tetris").join(DESCRIPTOR_FILE)
        );
    }

    #[test]
    fn rejects_missing_fields() {
        let err = GameDescriptor::from_json(r#"{"name": "Snake"}"#, "/lib/all/snake").unwrap_err();
        assert!(matches!(err, DescriptorError::Json(_)));
    }

    #[test]
    fn rejects_unparsable_release_date() {
        let json = r#"{"name": "Snake", "author": "x", "releaseDate": "yesterday"}"#;
        let err = GameDescriptor::from_json(json, "/lib/all/snake").unwrap_err();
        match err {
            DescriptorError::ReleaseDate { value, .. } => assert_eq!(value, "yesterday"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
