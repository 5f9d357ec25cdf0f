use std::{
    cmp::Ordering,
    fs, io,
    path::{Path, PathBuf},
};

use tracing::{debug, warn};

use crate::{
    config::LibraryLayout,
    error::StoreError,
    models::{descriptor_path, GameDescriptor},
};

/// Reads the live library. Every call rescans the directory; nothing is cached.
#[derive(Debug, Clone)]
pub struct LibraryStore {
    root: PathBuf,
}

impl LibraryStore {
    /// Store reading the live directory of `layout`.
    pub fn new(layout: &LibraryLayout) -> Self {
        Self::with_root(layout.live_dir())
    }

    /// Store reading an arbitrary library directory.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// All readable games, newest release first.
    ///
    /// A missing library directory yields an empty list, and a game whose
    /// descriptor cannot be read is logged and left out.
    pub fn list(&self) -> Vec<GameDescriptor> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(root = %self.root.display(), "library directory missing");
                return Vec::new();
            }
            Err(err) => {
                warn!(root = %self.root.display(), ?err, "failed to read library directory");
                return Vec::new();
            }
        };

        let mut games: Vec<GameDescriptor> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .filter_map(|dir| match load_game(&dir) {
                Ok(game) => Some(game),
                Err(err) => {
                    warn!("Skipping {}: {}", dir.display(), err);
                    None
                }
            })
            .collect();

        games.sort_by(newest_first);
        games
    }
}

/// Read the descriptor of a single game directory.
pub fn load_game(dir: &Path) -> Result<GameDescriptor, StoreError> {
    let path = descriptor_path(dir);
    let contents = fs::read_to_string(&path).map_err(|err| StoreError::CorruptDescriptor {
        path: path.clone(),
        reason: err.to_string(),
    })?;

    GameDescriptor::from_json(&contents, dir).map_err(|err| StoreError::CorruptDescriptor {
        path,
        reason: err.to_string(),
    })
}

fn newest_first(a: &GameDescriptor, b: &GameDescriptor) -> Ordering {
    b.release_date
        .cmp(&a.release_date)
        .then_with(|| a.folder_name().cmp(&b.folder_name()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DESCRIPTOR_FILE;
    use anyhow::Result;
    use tempfile::tempdir;

    fn write_game(root: &Path, folder: &str, name: &str, date: &str) -> Result<()> {
        let dir = root.join(folder);
        fs::create_dir_all(&dir)?;
        fs::write(
            dir.join(DESCRIPTOR_FILE),
            format!(r#"{{"name": "{name}", "author": "someone", "releaseDate": "{date}"}}"#),
        )?;
        Ok(())
    }

    #[test]
    fn missing_library_lists_nothing() {
        let temp = tempdir().unwrap();
        let store = LibraryStore::with_root(temp.path().join("absent"));
        assert!(store.list().is_empty());
    }

    #[test]
    fn lists_valid_games_newest_first() -> Result<()> {
        let temp = tempdir()?;
        let root = temp.path();
        write_game(root, "snake", "Snake", "2018-05-01 10:00")?;
        write_game(root, "tetris", "Tetris", "2019-03-01 18:30")?;
        write_game(root, "pong", "Pong", "2017-12-24 09:15")?;

        let names: Vec<_> = LibraryStore::with_root(root)
            .list()
            .into_iter()
            .map(|game| game.name)
            .collect();
        assert_eq!(names, vec!["Tetris", "Snake", "Pong"]);
        Ok(())
    }

    #[test]
    fn skips_malformed_and_missing_descriptors() -> Result<()> {
        let temp = tempdir()?;
        let root = temp.path();
        write_game(root, "snake", "Snake", "2018-05-01 10:00")?;
        write_game(root, "tetris", "Tetris", "2019-03-01 18:30")?;

        let broken = root.join("broken");
        fs::create_dir_all(&broken)?;
        fs::write(broken.join(DESCRIPTOR_FILE), "{ not json")?;

        let undated = root.join("undated");
        fs::create_dir_all(&undated)?;
        fs::write(
            undated.join(DESCRIPTOR_FILE),
            r#"{"name": "Undated", "author": "x", "releaseDate": "soon"}"#,
        )?;

        fs::create_dir_all(root.join("empty"))?;
        fs::write(root.join("stray.txt"), "ignored")?;

        let games = LibraryStore::with_root(root).list();
        let names: Vec<_> = games.iter().map(|game| game.name.as_str()).collect();
        assert_eq!(names, vec!["Tetris", "Snake"]);
        for game in &games {
            assert!(game.path.is_dir());
            assert!(game.descriptor_path().is_file());
        }
        Ok(())
    }

    #[test]
    fn equal_dates_order_by_folder_name() -> Result<()> {
        let temp = tempdir()?;
        let root = temp.path();
        write_game(root, "zeta", "Zeta", "2020-01-01 00:00")?;
        write_game(root, "alpha", "Alpha", "2020-01-01 00:00")?;
        write_game(root, "mid", "Mid", "2020-01-01 00:00")?;

        let folders: Vec<_> = LibraryStore::with_root(root)
            .list()
            .iter()
            .map(GameDescriptor::folder_name)
            .collect();
        assert_eq!(folders, vec!["alpha", "mid", "zeta"]);
        Ok(())
    }

    #[test]
    fn load_game_reports_corrupt_descriptor() -> Result<()> {
        let temp = tempdir()?;
        let err = load_game(temp.path()).unwrap_err();
        assert_eq!(err.kind(), crate::error::FailureKind::CorruptDescriptor);
        Ok(())
    }
}
