use std::{
    fs::{self, File},
    io::{self, BufReader},
    path::Path,
};

use tracing::{debug, error, info, warn};
use zip::ZipArchive;

use crate::error::InstallError;

/// Unpacks an archive into a staging directory and moves it over the live library.
pub trait ArchiveUnpacker: Send + Sync {
    /// Clear `staging` and unpack every entry of `archive` into it.
    fn extract(
        &self,
        archive: &Path,
        staging: &Path,
        progress: &mut dyn FnMut(u8),
    ) -> Result<(), InstallError>;

    /// Replace `live` with `staging`, parking the previous library at `aside` meanwhile.
    fn swap(&self, staging: &Path, live: &Path, aside: &Path) -> Result<(), InstallError>;
}

/// [`ArchiveUnpacker`] for zip archives.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipUnpacker;

impl ArchiveUnpacker for ZipUnpacker {
    fn extract(
        &self,
        archive: &Path,
        staging: &Path,
        progress: &mut dyn FnMut(u8),
    ) -> Result<(), InstallError> {
        let extract_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| InstallError::Extract { path, source }
        };
        let corrupt = |source| InstallError::CorruptArchive {
            path: archive.to_path_buf(),
            source,
        };

        remove_dir_if_exists(staging).map_err(extract_err(staging))?;
        fs::create_dir_all(staging).map_err(extract_err(staging))?;

        let file = File::open(archive).map_err(extract_err(archive))?;
        let mut zip = ZipArchive::new(BufReader::new(file)).map_err(corrupt)?;
        let total = zip.len();
        info!(archive = %archive.display(), entries = total, "extracting archive");

        for index in 0..total {
            let mut entry = zip.by_index(index).map_err(corrupt)?;
            let Some(relative) = entry.enclosed_name().map(Path::to_path_buf) else {
                warn!(name = entry.name(), "skipping archive entry with unsafe path");
                continue;
            };
            let target = staging.join(relative);

            if entry.is_dir() {
                fs::create_dir_all(&target).map_err(extract_err(&target))?;
            } else {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent).map_err(extract_err(parent))?;
                }
                let mut out = File::create(&target).map_err(extract_err(&target))?;
                io::copy(&mut entry, &mut out).map_err(extract_err(&target))?;
                #[cfg(unix)]
                if let Some(mode) = entry.unix_mode() {
                    use std::os::unix::fs::PermissionsExt;
                    fs::set_permissions(&target, fs::Permissions::from_mode((mode & 0o777) | 0o600))
                        .map_err(extract_err(&target))?;
                }
            }

            progress(((index + 1) * 100 / total) as u8);
        }

        if total == 0 {
            progress(100);
        }
        debug!(staging = %staging.display(), "archive extracted");
        Ok(())
    }

    fn swap(&self, staging: &Path, live: &Path, aside: &Path) -> Result<(), InstallError> {
        let swap_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| InstallError::SwapFailed { path, source }
        };

        if !staging.is_dir() {
            return Err(InstallError::SwapFailed {
                path: staging.to_path_buf(),
                source: io::Error::new(io::ErrorKind::NotFound, "staging directory missing"),
            });
        }

        recover_interrupted_swap(live, aside).map_err(swap_err(aside))?;
        remove_dir_if_exists(aside).map_err(swap_err(aside))?;

        let had_live = live.exists();
        if had_live {
            fs::rename(live, aside).map_err(swap_err(live))?;
        }

        if let Err(source) = fs::rename(staging, live) {
            if had_live {
                if let Err(err) = fs::rename(aside, live) {
                    error!(?err, aside = %aside.display(), "failed to restore previous library");
                }
            }
            return Err(InstallError::SwapFailed {
                path: live.to_path_buf(),
                source,
            });
        }

        if had_live {
            if let Err(err) = fs::remove_dir_all(aside) {
                warn!(?err, aside = %aside.display(), "failed to delete previous library");
            }
        }
        info!(live = %live.display(), "library replaced");
        Ok(())
    }
}

/// Move a library left at `aside` by an interrupted swap back to `live`.
///
/// Returns whether anything was restored.
pub fn recover_interrupted_swap(live: &Path, aside: &Path) -> io::Result<bool> {
    if live.exists() || !aside.is_dir() {
        return Ok(false);
    }
    warn!(aside = %aside.display(), "restoring library from interrupted update");
    fs::rename(aside, live)?;
    Ok(true)
}

fn remove_dir_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_dir_all(path) {
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::FailureKind,
        test_support::{two_game_archive, zip_bytes},
    };
    use anyhow::Result;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn names_in(dir: &Path) -> Result<Vec<String>> {
        let mut names: Vec<_> = fs::read_dir(dir)?
            .map(|entry| entry.map(|e| e.file_name().to_string_lossy().to_string()))
            .collect::<io::Result<_>>()?;
        names.sort();
        Ok(names)
    }

    struct Fixture {
        _temp: tempfile::TempDir,
        archive: PathBuf,
        staging: PathBuf,
        live: PathBuf,
        aside: PathBuf,
    }

    fn fixture(archive_bytes: &[u8]) -> Result<Fixture> {
        let temp = tempdir()?;
        let archive = temp.path().join("games.zip");
        fs::write(&archive, archive_bytes)?;
        Ok(Fixture {
            archive,
            staging: temp.path().join("new"),
            live: temp.path().join("all"),
            aside: temp.path().join("old"),
            _temp: temp,
        })
    }

    #[test]
    fn extracts_all_entries_with_progress() -> Result<()> {
        let fx = fixture(&two_game_archive())?;
        let mut seen = Vec::new();
        ZipUnpacker.extract(&fx.archive, &fx.staging, &mut |value| seen.push(value))?;

        assert_eq!(names_in(&fx.staging)?, vec!["snake", "tetris"]);
        assert!(fx.staging.join("tetris/para_info.txt").is_file());
        assert!(seen.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(seen.last().copied(), Some(100));
        Ok(())
    }

    #[test]
    fn extract_clears_stale_staging_content() -> Result<()> {
        let fx = fixture(&two_game_archive())?;
        fs::create_dir_all(fx.staging.join("leftover"))?;
        fs::write(fx.staging.join("leftover/para_info.txt"), "{}")?;

        ZipUnpacker.extract(&fx.archive, &fx.staging, &mut |_| {})?;
        assert_eq!(names_in(&fx.staging)?, vec!["snake", "tetris"]);
        Ok(())
    }

    #[test]
    fn corrupt_archive_is_reported_and_staging_kept() -> Result<()> {
        let fx = fixture(b"this is not a zip file")?;
        let err = ZipUnpacker
            .extract(&fx.archive, &fx.staging, &mut |_| {})
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::CorruptArchive);
        assert!(matches!(err, InstallError::CorruptArchive { .. }));
        assert!(fx.staging.is_dir());
        Ok(())
    }

    #[test]
    fn truncated_archive_is_corrupt() -> Result<()> {
        let bytes = two_game_archive();
        let fx = fixture(&bytes[..bytes.len() / 2])?;
        let err = ZipUnpacker
            .extract(&fx.archive, &fx.staging, &mut |_| {})
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::CorruptArchive);
        Ok(())
    }

    #[test]
    fn unsafe_entries_are_skipped() -> Result<()> {
        let fx = fixture(&zip_bytes(&[
            ("../escape.txt", "nope"),
            ("pong/para_info.txt", "{}"),
        ]))?;
        ZipUnpacker.extract(&fx.archive, &fx.staging, &mut |_| {})?;

        assert_eq!(names_in(&fx.staging)?, vec!["pong"]);
        assert!(!fx.staging.parent().unwrap().join("escape.txt").exists());
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn restores_executable_bits() -> Result<()> {
        use std::io::{Cursor, Write};
        use std::os::unix::fs::PermissionsExt;
        use zip::{write::FileOptions, ZipWriter};

        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer.start_file("pong/run.sh", FileOptions::default().unix_permissions(0o755))?;
        writer.write_all(b"#!/bin/sh\n")?;
        let bytes = writer.finish()?.into_inner();

        let fx = fixture(&bytes)?;
        ZipUnpacker.extract(&fx.archive, &fx.staging, &mut |_| {})?;
        let mode = fs::metadata(fx.staging.join("pong/run.sh"))?.permissions().mode();
        assert_ne!(mode & 0o111, 0);
        Ok(())
    }

    #[test]
    fn swap_replaces_whole_library() -> Result<()> {
        let fx = fixture(&two_game_archive())?;
        fs::create_dir_all(fx.live.join("old-game"))?;
        fs::create_dir_all(fx.live.join("tetris"))?;
        fs::write(fx.live.join("tetris/stale.txt"), "old")?;

        ZipUnpacker.extract(&fx.archive, &fx.staging, &mut |_| {})?;
        ZipUnpacker.swap(&fx.staging, &fx.live, &fx.aside)?;

        assert_eq!(names_in(&fx.live)?, vec!["snake", "tetris"]);
        assert!(!fx.live.join("tetris/stale.txt").exists());
        assert!(!fx.staging.exists());
        assert!(!fx.aside.exists());
        Ok(())
    }

    #[test]
    fn swap_without_existing_library() -> Result<()> {
        let fx = fixture(&two_game_archive())?;
        ZipUnpacker.extract(&fx.archive, &fx.staging, &mut |_| {})?;
        ZipUnpacker.swap(&fx.staging, &fx.live, &fx.aside)?;
        assert_eq!(names_in(&fx.live)?, vec!["snake", "tetris"]);
        Ok(())
    }

    #[test]
    fn failed_swap_leaves_live_library_untouched() -> Result<()> {
        let fx = fixture(&two_game_archive())?;
        fs::create_dir_all(fx.live.join("pong"))?;

        let err = ZipUnpacker
            .swap(&fx.staging, &fx.live, &fx.aside)
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::SwapFailed);
        assert_eq!(names_in(&fx.live)?, vec!["pong"]);
        Ok(())
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn failed_rename_into_place_restores_previous_library() -> Result<()> {
        use std::os::unix::fs::MetadataExt;

        // A staging dir on another filesystem makes the final rename fail with EXDEV.
        let Ok(shm) = tempfile::tempdir_in("/dev/shm") else {
            return Ok(());
        };
        let fx = fixture(&two_game_archive())?;
        if fs::metadata(shm.path())?.dev() == fs::metadata(fx.archive.parent().unwrap())?.dev() {
            return Ok(());
        }
        let staging = shm.path().join("new");
        ZipUnpacker.extract(&fx.archive, &staging, &mut |_| {})?;
        fs::create_dir_all(fx.live.join("pong"))?;

        let err = ZipUnpacker
            .swap(&staging, &fx.live, &fx.aside)
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::SwapFailed);
        assert_eq!(names_in(&fx.live)?, vec!["pong"]);
        assert!(!fx.aside.exists());
        assert_eq!(names_in(&staging)?, vec!["snake", "tetris"]);
        Ok(())
    }

    #[test]
    fn interrupted_swap_is_recovered() -> Result<()> {
        let fx = fixture(&two_game_archive())?;
        fs::create_dir_all(fx.aside.join("pong"))?;

        assert!(recover_interrupted_swap(&fx.live, &fx.aside)?);
        assert_eq!(names_in(&fx.live)?, vec!["pong"]);
        assert!(!fx.aside.exists());
        assert!(!recover_interrupted_swap(&fx.live, &fx.aside)?);
        Ok(())
    }
}
