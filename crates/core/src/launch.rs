//! Starting installed games as detached processes.

use std::{
    fs::{self, File},
    path::{Path, PathBuf},
    process::{ExitStatus, Stdio},
};

use chrono::Local;
use tokio::{process::Command, task::JoinHandle};
use tracing::{info, warn};

use crate::{config::LaunchConfig, error::LaunchError};

#[cfg(windows)]
const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
#[cfg(windows)]
const DETACHED_PROCESS: u32 = 0x0000_0008;

/// A game process that was started successfully.
#[derive(Debug)]
pub struct LaunchHandle {
    /// OS process id, when the platform still reports one.
    pub pid: Option<u32>,
    /// Directory the game runs in.
    pub game_dir: PathBuf,
    /// File receiving the game's stderr. Removed again after a clean exit.
    pub crash_report: PathBuf,
    /// Resolves once the game has exited and its crash report was handled.
    pub exited: JoinHandle<Option<ExitStatus>>,
}

/// Runs a game's entry point with the configured interpreter.
#[derive(Debug, Clone)]
pub struct Launcher {
    config: LaunchConfig,
}

impl Launcher {
    /// Launcher using `config.program` to run `config.entry_point`.
    pub fn new(config: LaunchConfig) -> Self {
        Self { config }
    }

    /// Entry point file of the game in `game_dir`.
    pub fn entry_point(&self, game_dir: &Path) -> PathBuf {
        game_dir.join(&self.config.entry_point)
    }

    /// Start the game in `game_dir` without waiting for it.
    ///
    /// The child runs with `game_dir` as its working directory and without
    /// inherited stdio. Its stderr goes to a `crash_report_*.txt` file in
    /// `game_dir`, which is kept only when the game exits unsuccessfully.
    pub fn launch(&self, game_dir: &Path) -> Result<LaunchHandle, LaunchError> {
        let entry = self.entry_point(game_dir);
        if !entry.is_file() {
            return Err(LaunchError::MissingEntryPoint { path: entry });
        }

        let crash_report = game_dir.join(format!(
            "crash_report_{}.txt",
            Local::now().format("%Y%m%d_%H%M%S_%9f")
        ));
        let stderr = File::create(&crash_report).map_err(|source| LaunchError::CrashReport {
            path: crash_report.clone(),
            source,
        })?;

        let mut command = Command::new(&self.config.program);
        command
            .args(&self.config.args)
            .arg(&self.config.entry_point)
            .current_dir(game_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(stderr));

        #[cfg(unix)]
        command.process_group(0);
        #[cfg(windows)]
        command.creation_flags(CREATE_NEW_PROCESS_GROUP | DETACHED_PROCESS);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(source) => {
                discard_report(&crash_report);
                return Err(LaunchError::Spawn {
                    program: self.config.program.clone(),
                    dir: game_dir.to_path_buf(),
                    source,
                });
            }
        };
        let pid = child.id();
        info!(pid, dir = %game_dir.display(), "game started");

        let report = crash_report.clone();
        let exited = tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => {
                    info!(pid, "game exited");
                    discard_report(&report);
                    Some(status)
                }
                Ok(status) => {
                    warn!(pid, %status, report = %report.display(), "game exited with failure");
                    Some(status)
                }
                Err(err) => {
                    warn!(pid, ?err, report = %report.display(), "failed to wait for game process");
                    None
                }
            }
        });

        Ok(LaunchHandle {
            pid,
            game_dir: game_dir.to_path_buf(),
            crash_report,
            exited,
        })
    }
}

fn discard_report(path: &Path) {
    if let Err(err) = fs::remove_file(path) {
        warn!(?err, path = %path.display(), "failed to delete crash report");
    }
}
