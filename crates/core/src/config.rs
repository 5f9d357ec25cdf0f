//! Application configuration and the on-disk library layout.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::manifest;

/// Directory name under the platform config dir.
pub const APP_DIR: &str = "para";
/// Primary archive location.
pub const DEFAULT_DOWNLOAD_URL: &str = "https://people.ksp.sk/~faiface/osp_games/all.zip";
/// Alternate archive location used for testing new game bundles.
pub const DEFAULT_STAGING_URL: &str = "https://people.ksp.sk/~faiface/osp_games/stag.zip";

const CONFIG_FILE: &str = "config.toml";

const DEFAULT_CONFIG_TOML: &str = r#"# Para launcher configuration.
# Every key is optional; the values below are the built-in defaults.
# Environment variables prefixed with PARA_ override this file
# (e.g. PARA_DOWNLOAD_URL, PARA_HTTP__TIMEOUT_SECS).

# base_dir = "~/.para"
download_url = "https://people.ksp.sk/~faiface/osp_games/all.zip"
staging_url = "https://people.ksp.sk/~faiface/osp_games/stag.zip"

[http]
connect_timeout_secs = 15
# A download fails when no data arrives for this many seconds.
# There is no limit on the total download time.
stall_timeout_secs = 60

[launch]
# program = "python3"
args = []
entry_point = "game.py"

[dependency]
label = "pyglet"
# program = "python3"
args = ["-m", "pip", "install", "--no-input", "pyglet"]
"#;

/// Top-level launcher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Root for the game library and logs.
    pub base_dir: PathBuf,
    /// Archive fetched by a regular update.
    pub download_url: String,
    /// Alternate archive the UI can switch to at runtime.
    pub staging_url: String,
    /// Transport tuning for the archive fetcher.
    pub http: HttpConfig,
    /// How a game's entry point is started.
    pub launch: LaunchConfig,
    /// First-run runtime installer command.
    pub dependency: DependencyConfig,
}

/// Timeouts applied to archive downloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Seconds allowed to establish the connection.
    pub connect_timeout_secs: u64,
    /// Seconds the server may stay silent, before the response or between chunks.
    pub stall_timeout_secs: u64,
}

/// Command used to start a game.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchConfig {
    /// Interpreter or executable that runs the entry point.
    pub program: String,
    /// Extra arguments placed before the entry point.
    pub args: Vec<String>,
    /// Entry point file name relative to the game directory.
    pub entry_point: String,
}

/// Command used to install the runtime the games depend on.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DependencyConfig {
    /// Short name shown in progress messages.
    pub label: String,
    /// Installer executable.
    pub program: String,
    /// Installer arguments.
    pub args: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            download_url: DEFAULT_DOWNLOAD_URL.to_string(),
            staging_url: DEFAULT_STAGING_URL.to_string(),
            http: HttpConfig::default(),
            launch: LaunchConfig::default(),
            dependency: DependencyConfig::default(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 15,
            stall_timeout_secs: 60,
        }
    }
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            program: default_python().to_string(),
            args: Vec::new(),
            entry_point: "game.py".to_string(),
        }
    }
}

impl Default for DependencyConfig {
    fn default() -> Self {
        Self {
            label: "pyglet".to_string(),
            program: default_python().to_string(),
            args: ["-m", "pip", "install", "--no-input", "pyglet"]
                .iter()
                .map(|arg| arg.to_string())
                .collect(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default config file and environment.
    pub fn load() -> Result<Self> {
        Self::load_from(config_path())
    }

    /// Load configuration from `path` (optional) layered over defaults, then `PARA_*` variables.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let settings = Config::builder()
            .add_source(File::from(path).format(FileFormat::Toml).required(false))
            .add_source(
                Environment::with_prefix("PARA")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .with_context(|| format!("failed to read configuration {}", path.display()))?;

        settings
            .try_deserialize()
            .with_context(|| format!("invalid configuration in {}", path.display()))
    }

    /// Directory layout derived from `base_dir`.
    pub fn layout(&self) -> LibraryLayout {
        LibraryLayout::new(&self.base_dir)
    }
}

/// Location of the user configuration file.
pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join(CONFIG_FILE)
}

/// Write a commented default configuration if none exists yet.
pub fn ensure_default_config() -> Result<PathBuf> {
    let path = config_path();
    write_default_config(&path)?;
    Ok(path)
}

fn write_default_config(path: &Path) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create config directory {}", parent.display()))?;
    }
    fs::write(path, DEFAULT_CONFIG_TOML)
        .with_context(|| format!("failed to write default config {}", path.display()))
}

fn default_base_dir() -> PathBuf {
    if cfg!(windows) {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Para")
    } else {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".para")
    }
}

fn default_python() -> &'static str {
    if cfg!(windows) {
        "python"
    } else {
        "python3"
    }
}

/// Paths making up the game library, passed explicitly to every component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryLayout {
    base_dir: PathBuf,
}

impl LibraryLayout {
    /// Build a layout rooted at `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Root directory for everything the launcher writes.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Parent of the live, staging and aside directories.
    pub fn games_root(&self) -> PathBuf {
        self.base_dir.join("games")
    }

    /// The live library read by the store.
    pub fn live_dir(&self) -> PathBuf {
        self.games_root().join("all")
    }

    /// Extraction target; never read by the store.
    pub fn staging_dir(&self) -> PathBuf {
        self.games_root().join("new")
    }

    /// Where the previous library is parked while the new one is moved in.
    pub fn aside_dir(&self) -> PathBuf {
        self.games_root().join("old")
    }

    /// Download target for the archive.
    pub fn archive_path(&self) -> PathBuf {
        self.games_root().join("games.zip")
    }

    /// Record of the last successful update.
    pub fn manifest_path(&self) -> PathBuf {
        manifest::manifest_path(self.games_root())
    }

    /// Log file directory.
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// Create the live library directory if it is missing.
    pub fn ensure(&self) -> Result<()> {
        let live = self.live_dir();
        fs::create_dir_all(&live)
            .with_context(|| format!("failed to create library directory {}", live.display()))
    }
}
