mod app;

use anyhow::{Context, Result};
use std::{
    fs::{self, OpenOptions},
    sync::Mutex,
};

use para_core::{
    config::{self, AppConfig, LibraryLayout},
    deps::DependencyInstaller,
    launch::Launcher,
    library::LibraryWatcher,
    update::{recover_interrupted_swap, Coordinator, Updater},
};
use tokio::sync::mpsc;
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    config::ensure_default_config()?;
    let config = AppConfig::load()?;
    let layout = config.layout();
    init_logging(&layout)?;
    layout.ensure()?;

    if recover_interrupted_swap(&layout.live_dir(), &layout.aside_dir())
        .context("failed to restore library from interrupted update")?
    {
        tracing::warn!("Restored library left behind by an interrupted update");
    }

    let updater = Updater::new(Coordinator::from_config(&config)?);
    let launcher = Launcher::new(config.launch.clone());
    let installer = DependencyInstaller::new(config.dependency.clone());
    tracing::info!(base_dir = %layout.base_dir().display(), "Starting launcher");

    let mut app = app::ParaApp::new(config, updater, launcher, installer);
    let (library_tx, library_rx) = mpsc::unbounded_channel();
    match LibraryWatcher::spawn(&layout, library_tx) {
        Ok(watcher) => app.attach_watcher(watcher, library_rx),
        Err(err) => tracing::warn!(?err, "Library watcher unavailable"),
    }
    app.run().await
}

fn init_logging(layout: &LibraryLayout) -> Result<()> {
    let log_dir = layout.logs_dir();
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("failed to create log directory {}", log_dir.display()))?;
    let log_path = log_dir.join("para.log");
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("failed to open log file {}", log_path.display()))?;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_ansi(false)
        .compact()
        .with_writer(Mutex::new(log_file));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .init();

    Ok(())
}
