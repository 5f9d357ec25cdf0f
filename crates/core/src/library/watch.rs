use std::fs;

use anyhow::{Context, Result};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::warn;

use crate::config::LibraryLayout;

/// Notification sent when the live library changes on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LibraryEvent {
    /// Something beneath the live library directory was created, modified or removed.
    Changed,
}

/// Keeps a recursive watch on the games root alive while held.
pub struct LibraryWatcher {
    _watcher: RecommendedWatcher,
}

impl LibraryWatcher {
    /// Start watching `layout`'s games root, forwarding live-library changes to `sender`.
    ///
    /// Changes under the staging directory and the downloaded archive are ignored.
    pub fn spawn(layout: &LibraryLayout, sender: mpsc::UnboundedSender<LibraryEvent>) -> Result<Self> {
        let root = layout.games_root();
        fs::create_dir_all(&root)
            .with_context(|| format!("failed to create games directory {}", root.display()))?;
        // Backends report resolved paths.
        let root = fs::canonicalize(&root)
            .with_context(|| format!("failed to resolve games directory {}", root.display()))?;
        let live = root.join(layout.live_dir().file_name().unwrap_or_default());
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if event.kind.is_access() {
                    return;
                }
                if event.paths.iter().any(|path| path.starts_with(&live)) {
                    let _ = sender.send(LibraryEvent::Changed);
                }
            }
            Err(err) => warn!(?err, "library watcher error"),
        })
        .context("failed to create library watcher")?;

        watcher
            .watch(&root, RecursiveMode::Recursive)
            .with_context(|| format!("failed to watch {}", root.display()))?;

        Ok(Self { _watcher: watcher })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    #[tokio::test]
    async fn reports_live_changes_only() -> Result<()> {
        let temp = tempdir()?;
        let layout = LibraryLayout::new(temp.path());
        layout.ensure()?;
        fs::create_dir_all(layout.staging_dir())?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let _watcher = LibraryWatcher::spawn(&layout, tx)?;

        fs::write(layout.staging_dir().join("scratch.txt"), "x")?;
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(rx.try_recv().is_err(), "staging edits must not be reported");

        fs::create_dir_all(layout.live_dir().join("tetris"))?;
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await?;
        assert_eq!(event, Some(LibraryEvent::Changed));
        Ok(())
    }
}
