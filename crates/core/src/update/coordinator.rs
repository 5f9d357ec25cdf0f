use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Result;
use parking_lot::Mutex;
use tokio::task::{self, JoinHandle};
use tracing::{error, info, warn};

use crate::{
    config::{AppConfig, LibraryLayout},
    error::{FailureKind, FetchError, InstallError, UpdateError},
    library::LibraryStore,
    manifest::LibraryManifest,
};

use super::{
    events::{EventSender, JobEvent, JobOutcome, PercentReporter},
    fetch::{ArchiveSource, HttpArchiveSource},
    install::{ArchiveUnpacker, ZipUnpacker},
    job::{Stage, UpdateJob},
};

/// Runs one update job: fetch, extract, swap, reload.
pub struct Coordinator {
    layout: LibraryLayout,
    source: Arc<dyn ArchiveSource>,
    unpacker: Arc<dyn ArchiveUnpacker>,
    store: LibraryStore,
}

impl Coordinator {
    /// Coordinator with explicit stage implementations.
    pub fn new(
        layout: LibraryLayout,
        source: Arc<dyn ArchiveSource>,
        unpacker: Arc<dyn ArchiveUnpacker>,
    ) -> Self {
        let store = LibraryStore::new(&layout);
        Self {
            layout,
            source,
            unpacker,
            store,
        }
    }

    /// Coordinator downloading over HTTP and unpacking zip archives.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let source = HttpArchiveSource::new(&config.http)?;
        Ok(Self::new(
            config.layout(),
            Arc::new(source),
            Arc::new(ZipUnpacker),
        ))
    }

    /// Layout this coordinator installs into.
    pub fn layout(&self) -> &LibraryLayout {
        &self.layout
    }

    /// Run a complete job for `url`, ending with exactly one [`JobEvent::Finished`].
    pub async fn run(&self, url: &str, events: &EventSender) -> JobOutcome {
        let outcome = self.run_stages(url, events, &Mutex::new(Stage::Idle)).await;
        let _ = events.send(JobEvent::Finished(outcome));
        outcome
    }

    /// Drive `url` through every stage, mirroring the current stage into `reached`.
    async fn run_stages(
        &self,
        url: &str,
        events: &EventSender,
        reached: &Mutex<Stage>,
    ) -> JobOutcome {
        let mut job = UpdateJob::new(url, &self.layout);
        info!(url, "starting library update");

        self.transition(&mut job, Stage::Fetching, events, reached);
        if let Err(err) = self.fetch(&job, events).await {
            error!(url, %err, "archive download failed");
            discard_file(job.archive_path());
            return self.fail(&mut job, FailureKind::NetworkFailure, events, reached);
        }

        self.transition(&mut job, Stage::Extracting, events, reached);
        if let Err(err) = self.extract(&job, events).await {
            error!(url, %err, "archive extraction failed");
            return self.fail(&mut job, FailureKind::CorruptArchive, events, reached);
        }

        self.transition(&mut job, Stage::Swapping, events, reached);
        if let Err(err) = self.swap(&job).await {
            error!(url, %err, "library swap failed");
            return self.fail(&mut job, FailureKind::SwapFailed, events, reached);
        }

        self.transition(&mut job, Stage::Done, events, reached);
        discard_file(job.archive_path());

        let store = self.store.clone();
        let games = task::spawn_blocking(move || store.list())
            .await
            .unwrap_or_else(|err| {
                error!(?err, "library listing task failed");
                Vec::new()
            });

        if let Err(err) =
            LibraryManifest::new(url, games.len()).persist(self.layout.manifest_path())
        {
            warn!(?err, "failed to record update manifest");
        }

        info!(url, games = games.len(), "library update finished");
        let _ = events.send(JobEvent::LibraryChanged(games));
        debug_assert_eq!(job.outcome(), Some(JobOutcome::Succeeded));
        JobOutcome::Succeeded
    }

    fn transition(
        &self,
        job: &mut UpdateJob,
        next: Stage,
        events: &EventSender,
        reached: &Mutex<Stage>,
    ) {
        job.advance(next);
        *reached.lock() = next;
        let percent = match next {
            Stage::Fetching | Stage::Extracting => Some(0),
            Stage::Done => Some(100),
            _ => None,
        };
        let _ = events.send(JobEvent::Progress {
            label: next.label().to_string(),
            percent,
        });
    }

    fn fail(
        &self,
        job: &mut UpdateJob,
        kind: FailureKind,
        events: &EventSender,
        reached: &Mutex<Stage>,
    ) -> JobOutcome {
        self.transition(job, Stage::Failed(kind), events, reached);
        let _ = events.send(JobEvent::Error(kind.user_message().to_string()));
        JobOutcome::Failed(kind)
    }

    async fn fetch(&self, job: &UpdateJob, events: &EventSender) -> Result<(), FetchError> {
        if let Some(parent) = job.archive_path().parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| FetchError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        let mut reporter = PercentReporter::new(events.clone(), Stage::Fetching.label());
        self.source
            .fetch(job.url(), job.archive_path(), &mut |value| {
                reporter.report(value)
            })
            .await
    }

    async fn extract(&self, job: &UpdateJob, events: &EventSender) -> Result<(), InstallError> {
        let unpacker = self.unpacker.clone();
        let archive = job.archive_path().to_path_buf();
        let staging = job.staging_dir().to_path_buf();
        let mut reporter = PercentReporter::new(events.clone(), Stage::Extracting.label());

        let on_panic = |path: PathBuf, source: io::Error| InstallError::Extract { path, source };
        blocking(staging.clone(), on_panic, move || {
            unpacker.extract(&archive, &staging, &mut |value| reporter.report(value))
        })
        .await
    }

    async fn swap(&self, job: &UpdateJob) -> Result<(), InstallError> {
        let unpacker = self.unpacker.clone();
        let staging = job.staging_dir().to_path_buf();
        let live = job.live_dir().to_path_buf();
        let aside = job.aside_dir().to_path_buf();

        let on_panic = |path: PathBuf, source: io::Error| InstallError::SwapFailed { path, source };
        blocking(live.clone(), on_panic, move || {
            unpacker.swap(&staging, &live, &aside)
        })
        .await
    }
}

/// Run blocking stage work off the async runtime, turning a panicked task into `on_panic`.
async fn blocking<F>(
    path: PathBuf,
    on_panic: fn(PathBuf, io::Error) -> InstallError,
    work: F,
) -> Result<(), InstallError>
where
    F: FnOnce() -> Result<(), InstallError> + Send + 'static,
{
    match task::spawn_blocking(work).await {
        Ok(result) => result,
        Err(err) => Err(on_panic(path, io::Error::new(io::ErrorKind::Other, err.to_string()))),
    }
}

fn discard_file(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => warn!(?err, path = %path.display(), "failed to delete downloaded archive"),
    }
}

/// Allows at most one update job at a time.
pub struct Updater {
    coordinator: Arc<Coordinator>,
    active: Arc<Mutex<Option<String>>>,
}

impl Updater {
    /// Gate around `coordinator`.
    pub fn new(coordinator: Coordinator) -> Self {
        Self {
            coordinator: Arc::new(coordinator),
            active: Arc::new(Mutex::new(None)),
        }
    }

    /// Whether a job is in flight.
    pub fn is_running(&self) -> bool {
        self.active.lock().is_some()
    }

    /// URL of the job in flight, if any.
    pub fn active_url(&self) -> Option<String> {
        self.active.lock().clone()
    }

    /// Spawn a job for `url` on the tokio runtime.
    ///
    /// The slot is released before the job's `Finished` event is sent, so a
    /// consumer reacting to `Finished` can start the next job immediately.
    /// A job task that panics still ends with one `Error` and one `Finished`,
    /// failed as the stage it had reached.
    pub fn start(
        &self,
        url: impl Into<String>,
        events: EventSender,
    ) -> Result<JoinHandle<JobOutcome>, UpdateError> {
        let url = url.into();
        {
            let mut active = self.active.lock();
            if active.is_some() {
                return Err(UpdateError::AlreadyRunning);
            }
            *active = Some(url.clone());
        }

        let coordinator = Arc::clone(&self.coordinator);
        let slot = ActiveSlot(Arc::clone(&self.active));
        let reached = Arc::new(Mutex::new(Stage::Idle));
        let job = {
            let events = events.clone();
            let reached = Arc::clone(&reached);
            tokio::spawn(async move { coordinator.run_stages(&url, &events, &reached).await })
        };

        Ok(tokio::spawn(async move {
            let outcome = match job.await {
                Ok(outcome) => outcome,
                Err(err) => {
                    let stage = *reached.lock();
                    error!(?err, ?stage, "update task aborted");
                    let outcome = aborted_outcome(stage);
                    if let JobOutcome::Failed(kind) = outcome {
                        if !matches!(stage, Stage::Failed(_)) {
                            let _ = events.send(JobEvent::Error(kind.user_message().to_string()));
                        }
                    }
                    outcome
                }
            };
            drop(slot);
            let _ = events.send(JobEvent::Finished(outcome));
            outcome
        }))
    }
}

/// Outcome of a job whose task died in `stage`.
fn aborted_outcome(stage: Stage) -> JobOutcome {
    match stage {
        Stage::Done => JobOutcome::Succeeded,
        Stage::Failed(kind) => JobOutcome::Failed(kind),
        Stage::Idle | Stage::Fetching => JobOutcome::Failed(FailureKind::NetworkFailure),
        Stage::Extracting => JobOutcome::Failed(FailureKind::CorruptArchive),
        Stage::Swapping => JobOutcome::Failed(FailureKind::SwapFailed),
    }
}

struct ActiveSlot(Arc<Mutex<Option<String>>>);

impl Drop for ActiveSlot {
    fn drop(&mut self) {
        self.0.lock().take();
    }
}
