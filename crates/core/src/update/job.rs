#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use crate::{config::LibraryLayout, error::FailureKind};

use super::events::JobOutcome;

/// Position of an update job in its pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Fetching,
    Extracting,
    Swapping,
    Done,
    Failed(FailureKind),
}

impl Stage {
    /// Label shown while the job sits in this stage.
    pub fn label(self) -> &'static str {
        match self {
            Stage::Idle => "Waiting",
            Stage::Fetching => "Downloading",
            Stage::Extracting => "Extracting",
            Stage::Swapping => "Replacing games",
            Stage::Done => "Games updated",
            Stage::Failed(_) => "Update failed",
        }
    }

    /// Failure a stage turns into when its work errors.
    pub fn failure(self) -> Option<FailureKind> {
        match self {
            Stage::Fetching => Some(FailureKind::NetworkFailure),
            Stage::Extracting => Some(FailureKind::CorruptArchive),
            Stage::Swapping => Some(FailureKind::SwapFailed),
            _ => None,
        }
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_advance_to(self, next: Stage) -> bool {
        match (self, next) {
            (Stage::Idle, Stage::Fetching)
            | (Stage::Fetching, Stage::Extracting)
            | (Stage::Extracting, Stage::Swapping)
            | (Stage::Swapping, Stage::Done) => true,
            (current, Stage::Failed(kind)) => current.failure() == Some(kind),
            _ => false,
        }
    }
}

/// One update attempt, owned by the coordinator for its whole lifetime.
#[derive(Debug)]
pub struct UpdateJob {
    url: String,
    archive_path: PathBuf,
    staging_dir: PathBuf,
    live_dir: PathBuf,
    aside_dir: PathBuf,
    stage: Stage,
}

impl UpdateJob {
    /// Fresh job in the `Idle` stage.
    pub fn new(url: impl Into<String>, layout: &LibraryLayout) -> Self {
        Self {
            url: url.into(),
            archive_path: layout.archive_path(),
            staging_dir: layout.staging_dir(),
            live_dir: layout.live_dir(),
            aside_dir: layout.aside_dir(),
            stage: Stage::Idle,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn archive_path(&self) -> &Path {
        &self.archive_path
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    pub fn live_dir(&self) -> &Path {
        &self.live_dir
    }

    pub fn aside_dir(&self) -> &Path {
        &self.aside_dir
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Outcome once the job reached a terminal stage.
    pub fn outcome(&self) -> Option<JobOutcome> {
        match self.stage {
            Stage::Done => Some(JobOutcome::Succeeded),
            Stage::Failed(kind) => Some(JobOutcome::Failed(kind)),
            _ => None,
        }
    }

    pub(crate) fn advance(&mut self, next: Stage) {
        debug_assert!(
            self.stage.can_advance_to(next),
            "illegal transition {:?} -> {:?}",
            self.stage,
            next
        );
        self.stage = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_transitions_are_allowed() {
        let path = [
            Stage::Idle,
            Stage::Fetching,
            Stage::Extracting,
            Stage::Swapping,
            Stage::Done,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_advance_to(pair[1]), "{:?}", pair);
        }
        assert!(!Stage::Idle.can_advance_to(Stage::Done));
        assert!(!Stage::Fetching.can_advance_to(Stage::Swapping));
    }

    #[test]
    fn failures_match_their_stage() {
        assert!(Stage::Fetching.can_advance_to(Stage::Failed(FailureKind::NetworkFailure)));
        assert!(Stage::Extracting.can_advance_to(Stage::Failed(FailureKind::CorruptArchive)));
        assert!(Stage::Swapping.can_advance_to(Stage::Failed(FailureKind::SwapFailed)));
        assert!(!Stage::Fetching.can_advance_to(Stage::Failed(FailureKind::SwapFailed)));
        assert!(!Stage::Idle.can_advance_to(Stage::Failed(FailureKind::NetworkFailure)));
    }

    #[test]
    fn terminal_stages_are_absorbing() {
        let terminal = [Stage::Done, Stage::Failed(FailureKind::CorruptArchive)];
        let all = [
            Stage::Idle,
            Stage::Fetching,
            Stage::Extracting,
            Stage::Swapping,
            Stage::Done,
            Stage::Failed(FailureKind::NetworkFailure),
            Stage::Failed(FailureKind::CorruptArchive),
            Stage::Failed(FailureKind::SwapFailed),
        ];
        for from in terminal {
            for to in all {
                assert!(!from.can_advance_to(to), "{:?} -> {:?}", from, to);
            }
        }
    }

    #[test]
    fn job_paths_come_from_layout() {
        let layout = LibraryLayout::new("/base");
        let job = UpdateJob::new("http://host/all.zip", &layout);
        assert_eq!(job.stage(), Stage::Idle);
        assert_eq!(job.outcome(), None);
        assert_eq!(job.archive_path(), layout.archive_path());
        assert_eq!(job.staging_dir(), layout.staging_dir());
        assert_eq!(job.live_dir(), layout.live_dir());
    }
}
