use tokio::sync::mpsc;

use crate::{error::FailureKind, models::GameDescriptor};

/// Notifications sent from a background job to the UI thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEvent {
    /// Human-readable stage label, with a percentage when one is known.
    Progress {
        /// What the job is doing.
        label: String,
        /// Completion of the current stage, `0..=100`.
        percent: Option<u8>,
    },
    /// User-facing failure message. Sent at most once per job.
    Error(String),
    /// The library was replaced; carries the fresh listing.
    LibraryChanged(Vec<GameDescriptor>),
    /// Last event of every job.
    Finished(JobOutcome),
}

/// Terminal result of a background job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// Every stage completed.
    Succeeded,
    /// The job stopped at the first failing stage.
    Failed(FailureKind),
}

/// Sending half of the job event channel.
pub type EventSender = mpsc::UnboundedSender<JobEvent>;

/// Emits a label without a percentage.
pub(crate) fn progress(events: &EventSender, label: impl Into<String>) {
    let _ = events.send(JobEvent::Progress {
        label: label.into(),
        percent: None,
    });
}

/// Forwards stage percentages, dropping repeats and regressions.
pub(crate) struct PercentReporter {
    events: EventSender,
    label: &'static str,
    last: Option<u8>,
}

impl PercentReporter {
    pub(crate) fn new(events: EventSender, label: &'static str) -> Self {
        Self {
            events,
            label,
            last: None,
        }
    }

    pub(crate) fn report(&mut self, percent: u8) {
        let percent = percent.min(100);
        if self.last.is_some_and(|last| percent <= last) {
            return;
        }
        self.last = Some(percent);
        let _ = self.events.send(JobEvent::Progress {
            label: self.label.to_string(),
            percent: Some(percent),
        });
    }
}
