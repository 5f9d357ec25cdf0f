//! One-shot installation of the game runtime.

use std::process::Stdio;

use tokio::{process::Command, task::JoinHandle};
use tracing::{error, info};

use crate::{
    config::DependencyConfig,
    error::FailureKind,
    update::{
        events::{progress, EventSender},
        JobEvent, JobOutcome,
    },
};

/// Runs the configured installer command and reports through job events.
#[derive(Debug, Clone)]
pub struct DependencyInstaller {
    config: DependencyConfig,
}

impl DependencyInstaller {
    /// Installer for `config.label`.
    pub fn new(config: DependencyConfig) -> Self {
        Self { config }
    }

    /// What is being installed, for display.
    pub fn label(&self) -> &str {
        &self.config.label
    }

    /// Run the installer on the tokio runtime.
    pub fn start(&self, events: EventSender) -> JoinHandle<JobOutcome> {
        let installer = self.clone();
        tokio::spawn(async move { installer.run(&events).await })
    }

    /// Run the installer to completion, ending with one [`JobEvent::Finished`].
    pub async fn run(&self, events: &EventSender) -> JobOutcome {
        let label = format!("Installing {}", self.config.label);
        progress(events, label.clone());
        info!(program = %self.config.program, args = ?self.config.args, "installing runtime");

        let result = Command::new(&self.config.program)
            .args(&self.config.args)
            .stdin(Stdio::null())
            .output()
            .await;

        let outcome = match result {
            Ok(output) if output.status.success() => {
                info!(label = %self.config.label, "runtime installed");
                let _ = events.send(JobEvent::Progress {
                    label: format!("Installed {}", self.config.label),
                    percent: Some(100),
                });
                JobOutcome::Succeeded
            }
            Ok(output) => {
                error!(
                    status = %output.status,
                    stderr = %String::from_utf8_lossy(&output.stderr),
                    "runtime installer failed"
                );
                self.fail(events)
            }
            Err(err) => {
                error!(?err, program = %self.config.program, "failed to start runtime installer");
                self.fail(events)
            }
        };

        let _ = events.send(JobEvent::Finished(outcome));
        outcome
    }

    fn fail(&self, events: &EventSender) -> JobOutcome {
        let kind = FailureKind::DependencyFailed;
        let _ = events.send(JobEvent::Error(kind.user_message().to_string()));
        JobOutcome::Failed(kind)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn installer(program: &str) -> DependencyInstaller {
        DependencyInstaller::new(DependencyConfig {
            label: "runtime".to_string(),
            program: program.to_string(),
            args: Vec::new(),
        })
    }

    fn collect(rx: &mut mpsc::UnboundedReceiver<JobEvent>) -> Vec<JobEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn successful_install_finishes_cleanly() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        assert_eq!(installer("true").run(&tx).await, JobOutcome::Succeeded);

        let events = collect(&mut rx);
        assert_eq!(
            events.first(),
            Some(&JobEvent::Progress {
                label: "Installing runtime".to_string(),
                percent: None,
            })
        );
        assert!(!events.iter().any(|event| matches!(event, JobEvent::Error(_))));
        assert_eq!(events.last(), Some(&JobEvent::Finished(JobOutcome::Succeeded)));
    }

    #[tokio::test]
    async fn failing_install_reports_one_error() {
        for program in ["false", "para-no-such-installer"] {
            let (tx, mut rx) = mpsc::unbounded_channel();
            let failed = JobOutcome::Failed(FailureKind::DependencyFailed);
            assert_eq!(installer(program).start(tx).await.unwrap(), failed);

            let events = collect(&mut rx);
            let errors = events
                .iter()
                .filter(|event| matches!(event, JobEvent::Error(_)))
                .count();
            assert_eq!(errors, 1, "{program}");
            assert_eq!(events.last(), Some(&JobEvent::Finished(failed)));
        }
    }
}
