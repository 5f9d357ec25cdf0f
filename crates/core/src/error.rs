#![allow(missing_docs)]

//! Error types for the update pipeline, library store and launcher.

use std::{io, path::PathBuf, time::Duration};

/// User-facing failure taxonomy. Each kind maps to exactly one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Transport or HTTP-level failure while downloading the archive.
    NetworkFailure,
    /// The downloaded archive could not be unpacked.
    CorruptArchive,
    /// The live library could not be replaced.
    SwapFailed,
    /// A single descriptor could not be read; the entry is skipped.
    CorruptDescriptor,
    /// The runtime installer failed to start or exited unsuccessfully.
    DependencyFailed,
}

impl FailureKind {
    /// Message shown to the user; technical detail goes to the log.
    pub fn user_message(self) -> &'static str {
        match self {
            FailureKind::NetworkFailure => {
                "Could not download the new games. Check your internet connection and try again."
            }
            FailureKind::CorruptArchive => {
                "The downloaded games could not be unpacked. Try updating again."
            }
            FailureKind::SwapFailed => {
                "The installed games could not be replaced with the new ones. Close any running games and try again."
            }
            FailureKind::CorruptDescriptor => {
                "Some games could not be read and were left out of the list."
            }
            FailureKind::DependencyFailed => {
                "Installing the game runtime failed. Try installing it manually."
            }
        }
    }
}

/// Failure while streaming the archive to disk.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} sent no data for {} seconds", .idle.as_secs())]
    Stalled { url: String, idle: Duration },

    #[error("{url} answered with HTTP {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("failed to write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl FetchError {
    /// Taxonomy entry for this failure.
    pub fn kind(&self) -> FailureKind {
        FailureKind::NetworkFailure
    }
}

/// Failure while unpacking or swapping the library.
#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    #[error("archive {} is corrupt: {source}", .path.display())]
    CorruptArchive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("failed to extract into {}: {source}", .path.display())]
    Extract {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to replace library at {}: {source}", .path.display())]
    SwapFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl InstallError {
    /// Taxonomy entry for this failure.
    pub fn kind(&self) -> FailureKind {
        match self {
            InstallError::CorruptArchive { .. } | InstallError::Extract { .. } => {
                FailureKind::CorruptArchive
            }
            InstallError::SwapFailed { .. } => FailureKind::SwapFailed,
        }
    }
}

/// Failure reading a single game's descriptor.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("descriptor {} is corrupt: {reason}", .path.display())]
    CorruptDescriptor { path: PathBuf, reason: String },
}

impl StoreError {
    /// Taxonomy entry for this failure.
    pub fn kind(&self) -> FailureKind {
        FailureKind::CorruptDescriptor
    }
}

/// Failure starting a game process.
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("entry point {} does not exist", .path.display())]
    MissingEntryPoint { path: PathBuf },

    #[error("failed to create crash report {}: {source}", .path.display())]
    CrashReport {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to start {program} in {}: {source}", .dir.display())]
    Spawn {
        program: String,
        dir: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Failure starting a background job.
#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    #[error("an update is already running")]
    AlreadyRunning,
}
