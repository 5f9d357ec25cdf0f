//! Background library updates: download, unpack, swap, reload.

/// Single-job pipeline driver and its concurrency gate.
pub mod coordinator;
/// Events a job sends to the UI thread.
pub mod events;
/// Archive download sources.
pub mod fetch;
/// Archive extraction and library replacement.
pub mod install;
/// Update job state machine.
pub mod job;

pub use coordinator::{Coordinator, Updater};
pub use events::{EventSender, JobEvent, JobOutcome};
pub use fetch::{ArchiveSource, HttpArchiveSource, CHUNK_SIZE};
pub use install::{recover_interrupted_swap, ArchiveUnpacker, ZipUnpacker};
pub use job::{Stage, UpdateJob};
