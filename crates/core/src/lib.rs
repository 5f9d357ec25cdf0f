#![warn(clippy::all, missing_docs)]

//! Core logic for the Para game launcher.
//!
//! This crate hosts the game library model, configuration handling, the
//! background update pipeline, and process launching used by the terminal UI.

pub mod config;
pub mod deps;
pub mod error;
pub mod launch;
pub mod library;
pub mod manifest;
pub mod models;
pub mod update;

#[cfg(test)]
mod test_support;

pub use config::{AppConfig, LibraryLayout};
pub use deps::DependencyInstaller;
pub use error::FailureKind;
pub use launch::{LaunchHandle, Launcher};
pub use library::{LibraryEvent, LibraryStore, LibraryWatcher};
pub use manifest::LibraryManifest;
pub use models::GameDescriptor;
pub use update::{Coordinator, JobEvent, JobOutcome, Updater};
