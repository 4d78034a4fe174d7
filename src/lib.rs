// runmanifest - Manifest & reproducibility verification for simulation runs
// Records the files behind every input, restart and executable of a run and
// checks that a reproduce run uses bit-identical files.

pub mod cli;
pub mod error;
pub mod hash;
pub mod manifest;
pub mod models;
pub mod vcs;

pub use anyhow::{Context, Result};
pub use colored::Colorize;

// Re-export commonly used types
pub use error::{HashMismatch, ManifestError, ManifestResult};
pub use hash::HashEngine;
pub use manifest::{AddOutcome, CheckReport, ManifestGroup, ManifestStore, MaterializeReport};
pub use models::{FileRecord, HashKind, ManifestConfig, StoreKind};
