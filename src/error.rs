//! Error types for manifest handling
//!
//! Only fatal conditions are errors. Ignored paths and vanished source
//! files are reported through outcome values instead.

use crate::models::HashKind;
use std::fmt;
use std::path::PathBuf;

/// A single full-hash disagreement found while reproducing a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashMismatch {
    pub logical_path: String,
    pub kind: HashKind,
    pub stored: String,
    pub computed: String,
}

impl fmt::Display for HashMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "    {}:\n        {}: {} != {}",
            self.logical_path, self.kind, self.computed, self.stored
        )
    }
}

fn format_mismatches(mismatches: &[HashMismatch]) -> String {
    mismatches
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Errors raised by the manifest engine
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("Failed to hash '{}': {source}", .path.display())]
    HashCompute {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "Run cannot reproduce: manifest {store} is not correct\n{}",
        format_mismatches(.mismatches)
    )]
    ReproducibilityMismatch {
        store: String,
        mismatches: Vec<HashMismatch>,
    },

    #[error(
        "Run cannot reproduce: manifest {store} has no full hash to check against for: {}",
        .paths.join(", ")
    )]
    ReproducibilityGroundTruthMissing { store: String, paths: Vec<String> },

    #[error("{store} manifest must exist if reproduce is true")]
    ManifestPreconditionFailed { store: String },

    #[error("Failed to parse manifest '{}': {source}", .path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("IO error on '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize manifest: {0}")]
    Serialize(#[from] serde_yaml::Error),

    #[error("Invalid manifest configuration: {0}")]
    Config(String),

    #[error("Invalid ignore pattern: {0}")]
    InvalidPattern(#[from] glob::PatternError),

    #[error("Failed to start hashing workers: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Cannot {operation} while manifests are {state}")]
    OutOfOrder {
        operation: &'static str,
        state: String,
    },
}

impl ManifestError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Process exit status for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ManifestPreconditionFailed { .. } => 2,
            Self::ReproducibilityMismatch { .. } => 3,
            Self::ReproducibilityGroundTruthMissing { .. } => 4,
            _ => 1,
        }
    }

    /// True for the errors that mean a run is not reproducible
    pub fn is_reproducibility_failure(&self) -> bool {
        matches!(
            self,
            Self::ReproducibilityMismatch { .. } | Self::ReproducibilityGroundTruthMissing { .. }
        )
    }
}

pub type ManifestResult<T> = std::result::Result<T, ManifestError>;
