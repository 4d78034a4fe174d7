pub mod config;
pub mod record;

pub use config::{ManifestConfig, ReproduceConfig};
pub use record::{FileRecord, HashKind, HashTier, HashValues};

use std::fmt;
use std::str::FromStr;

/// The three manifests kept for every run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKind {
    Input,
    Restart,
    Exe,
}

impl StoreKind {
    /// Materialization order: executables last
    pub const ALL: [StoreKind; 3] = [StoreKind::Input, StoreKind::Restart, StoreKind::Exe];

    pub fn as_str(self) -> &'static str {
        match self {
            StoreKind::Input => "input",
            StoreKind::Restart => "restart",
            StoreKind::Exe => "exe",
        }
    }

    /// On-disk file name, e.g. `input.yaml`
    pub fn file_name(self) -> String {
        format!("{}.yaml", self.as_str())
    }

    pub(crate) fn index(self) -> usize {
        match self {
            StoreKind::Input => 0,
            StoreKind::Restart => 1,
            StoreKind::Exe => 2,
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoreKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StoreKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown manifest '{}' (expected input, restart or exe)", s))
    }
}
