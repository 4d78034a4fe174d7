//! File record types stored in a manifest

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Cost tier of a hash function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashTier {
    /// Cheap change detector, may disagree on unchanged content
    Fast,
    /// Authoritative whole-content checksum
    Full,
}

/// Supported hash functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashKind {
    /// Size, modification time and leading bytes
    Binhash,
    /// Size and three content windows (head, middle, tail)
    Sampled,
    /// SHA-256 of the whole file
    Sha256,
}

impl HashKind {
    pub const ALL: [HashKind; 3] = [HashKind::Binhash, HashKind::Sampled, HashKind::Sha256];

    pub fn tier(self) -> HashTier {
        match self {
            HashKind::Binhash | HashKind::Sampled => HashTier::Fast,
            HashKind::Sha256 => HashTier::Full,
        }
    }

    pub fn is_fast(self) -> bool {
        self.tier() == HashTier::Fast
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HashKind::Binhash => "binhash",
            HashKind::Sampled => "sampled",
            HashKind::Sha256 => "sha256",
        }
    }
}

impl fmt::Display for HashKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HashKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown hash kind '{}'", s))
    }
}

/// Stored hash values; `None` means the hash has not been computed yet
pub type HashValues = BTreeMap<HashKind, Option<String>>;

/// One concrete file backing a logical path in the work directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Path relative to the work directory; the key within its store
    #[serde(skip)]
    pub logical_path: String,

    /// Absolute location of the source file
    #[serde(rename = "fullpath")]
    pub full_path: PathBuf,

    #[serde(default)]
    pub hashes: HashValues,

    /// Copy into the work directory instead of symlinking
    #[serde(default, skip_serializing_if = "is_false")]
    pub copy: bool,

    /// Skipped by verification for the current run (source vanished)
    #[serde(skip)]
    pub ignore: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl FileRecord {
    /// Create a record with every given hash kind marked absent
    pub fn new(
        logical_path: impl Into<String>,
        full_path: impl Into<PathBuf>,
        kinds: &[HashKind],
        copy: bool,
    ) -> Self {
        Self {
            logical_path: logical_path.into(),
            full_path: full_path.into(),
            hashes: kinds.iter().map(|k| (*k, None)).collect(),
            copy,
            ignore: false,
        }
    }

    /// Stored value for a hash kind, if one has been computed
    pub fn hash(&self, kind: HashKind) -> Option<&str> {
        self.hashes.get(&kind).and_then(|v| v.as_deref())
    }

    pub fn set_hash(&mut self, kind: HashKind, value: impl Into<String>) {
        self.hashes.insert(kind, Some(value.into()));
    }

    pub fn full_path(&self) -> &Path {
        &self.full_path
    }
}
