//! Manifest file persistence
//!
//! A store talks to disk only through [`StorageBackend`]. [`YamlFile`] is the
//! backend used for real runs; it writes
//! `{header: {vcs_revision}, entries: {logical_path: record}}`.

use crate::error::{ManifestError, ManifestResult};
use crate::models::FileRecord;
use crate::vcs::RevisionFn;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::{Path, PathBuf};

/// Manifest header
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestHeader {
    /// Revision of the control directory when the manifest was written
    #[serde(default)]
    pub vcs_revision: Option<String>,
}

/// Records keyed by logical path, kept in file order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entries(pub Vec<FileRecord>);

impl Serialize for Entries {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for record in &self.0 {
            map.serialize_entry(&record.logical_path, record)?;
        }
        map.end()
    }
}

struct EntriesVisitor;

impl<'de> Visitor<'de> for EntriesVisitor {
    type Value = Entries;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map of logical paths to file records")
    }

    fn visit_unit<E: serde::de::Error>(self) -> Result<Self::Value, E> {
        Ok(Entries::default())
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut records = Vec::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((logical_path, mut record)) = access.next_entry::<String, FileRecord>()? {
            record.logical_path = logical_path;
            records.push(record);
        }
        Ok(Entries(records))
    }
}

impl<'de> Deserialize<'de> for Entries {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(EntriesVisitor)
    }
}

/// On-disk manifest document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestDocument {
    #[serde(default)]
    pub header: ManifestHeader,
    #[serde(default)]
    pub entries: Entries,
}

/// Where a manifest store is read from and written to
pub trait StorageBackend: Send {
    /// Human readable location, used in messages
    fn location(&self) -> &Path;

    /// Read the document, or `None` if nothing has been written yet
    fn read(&self) -> ManifestResult<Option<ManifestDocument>>;

    fn write(&self, document: &ManifestDocument) -> ManifestResult<()>;

    /// Current revision to stamp into the header
    fn revision(&self) -> Option<String>;

    /// Copy the stored document verbatim into `dest_dir`
    fn copy_to(&self, dest_dir: &Path) -> ManifestResult<()>;
}

/// YAML manifest file on disk
pub struct YamlFile {
    path: PathBuf,
    revision: RevisionFn,
}

impl YamlFile {
    pub fn new(path: impl Into<PathBuf>, revision: RevisionFn) -> Self {
        Self {
            path: path.into(),
            revision,
        }
    }
}

impl StorageBackend for YamlFile {
    fn location(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> ManifestResult<Option<ManifestDocument>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| ManifestError::io(&self.path, e))?;
        if content.trim().is_empty() {
            return Ok(None);
        }

        serde_yaml::from_str(&content)
            .map(Some)
            .map_err(|source| ManifestError::Load {
                path: self.path.clone(),
                source,
            })
    }

    fn write(&self, document: &ManifestDocument) -> ManifestResult<()> {
        let content = serde_yaml::to_string(document)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ManifestError::io(parent, e))?;
        }

        // Atomic replace
        let temp_path = self.path.with_extension("yaml.tmp");
        std::fs::write(&temp_path, content).map_err(|e| ManifestError::io(&temp_path, e))?;
        std::fs::rename(&temp_path, &self.path).map_err(|e| ManifestError::io(&self.path, e))?;

        Ok(())
    }

    fn revision(&self) -> Option<String> {
        (self.revision)()
    }

    fn copy_to(&self, dest_dir: &Path) -> ManifestResult<()> {
        let Some(file_name) = self.path.file_name() else {
            return Ok(());
        };
        let dest = dest_dir.join(file_name);

        match std::fs::copy(&self.path, &dest) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "no manifest to copy");
                Ok(())
            }
            Err(e) => Err(ManifestError::io(&dest, e)),
        }
    }
}
