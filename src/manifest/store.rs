//! ManifestStore - ordered logical path → FileRecord mapping

use super::persistence::{Entries, ManifestDocument, ManifestHeader, StorageBackend};
use crate::error::ManifestResult;
use crate::models::{FileRecord, HashKind};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Why a path was not registered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    Directory,
    /// Basename matched this ignore pattern
    Pattern(String),
}

/// Result of registering a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    /// Existing record now points at a different file or copy mode
    Updated,
    Unchanged,
    Ignored(IgnoreReason),
}

impl AddOutcome {
    /// True unless the path was ignored
    pub fn is_registered(&self) -> bool {
        !matches!(self, AddOutcome::Ignored(_))
    }
}

/// One manifest: records in insertion order plus header and dirty flag
pub struct ManifestStore {
    backend: Box<dyn StorageBackend>,
    header: ManifestHeader,
    records: Vec<FileRecord>,
    index: HashMap<String, usize>,
    kinds: Vec<HashKind>,
    ignore: Vec<glob::Pattern>,
    dirty: bool,
}

impl ManifestStore {
    /// Empty store that persists through `backend`
    pub fn new(
        backend: Box<dyn StorageBackend>,
        kinds: Vec<HashKind>,
        ignore: Vec<glob::Pattern>,
    ) -> Self {
        Self {
            backend,
            header: ManifestHeader::default(),
            records: Vec::new(),
            index: HashMap::new(),
            kinds,
            ignore,
            dirty: false,
        }
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Replace contents with what the backend holds; empty if nothing stored
    pub fn load(&mut self) -> ManifestResult<()> {
        let document = self.backend.read()?.unwrap_or_default();

        self.header = document.header;
        self.records.clear();
        self.index.clear();
        for record in document.entries.0 {
            self.upsert_record(record);
        }
        self.dirty = false;

        Ok(())
    }

    /// Write header and records, stamping the current revision
    pub fn dump(&mut self) -> ManifestResult<()> {
        self.header.vcs_revision = self.backend.revision();

        let document = ManifestDocument {
            header: self.header.clone(),
            entries: Entries(self.records.clone()),
        };
        self.backend.write(&document)?;

        self.dirty = false;
        Ok(())
    }

    /// Dump only if dirty; returns whether anything was written
    pub fn dump_if_dirty(&mut self) -> ManifestResult<bool> {
        if !self.dirty {
            return Ok(false);
        }
        self.dump()?;
        Ok(true)
    }

    /// Copy the on-disk manifest into `dest_dir`
    pub fn copy_to(&self, dest_dir: &Path) -> ManifestResult<()> {
        self.backend.copy_to(dest_dir)
    }

    pub fn location(&self) -> &Path {
        self.backend.location()
    }

    pub fn header(&self) -> &ManifestHeader {
        &self.header
    }

    // =========================================================================
    // Records
    // =========================================================================

    /// Register a file without hashing it.
    ///
    /// Directories and basenames matching an ignore pattern are skipped. New
    /// records start with every configured hash absent; existing records keep
    /// their hashes and take the new `full_path` and `copy`.
    pub fn add_filepath(
        &mut self,
        logical_path: impl Into<String>,
        full_path: impl Into<PathBuf>,
        copy: bool,
    ) -> AddOutcome {
        let full_path = full_path.into();

        if full_path.is_dir() {
            return AddOutcome::Ignored(IgnoreReason::Directory);
        }
        if let Some(pattern) = self.ignored_by(&full_path) {
            return AddOutcome::Ignored(IgnoreReason::Pattern(pattern));
        }

        let logical_path = logical_path.into();
        if let Some(record) = self.get_mut(&logical_path) {
            if record.full_path == full_path && record.copy == copy {
                return AddOutcome::Unchanged;
            }
            record.full_path = full_path;
            record.copy = copy;
            self.dirty = true;
            return AddOutcome::Updated;
        }

        let record = FileRecord::new(logical_path, full_path, &self.kinds, copy);
        self.upsert_record(record);
        self.dirty = true;
        AddOutcome::Added
    }

    fn ignored_by(&self, full_path: &Path) -> Option<String> {
        let name = full_path.file_name()?.to_str()?;
        self.ignore
            .iter()
            .find(|p| p.matches(name))
            .map(|p| p.as_str().to_string())
    }

    fn upsert_record(&mut self, record: FileRecord) {
        match self.index.get(&record.logical_path) {
            Some(&i) => self.records[i] = record,
            None => {
                self.index.insert(record.logical_path.clone(), self.records.len());
                self.records.push(record);
            }
        }
    }

    /// Copy-instead-of-link flag; false for unknown paths
    pub fn get_copy_flag(&self, logical_path: &str) -> bool {
        self.get(logical_path).is_some_and(|r| r.copy)
    }

    pub fn get(&self, logical_path: &str) -> Option<&FileRecord> {
        self.index.get(logical_path).map(|&i| &self.records[i])
    }

    pub fn get_mut(&mut self, logical_path: &str) -> Option<&mut FileRecord> {
        self.index.get(logical_path).map(|&i| &mut self.records[i])
    }

    pub fn contains(&self, logical_path: &str) -> bool {
        self.index.contains_key(logical_path)
    }

    /// Remove every listed record with a single index rebuild; returns how
    /// many were removed
    pub fn remove_all<'a>(&mut self, logical_paths: impl IntoIterator<Item = &'a str>) -> usize {
        let doomed: HashSet<&str> = logical_paths
            .into_iter()
            .filter(|p| self.index.contains_key(*p))
            .collect();
        if doomed.is_empty() {
            return 0;
        }

        self.records.retain(|r| !doomed.contains(r.logical_path.as_str()));
        self.index = self
            .records
            .iter()
            .enumerate()
            .map(|(i, r)| (r.logical_path.clone(), i))
            .collect();
        self.dirty = true;
        doomed.len()
    }

    /// Drop every record; the on-disk file is untouched until the next dump
    pub fn clear(&mut self) {
        self.records.clear();
        self.index.clear();
    }

    /// Records in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &FileRecord> {
        self.records.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut FileRecord> {
        self.records.iter_mut()
    }

    pub fn logical_paths(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| r.logical_path.as_str())
    }

    pub fn full_paths(&self) -> Vec<PathBuf> {
        self.records.iter().map(|r| r.full_path.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    // =========================================================================
    // Dirty tracking
    // =========================================================================

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::persistence::YamlFile;
    use crate::vcs;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn store_at(path: &Path) -> ManifestStore {
        ManifestStore::new(
            Box::new(YamlFile::new(path, Arc::new(|| Some("rev1".to_string())))),
            vec![HashKind::Binhash, HashKind::Sha256],
            vec![glob::Pattern::new(".*").unwrap()],
        )
    }

    fn setup_files() -> (TempDir, PathBuf) {
        let temp = TempDir::new().unwrap();
        let data = temp.path().join("data");
        std::fs::create_dir_all(&data).unwrap();
        std::fs::write(data.join("a.nc"), "aaa").unwrap();
        std::fs::write(data.join("b.nc"), "bbb").unwrap();
        std::fs::write(data.join(".hidden"), "h").unwrap();
        (temp, data)
    }

    #[test]
    fn test_add_new_record() {
        let (temp, data) = setup_files();
        let mut store = store_at(&temp.path().join("input.yaml"));

        let outcome = store.add_filepath("INPUT/a.nc", data.join("a.nc"), false);

        assert_eq!(outcome, AddOutcome::Added);
        let record = store.get("INPUT/a.nc").unwrap();
        assert_eq!(record.full_path, data.join("a.nc"));
        assert_eq!(record.hash(HashKind::Binhash), None);
        assert!(record.hashes.contains_key(&HashKind::Sha256));
        assert!(store.is_dirty());
    }

    #[test]
    fn test_ignores_directories_and_patterns() {
        let (temp, data) = setup_files();
        let mut store = store_at(&temp.path().join("input.yaml"));

        assert_eq!(
            store.add_filepath("data", &data, false),
            AddOutcome::Ignored(IgnoreReason::Directory)
        );
        assert_eq!(
            store.add_filepath(".hidden", data.join(".hidden"), false),
            AddOutcome::Ignored(IgnoreReason::Pattern(".*".to_string()))
        );
        assert!(store.is_empty());
        assert!(!store.is_dirty());
    }

    #[test]
    fn test_upsert_keeps_hashes() {
        let (temp, data) = setup_files();
        let mut store = store_at(&temp.path().join("input.yaml"));

        store.add_filepath("a.nc", data.join("a.nc"), false);
        store.get_mut("a.nc").unwrap().set_hash(HashKind::Sha256, "abc");

        assert_eq!(store.add_filepath("a.nc", data.join("a.nc"), false), AddOutcome::Unchanged);
        assert_eq!(store.add_filepath("a.nc", data.join("b.nc"), true), AddOutcome::Updated);

        let record = store.get("a.nc").unwrap();
        assert_eq!(record.full_path, data.join("b.nc"));
        assert!(record.copy);
        assert_eq!(record.hash(HashKind::Sha256), Some("abc"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_copy_flag_defaults_false() {
        let (temp, data) = setup_files();
        let mut store = store_at(&temp.path().join("input.yaml"));
        store.add_filepath("a.nc", data.join("a.nc"), true);
        store.add_filepath("b.nc", data.join("b.nc"), false);

        assert!(store.get_copy_flag("a.nc"));
        assert!(!store.get_copy_flag("b.nc"));
        assert!(!store.get_copy_flag("unknown.nc"));
    }

    #[test]
    fn test_insertion_order_and_remove() {
        let (temp, data) = setup_files();
        let mut store = store_at(&temp.path().join("input.yaml"));
        store.add_filepath("z.nc", data.join("a.nc"), false);
        store.add_filepath("a.nc", data.join("b.nc"), false);
        store.add_filepath("m.nc", data.join("a.nc"), false);

        assert_eq!(store.logical_paths().collect::<Vec<_>>(), vec!["z.nc", "a.nc", "m.nc"]);

        assert_eq!(store.remove_all(["z.nc"]), 1);
        assert_eq!(store.logical_paths().collect::<Vec<_>>(), vec!["a.nc", "m.nc"]);
        assert_eq!(store.get("m.nc").unwrap().logical_path, "m.nc");
        assert_eq!(store.remove_all(["z.nc"]), 0);
    }

    #[test]
    fn test_remove_all_keeps_order_and_index() {
        let (temp, data) = setup_files();
        let mut store = store_at(&temp.path().join("input.yaml"));
        for name in ["a.nc", "b.nc", "c.nc", "d.nc", "e.nc"] {
            store.add_filepath(name, data.join("a.nc"), false);
        }
        store.dump().unwrap();

        let removed = store.remove_all(["b.nc", "d.nc", "missing.nc", "b.nc"]);

        assert_eq!(removed, 2);
        assert!(store.is_dirty());
        assert_eq!(store.logical_paths().collect::<Vec<_>>(), vec!["a.nc", "c.nc", "e.nc"]);
        assert_eq!(store.get("e.nc").unwrap().logical_path, "e.nc");
        assert!(!store.contains("d.nc"));
    }

    #[test]
    fn test_remove_all_nothing_stays_clean() {
        let (temp, data) = setup_files();
        let mut store = store_at(&temp.path().join("input.yaml"));
        store.add_filepath("a.nc", data.join("a.nc"), false);
        store.dump().unwrap();

        assert_eq!(store.remove_all(["z.nc"]), 0);
        assert!(!store.is_dirty());
    }

    #[test]
    fn test_dump_and_load_round_trip() {
        let (temp, data) = setup_files();
        let path = temp.path().join("manifests/input.yaml");

        let mut store = store_at(&path);
        store.add_filepath("a.nc", data.join("a.nc"), false);
        store.add_filepath("b.nc", data.join("b.nc"), true);
        store.get_mut("a.nc").unwrap().set_hash(HashKind::Binhash, "fast");
        assert!(store.dump_if_dirty().unwrap());
        assert!(!store.is_dirty());
        assert!(!store.dump_if_dirty().unwrap());

        let mut loaded = store_at(&path);
        loaded.load().unwrap();

        assert_eq!(loaded.header().vcs_revision.as_deref(), Some("rev1"));
        assert_eq!(loaded.iter().collect::<Vec<_>>(), store.iter().collect::<Vec<_>>());
        assert!(!loaded.is_dirty());
    }

    #[test]
    fn test_revision_queried_at_dump_time() {
        let temp = TempDir::new().unwrap();
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = calls.clone();
        let mut store = ManifestStore::new(
            Box::new(YamlFile::new(
                temp.path().join("exe.yaml"),
                Arc::new(move || {
                    counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    None
                }),
            )),
            vec![HashKind::Sha256],
            vec![],
        );

        store.load().unwrap();
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);
        store.dump().unwrap();
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn test_load_missing_is_empty() {
        let temp = TempDir::new().unwrap();
        let mut store = ManifestStore::new(
            Box::new(YamlFile::new(temp.path().join("restart.yaml"), vcs::no_revision())),
            vec![HashKind::Sha256],
            vec![],
        );
        store.load().unwrap();
        assert!(store.is_empty());
    }
}
