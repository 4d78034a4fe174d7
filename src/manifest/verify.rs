//! Two-tier hash verification of a manifest store
//!
//! Fast hashes are checked first. A fast hash that disagrees with its stored
//! value makes the record suspect; suspects are settled with full hashes.
//! In reproduce mode a full hash disagreement aborts, otherwise the full
//! hashes are recomputed and become the new ground truth.

use super::store::ManifestStore;
use crate::error::{HashMismatch, ManifestError, ManifestResult};
use crate::hash::HashEngine;
use crate::models::HashKind;
use std::path::PathBuf;

/// What a fast check did to a store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckReport {
    /// Records hashed
    pub checked: usize,
    /// Records whose absent fast hash was filled in
    pub filled: Vec<String>,
    /// Non-reproduce mode: new records given their first full hashes
    pub recorded: Vec<String>,
    /// Reproduce mode: fast hash drifted, full hash confirmed, fast updated
    pub healed: Vec<String>,
    /// Non-reproduce mode: suspects whose full hashes were recomputed
    pub rehashed: Vec<String>,
    /// Source file missing; left for materialization to remove
    pub skipped: Vec<String>,
}

impl CheckReport {
    pub fn suspect_count(&self) -> usize {
        self.healed.len() + self.rehashed.len()
    }
}

struct Suspect {
    index: usize,
    logical_path: String,
    full_path: PathBuf,
    kind: HashKind,
    value: String,
}

/// Check every record of `store` with the fast hashes of `engine`
pub fn check_fast(
    store: &mut ManifestStore,
    engine: &HashEngine,
    reproduce: bool,
) -> ManifestResult<CheckReport> {
    let mut report = CheckReport::default();

    // Records are read-only while hashing
    let mut candidates = Vec::new();
    for (index, record) in store.iter_mut().enumerate() {
        record.ignore = !record.full_path.exists();
        if record.ignore {
            tracing::warn!(path = %record.full_path.display(), "source file not found, skipping hash check");
            report.skipped.push(record.logical_path.clone());
        } else {
            candidates.push((index, record.full_path.clone()));
        }
    }

    let paths: Vec<PathBuf> = candidates.iter().map(|(_, p)| p.clone()).collect();
    let fast = engine.batch_compute(&paths, engine.fast_kinds(), true)?;
    report.checked = paths.len();

    let mut suspects = Vec::new();
    let mut filled = Vec::new();
    {
        let mut records: Vec<_> = store.iter_mut().collect();
        for ((index, full_path), computed) in candidates.into_iter().zip(fast) {
            let Some((kind, value)) = computed.into_iter().next() else {
                continue;
            };
            let record = &mut records[index];

            match record.hash(kind) {
                None => {
                    record.set_hash(kind, value);
                    report.filled.push(record.logical_path.clone());
                    filled.push((index, full_path));
                }
                Some(stored) if stored == value => {}
                Some(_) => suspects.push(Suspect {
                    index,
                    logical_path: record.logical_path.clone(),
                    full_path,
                    kind,
                    value,
                }),
            }
        }
    }

    if !report.filled.is_empty() {
        store.mark_dirty();
    }

    if !reproduce {
        record_full_hashes(store, engine, filled, &mut report)?;
    }

    if suspects.is_empty() {
        return Ok(report);
    }

    let suspect_paths: Vec<PathBuf> = suspects.iter().map(|s| s.full_path.clone()).collect();
    let full = engine.batch_compute(&suspect_paths, engine.full_kinds(), false)?;

    if reproduce {
        confirm_suspects(store, &suspects, &full)?;
        let mut records: Vec<_> = store.iter_mut().collect();
        for (suspect, computed) in suspects.iter().zip(full) {
            let record = &mut records[suspect.index];
            tracing::warn!(
                path = %suspect.logical_path,
                "full hashes checked ok, updating {}",
                suspect.kind
            );
            record.set_hash(suspect.kind, suspect.value.clone());
            for (kind, value) in computed {
                if record.hash(kind).is_none() {
                    record.set_hash(kind, value);
                }
            }
            report.healed.push(suspect.logical_path.clone());
        }
    } else {
        tracing::info!(
            count = suspects.len(),
            manifest = %store.location().display(),
            "updating full hashes"
        );
        let mut records: Vec<_> = store.iter_mut().collect();
        for (suspect, computed) in suspects.iter().zip(full) {
            let record = &mut records[suspect.index];
            record.set_hash(suspect.kind, suspect.value.clone());
            for (kind, value) in computed {
                record.set_hash(kind, value);
            }
            report.rehashed.push(suspect.logical_path.clone());
        }
    }

    store.mark_dirty();
    Ok(report)
}

/// Give newly registered records the full hashes they lack
fn record_full_hashes(
    store: &mut ManifestStore,
    engine: &HashEngine,
    filled: Vec<(usize, PathBuf)>,
    report: &mut CheckReport,
) -> ManifestResult<()> {
    let mut records: Vec<_> = store.iter_mut().collect();
    let fresh: Vec<(usize, PathBuf)> = filled
        .into_iter()
        .filter(|(index, _)| {
            engine
                .full_kinds()
                .iter()
                .any(|kind| records[*index].hash(*kind).is_none())
        })
        .collect();
    if fresh.is_empty() {
        return Ok(());
    }

    let paths: Vec<PathBuf> = fresh.iter().map(|(_, p)| p.clone()).collect();
    let full = engine.batch_compute(&paths, engine.full_kinds(), false)?;
    for ((index, _), computed) in fresh.into_iter().zip(full) {
        let record = &mut records[index];
        for (kind, value) in computed {
            if record.hash(kind).is_none() {
                record.set_hash(kind, value);
            }
        }
        report.recorded.push(record.logical_path.clone());
    }

    Ok(())
}

/// Fail unless every suspect's stored full hashes match the computed ones
fn confirm_suspects(
    store: &ManifestStore,
    suspects: &[Suspect],
    full: &[Vec<(HashKind, String)>],
) -> ManifestResult<()> {
    let mut mismatches = Vec::new();
    let mut missing = Vec::new();

    for (suspect, computed) in suspects.iter().zip(full) {
        let Some(record) = store.get(&suspect.logical_path) else {
            continue;
        };

        let mut compared = 0;
        for (kind, value) in computed {
            let Some(stored) = record.hash(*kind) else {
                continue;
            };
            compared += 1;
            if stored != value {
                mismatches.push(HashMismatch {
                    logical_path: suspect.logical_path.clone(),
                    kind: *kind,
                    stored: stored.to_string(),
                    computed: value.clone(),
                });
            }
        }

        if compared == 0 {
            missing.push(suspect.logical_path.clone());
        }
    }

    let store_name = store.location().display().to_string();
    if !mismatches.is_empty() {
        return Err(ManifestError::ReproducibilityMismatch {
            store: store_name,
            mismatches,
        });
    }
    if !missing.is_empty() {
        return Err(ManifestError::ReproducibilityGroundTruthMissing {
            store: store_name,
            paths: missing,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::persistence::YamlFile;
    use crate::vcs;
    use std::path::Path;
    use tempfile::TempDir;

    fn engine() -> HashEngine {
        HashEngine::new(vec![HashKind::Binhash], vec![HashKind::Sha256], 2)
    }

    fn store(dir: &Path) -> ManifestStore {
        ManifestStore::new(
            Box::new(YamlFile::new(dir.join("input.yaml"), vcs::no_revision())),
            vec![HashKind::Binhash, HashKind::Sha256],
            vec![],
        )
    }

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_fills_absent_fast_hashes() {
        let temp = TempDir::new().unwrap();
        let mut store = store(temp.path());
        store.add_filepath("a.nc", write(temp.path(), "a.nc", "aaa"), false);

        let report = check_fast(&mut store, &engine(), true).unwrap();

        assert_eq!(report.filled, vec!["a.nc".to_string()]);
        assert!(store.get("a.nc").unwrap().hash(HashKind::Binhash).is_some());
        assert_eq!(store.get("a.nc").unwrap().hash(HashKind::Sha256), None);
        assert!(store.is_dirty());
    }

    #[test]
    fn test_record_mode_establishes_full_hashes() {
        let temp = TempDir::new().unwrap();
        let mut store = store(temp.path());
        let full = write(temp.path(), "a.nc", "aaa");
        store.add_filepath("a.nc", &full, false);

        let report = check_fast(&mut store, &engine(), false).unwrap();

        assert_eq!(report.recorded, vec!["a.nc".to_string()]);
        assert_eq!(
            store.get("a.nc").unwrap().hash(HashKind::Sha256).unwrap(),
            engine().compute(&full, HashKind::Sha256).unwrap()
        );
    }

    #[test]
    fn test_clean_store_stays_clean() {
        let temp = TempDir::new().unwrap();
        let mut store = store(temp.path());
        store.add_filepath("a.nc", write(temp.path(), "a.nc", "aaa"), false);
        check_fast(&mut store, &engine(), false).unwrap();
        store.dump().unwrap();

        let report = check_fast(&mut store, &engine(), true).unwrap();

        assert!(report.filled.is_empty());
        assert_eq!(report.suspect_count(), 0);
        assert!(!store.is_dirty());
    }

    #[test]
    fn test_non_reproduce_rehashes_suspects() {
        let temp = TempDir::new().unwrap();
        let mut store = store(temp.path());
        let full = write(temp.path(), "a.nc", "new content");
        store.add_filepath("a.nc", &full, false);
        {
            let record = store.get_mut("a.nc").unwrap();
            record.set_hash(HashKind::Binhash, "stale");
            record.set_hash(HashKind::Sha256, "old");
        }

        let report = check_fast(&mut store, &engine(), false).unwrap();

        assert_eq!(report.rehashed, vec!["a.nc".to_string()]);
        let record = store.get("a.nc").unwrap();
        assert_eq!(
            record.hash(HashKind::Sha256).unwrap(),
            engine().compute(&full, HashKind::Sha256).unwrap()
        );
        assert_eq!(
            record.hash(HashKind::Binhash).unwrap(),
            engine().compute(&full, HashKind::Binhash).unwrap()
        );
        assert!(store.is_dirty());
    }

    #[test]
    fn test_reproduce_heals_metadata_drift() {
        let temp = TempDir::new().unwrap();
        let mut store = store(temp.path());
        let full = write(temp.path(), "a.nc", "content");
        let sha = engine().compute(&full, HashKind::Sha256).unwrap();
        store.add_filepath("a.nc", &full, false);
        {
            let record = store.get_mut("a.nc").unwrap();
            record.set_hash(HashKind::Binhash, "X");
            record.set_hash(HashKind::Sha256, sha.clone());
        }

        let report = check_fast(&mut store, &engine(), true).unwrap();

        assert_eq!(report.healed, vec!["a.nc".to_string()]);
        let record = store.get("a.nc").unwrap();
        assert_ne!(record.hash(HashKind::Binhash), Some("X"));
        assert_eq!(record.hash(HashKind::Sha256), Some(sha.as_str()));
        assert!(store.is_dirty());
    }

    #[test]
    fn test_reproduce_mismatch_leaves_store_untouched() {
        let temp = TempDir::new().unwrap();
        let mut store = store(temp.path());
        store.add_filepath("a.nc", write(temp.path(), "a.nc", "changed"), false);
        store.add_filepath("b.nc", write(temp.path(), "b.nc", "changed too"), false);
        for path in ["a.nc", "b.nc"] {
            let record = store.get_mut(path).unwrap();
            record.set_hash(HashKind::Binhash, "X");
            record.set_hash(HashKind::Sha256, "Y");
        }

        let err = check_fast(&mut store, &engine(), true).unwrap_err();

        match err {
            ManifestError::ReproducibilityMismatch { mismatches, .. } => {
                let paths: Vec<_> = mismatches.iter().map(|m| m.logical_path.as_str()).collect();
                assert_eq!(paths, vec!["a.nc", "b.nc"]);
                assert_eq!(mismatches[0].stored, "Y");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(store.get("a.nc").unwrap().hash(HashKind::Binhash), Some("X"));
    }

    #[test]
    fn test_reproduce_without_full_hash_fails() {
        let temp = TempDir::new().unwrap();
        let mut store = store(temp.path());
        store.add_filepath("a.nc", write(temp.path(), "a.nc", "data"), false);
        store.get_mut("a.nc").unwrap().set_hash(HashKind::Binhash, "X");

        let err = check_fast(&mut store, &engine(), true).unwrap_err();

        match err {
            ManifestError::ReproducibilityGroundTruthMissing { paths, .. } => {
                assert_eq!(paths, vec!["a.nc".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_source_is_skipped() {
        let temp = TempDir::new().unwrap();
        let mut store = store(temp.path());
        let full = write(temp.path(), "a.nc", "data");
        store.add_filepath("a.nc", &full, false);
        std::fs::remove_file(&full).unwrap();

        let report = check_fast(&mut store, &engine(), true).unwrap();

        assert_eq!(report.skipped, vec!["a.nc".to_string()]);
        assert_eq!(report.checked, 0);
        assert!(store.get("a.nc").unwrap().ignore);
    }

    #[test]
    fn test_unreadable_source_aborts_without_writing() {
        let temp = TempDir::new().unwrap();
        let mut store = store(temp.path());
        let full = write(temp.path(), "a.nc", "data");
        store.add_filepath("a.nc", &full, false);
        check_fast(&mut store, &engine(), false).unwrap();
        store.dump().unwrap();
        let on_disk = std::fs::read(store.location()).unwrap();

        std::fs::remove_file(&full).unwrap();
        std::fs::create_dir(&full).unwrap();

        for reproduce in [true, false] {
            let err = check_fast(&mut store, &engine(), reproduce).unwrap_err();
            match &err {
                ManifestError::HashCompute { path, .. } => assert_eq!(path, &full),
                other => panic!("unexpected error: {other}"),
            }
            assert_eq!(err.exit_code(), 1);
        }
        assert!(!store.is_dirty());
        assert_eq!(std::fs::read(store.location()).unwrap(), on_disk);
    }
}
