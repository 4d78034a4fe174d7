//! ManifestGroup - the input, restart and exe manifests of one run
//!
//! Lifecycle: `setup` → (register files) → `verify` → `make_links` →
//! `finalize`. Fatal errors leave the on-disk manifests untouched.

use super::materialize::{self, MaterializeReport};
use super::persistence::YamlFile;
use super::store::{AddOutcome, ManifestStore};
use super::verify::{self, CheckReport};
use crate::error::{ManifestError, ManifestResult};
use crate::hash::HashEngine;
use crate::models::{ManifestConfig, StoreKind};
use crate::vcs::RevisionFn;
use regex::Regex;
use std::collections::HashSet;
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Lifecycle position of a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum GroupState {
    Uninitialized,
    Loaded,
    Verified,
    Materialized,
    Persisted,
}

impl fmt::Display for GroupState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GroupState::Uninitialized => "uninitialized",
            GroupState::Loaded => "loaded",
            GroupState::Verified => "verified",
            GroupState::Materialized => "materialized",
            GroupState::Persisted => "persisted",
        };
        f.write_str(name)
    }
}

/// Owns the three manifests of a run and sequences their checks
pub struct ManifestGroup {
    config: ManifestConfig,
    manifest_dir: PathBuf,
    stores: [ManifestStore; 3],
    engine: HashEngine,
    reproduce: [bool; 3],
    scaninputs: bool,
    /// Input paths loaded from disk and not yet registered again this run
    stale_inputs: HashSet<String>,
    counter: Option<u32>,
    state: GroupState,
}

impl ManifestGroup {
    /// Build a group whose manifests live in `<control_dir>/<manifest_dir>`
    pub fn new(
        config: ManifestConfig,
        control_dir: &Path,
        revision: RevisionFn,
    ) -> ManifestResult<Self> {
        config.validate()?;

        let manifest_dir = control_dir.join(&config.manifest_dir);
        let ignore = config.ignore_patterns()?;
        let kinds = config.hash_kinds();
        let stores = StoreKind::ALL.map(|kind| {
            ManifestStore::new(
                Box::new(YamlFile::new(manifest_dir.join(kind.file_name()), revision.clone())),
                kinds.clone(),
                ignore.clone(),
            )
        });

        Ok(Self {
            engine: HashEngine::from_config(&config),
            scaninputs: config.scaninputs,
            config,
            manifest_dir,
            stores,
            reproduce: [false; 3],
            stale_inputs: HashSet::new(),
            counter: None,
            state: GroupState::Uninitialized,
        })
    }

    /// Show hashing progress on stderr
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.engine = self.engine.with_progress(progress);
        self
    }

    pub fn store(&self, kind: StoreKind) -> &ManifestStore {
        &self.stores[kind.index()]
    }

    pub fn store_mut(&mut self, kind: StoreKind) -> &mut ManifestStore {
        &mut self.stores[kind.index()]
    }

    pub fn state(&self) -> GroupState {
        self.state
    }

    /// Run counter, either supplied to `setup` or inferred from restarts
    pub fn counter(&self) -> Option<u32> {
        self.counter
    }

    /// Effective reproduce flag of a store (valid after `setup`)
    pub fn reproduce(&self, kind: StoreKind) -> bool {
        self.reproduce[kind.index()]
    }

    pub fn scaninputs(&self) -> bool {
        self.scaninputs
    }

    fn require(&self, operation: &'static str, allowed: &[GroupState]) -> ManifestResult<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(ManifestError::OutOfOrder {
                operation,
                state: self.state.to_string(),
            })
        }
    }

    // =========================================================================
    // Setup
    // =========================================================================

    /// Load manifests and enforce reproduce preconditions.
    ///
    /// Nothing is written before every required manifest is known to exist.
    pub fn setup(&mut self, reproduce: bool, counter: Option<u32>) -> ManifestResult<()> {
        self.require("set up", &[GroupState::Uninitialized])?;

        for kind in StoreKind::ALL {
            self.reproduce[kind.index()] = self.config.reproduce.resolve(kind, reproduce);
        }

        for store in &mut self.stores {
            store.load()?;
            if !store.is_empty() {
                tracing::info!(manifest = %store.location().display(), records = store.len(), "loaded manifest");
            }
        }

        for kind in StoreKind::ALL {
            if self.reproduce(kind) && self.store(kind).is_empty() {
                return Err(ManifestError::ManifestPreconditionFailed {
                    store: capitalize(kind.as_str()),
                });
            }
        }

        std::fs::create_dir_all(&self.manifest_dir)
            .map_err(|e| ManifestError::io(&self.manifest_dir, e))?;

        self.counter = match counter {
            Some(n) => Some(n),
            None if reproduce => infer_counter(self.store(StoreKind::Restart)),
            None => None,
        };

        if self.reproduce(StoreKind::Input) && self.scaninputs {
            tracing::info!("scaninputs set to false when reproduce input is true");
            self.scaninputs = false;
        }
        if self.scaninputs {
            self.stale_inputs = self
                .store(StoreKind::Input)
                .logical_paths()
                .map(str::to_string)
                .collect();
        }

        // Executables are cheap to re-record and restarts are rescanned
        // unless they are being reproduced
        for kind in [StoreKind::Exe, StoreKind::Restart] {
            if !self.reproduce(kind) && !self.store(kind).is_empty() {
                tracing::debug!(manifest = %kind, "re-initialising manifest");
                self.store_mut(kind).clear();
            }
        }

        self.state = GroupState::Loaded;
        Ok(())
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Register a file in one of the manifests
    pub fn add_filepath(
        &mut self,
        kind: StoreKind,
        logical_path: impl AsRef<Path>,
        full_path: impl Into<PathBuf>,
        copy: bool,
    ) -> ManifestResult<AddOutcome> {
        self.require("register files", &[GroupState::Loaded])?;

        let logical_path = normalize_logical(logical_path.as_ref());
        let outcome = self.store_mut(kind).add_filepath(logical_path.clone(), full_path, copy);
        if kind == StoreKind::Input && outcome.is_registered() {
            self.stale_inputs.remove(&logical_path);
        }
        Ok(outcome)
    }

    /// Register every regular file below `src_dir` as `dest_prefix/<relative>`
    pub fn add_directory(
        &mut self,
        kind: StoreKind,
        src_dir: &Path,
        dest_prefix: impl AsRef<Path>,
    ) -> ManifestResult<usize> {
        self.require("register files", &[GroupState::Loaded])?;

        let mut added = 0;
        for entry in walkdir::WalkDir::new(src_dir).follow_links(true).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(src_dir).to_path_buf();
                let source = e
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("filesystem loop"));
                ManifestError::io(path, source)
            })?;
            if !entry.file_type().is_file() {
                continue;
            }

            let Ok(rel_path) = entry.path().strip_prefix(src_dir) else {
                continue;
            };
            let logical = dest_prefix.as_ref().join(rel_path);
            if self
                .add_filepath(kind, logical, entry.path(), false)?
                .is_registered()
            {
                added += 1;
            }
        }

        Ok(added)
    }

    // =========================================================================
    // Verification, materialization, persistence
    // =========================================================================

    /// Check exe, input and restart manifests against the files on disk
    pub fn verify(&mut self) -> ManifestResult<Vec<(StoreKind, CheckReport)>> {
        self.require("verify", &[GroupState::Loaded])?;

        tracing::info!("checking exe and input manifests");
        let mut reports = Vec::with_capacity(3);

        let exe_report = self.check(StoreKind::Exe)?;
        reports.push((StoreKind::Exe, exe_report));

        if !self.reproduce(StoreKind::Input) && !self.stale_inputs.is_empty() {
            let stale: Vec<String> = self.stale_inputs.drain().collect();
            for path in &stale {
                tracing::warn!(file = %path, "file no longer in input directory, removing from manifest");
            }
            let input = self.store_mut(StoreKind::Input);
            input.remove_all(stale.iter().map(String::as_str));
            input.mark_dirty();
        }
        let input_report = self.check(StoreKind::Input)?;
        reports.push((StoreKind::Input, input_report));

        if self.reproduce(StoreKind::Restart) {
            tracing::info!("checking restart manifest");
        } else {
            tracing::info!("creating restart manifest");
            self.store_mut(StoreKind::Restart).mark_dirty();
        }
        let restart_report = self.check(StoreKind::Restart)?;
        reports.push((StoreKind::Restart, restart_report));

        self.state = GroupState::Verified;
        Ok(reports)
    }

    fn check(&mut self, kind: StoreKind) -> ManifestResult<CheckReport> {
        let reproduce = self.reproduce(kind);
        verify::check_fast(&mut self.stores[kind.index()], &self.engine, reproduce)
    }

    /// Link or copy inputs, then restarts, then executables into `work_dir`
    pub fn make_links(
        &mut self,
        work_dir: &Path,
    ) -> ManifestResult<Vec<(StoreKind, MaterializeReport)>> {
        self.require("make links", &[GroupState::Verified])?;

        let mut reports = Vec::with_capacity(3);
        for kind in StoreKind::ALL {
            tracing::info!(manifest = %kind, "making links");
            let report = materialize::make_links(self.store_mut(kind), work_dir)?;
            reports.push((kind, report));
        }

        self.state = GroupState::Materialized;
        Ok(reports)
    }

    /// Write every dirty manifest; returns the ones written
    pub fn finalize(&mut self) -> ManifestResult<Vec<StoreKind>> {
        self.require("write manifests", &[GroupState::Verified, GroupState::Materialized])?;

        let mut written = Vec::new();
        for kind in StoreKind::ALL {
            let store = self.store_mut(kind);
            if store.dump_if_dirty()? {
                tracing::info!(manifest = %store.location().display(), "wrote manifest");
                written.push(kind);
            }
        }

        self.state = GroupState::Persisted;
        Ok(written)
    }

    /// Copy the on-disk manifests into `dest_dir`, skipping missing ones
    pub fn copy_manifests(&self, dest_dir: &Path) -> ManifestResult<()> {
        std::fs::create_dir_all(dest_dir).map_err(|e| ManifestError::io(dest_dir, e))?;
        for store in &self.stores {
            if let Err(err) = store.copy_to(dest_dir) {
                tracing::warn!(error = %err, "failed to copy manifest");
            }
        }
        Ok(())
    }

    /// Source paths of every record, by manifest then insertion order
    pub fn get_all_fullpaths(&self) -> Vec<PathBuf> {
        self.stores.iter().flat_map(|s| s.full_paths()).collect()
    }
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Counter of the run after the first `restart<N>` directory seen
fn infer_counter(restarts: &ManifestStore) -> Option<u32> {
    let re = Regex::new(r"^restart(\d+)$").ok()?;
    restarts.logical_paths().find_map(|path| {
        Path::new(path).components().find_map(|component| {
            let segment = component.as_os_str().to_str()?;
            let n: u32 = re.captures(segment)?.get(1)?.as_str().parse().ok()?;
            n.checked_add(1)
        })
    })
}

/// Lexically normalise a relative path: drop `.`, resolve `..`
fn normalize_logical(path: &Path) -> String {
    let mut parts: Vec<String> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if parts.last().is_some_and(|p| p != "..") {
                    parts.pop();
                } else {
                    parts.push("..".to_string());
                }
            }
            Component::Normal(name) => parts.push(name.to_string_lossy().into_owned()),
            Component::RootDir | Component::Prefix(_) => {}
        }
    }
    parts.join("/")
}
