//! HashEngine - single and batched hashing over a bounded worker pool

use super::digest;
use crate::error::{ManifestError, ManifestResult};
use crate::models::{HashKind, ManifestConfig};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::path::{Path, PathBuf};

/// Hash values computed for one file, in the order the kinds were tried
pub type ComputedHashes = Vec<(HashKind, String)>;

/// Computes fast and full hashes with the configured kinds
#[derive(Debug, Clone)]
pub struct HashEngine {
    fast: Vec<HashKind>,
    full: Vec<HashKind>,
    workers: usize,
    progress: bool,
}

impl HashEngine {
    pub fn new(fast: Vec<HashKind>, full: Vec<HashKind>, workers: usize) -> Self {
        Self {
            fast,
            full,
            workers: workers.max(1),
            progress: false,
        }
    }

    pub fn from_config(config: &ManifestConfig) -> Self {
        Self::new(
            config.fasthash.clone(),
            config.fullhash.clone(),
            config.worker_count(),
        )
    }

    /// Show a progress bar on stderr during batch hashing
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    pub fn fast_kinds(&self) -> &[HashKind] {
        &self.fast
    }

    pub fn full_kinds(&self) -> &[HashKind] {
        &self.full
    }

    /// Hash one file with one kind
    pub fn compute(&self, full_path: &Path, kind: HashKind) -> ManifestResult<String> {
        digest::compute(full_path, kind).map_err(|source| ManifestError::HashCompute {
            path: full_path.to_path_buf(),
            source,
        })
    }

    /// Hash one file with several kinds.
    ///
    /// With `short_circuit` the first kind that succeeds wins and failures of
    /// earlier kinds are skipped; otherwise every kind must succeed.
    pub fn compute_all(
        &self,
        full_path: &Path,
        kinds: &[HashKind],
        short_circuit: bool,
    ) -> ManifestResult<ComputedHashes> {
        let mut computed = Vec::with_capacity(kinds.len());
        let mut last_err = None;

        for &kind in kinds {
            match self.compute(full_path, kind) {
                Ok(value) => {
                    tracing::debug!(path = %full_path.display(), %kind, "hashed");
                    computed.push((kind, value));
                    if short_circuit {
                        return Ok(computed);
                    }
                }
                Err(err) if short_circuit => {
                    tracing::debug!(path = %full_path.display(), %kind, error = %err, "hash failed, trying next kind");
                    last_err = Some(err);
                }
                Err(err) => return Err(err),
            }
        }

        match last_err {
            Some(err) => Err(err),
            None => Ok(computed),
        }
    }

    /// Hash many files in parallel; results follow the order of `paths`
    pub fn batch_compute(
        &self,
        paths: &[PathBuf],
        kinds: &[HashKind],
        short_circuit: bool,
    ) -> ManifestResult<Vec<ComputedHashes>> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }

        let threads = self.workers.min(paths.len());
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("hash-{}", i))
            .build()?;

        let progress = self.progress_bar(paths.len());

        let results = pool.install(|| {
            paths
                .par_iter()
                .map(|path| {
                    let result = self.compute_all(path, kinds, short_circuit);
                    progress.inc(1);
                    result
                })
                .collect::<ManifestResult<Vec<_>>>()
        });

        progress.finish_and_clear();
        results
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.progress {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(len as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.cyan} hashing [{bar:30.cyan/blue}] {pos}/{len}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        pb
    }
}
