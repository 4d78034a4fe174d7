//! Manifest configuration, read from `manifest.toml` in the control directory

use super::{HashKind, StoreKind};
use crate::error::{ManifestError, ManifestResult};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "manifest.toml";

/// Upper bound on hashing workers regardless of configuration
pub const MAX_WORKERS: usize = 64;

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

fn one_or_many<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(value) => vec![value],
        OneOrMany::Many(values) => values,
    })
}

/// Per-store overrides of the run-level reproduce flag
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReproduceConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exe: Option<bool>,
}

impl ReproduceConfig {
    /// Effective reproduce flag for a store
    pub fn resolve(&self, kind: StoreKind, reproduce: bool) -> bool {
        let over = match kind {
            StoreKind::Input => self.input,
            StoreKind::Restart => self.restart,
            StoreKind::Exe => self.exe,
        };
        over.unwrap_or(reproduce)
    }
}

/// Manifest configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestConfig {
    /// Fast hash kinds, tried in order
    #[serde(default = "default_fast_hashes", deserialize_with = "one_or_many")]
    pub fasthash: Vec<HashKind>,

    /// Full hash kinds, all computed
    #[serde(default = "default_full_hashes", deserialize_with = "one_or_many")]
    pub fullhash: Vec<HashKind>,

    /// Glob patterns matched against file basenames
    #[serde(default = "default_ignore", deserialize_with = "one_or_many")]
    pub ignore: Vec<String>,

    #[serde(default)]
    pub reproduce: ReproduceConfig,

    /// Inputs are rescanned each run, so stale entries can be pruned
    #[serde(default = "default_scaninputs")]
    pub scaninputs: bool,

    /// Hashing worker cap
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,

    /// Store directory, relative to the control directory
    #[serde(default = "default_manifest_dir")]
    pub manifest_dir: PathBuf,
}

fn default_fast_hashes() -> Vec<HashKind> {
    vec![HashKind::Binhash]
}

fn default_full_hashes() -> Vec<HashKind> {
    vec![HashKind::Sha256]
}

fn default_ignore() -> Vec<String> {
    vec![".*".to_string()]
}

fn default_scaninputs() -> bool {
    true
}

fn default_manifest_dir() -> PathBuf {
    PathBuf::from("manifests")
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            fasthash: default_fast_hashes(),
            fullhash: default_full_hashes(),
            ignore: default_ignore(),
            reproduce: ReproduceConfig::default(),
            scaninputs: default_scaninputs(),
            concurrency: None,
            manifest_dir: default_manifest_dir(),
        }
    }
}

impl ManifestConfig {
    /// Load config from `<control_dir>/manifest.toml`, or defaults if absent
    pub fn load(control_dir: &Path) -> ManifestResult<Self> {
        let config_path = control_dir.join(CONFIG_FILE);
        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| ManifestError::io(&config_path, e))?;
        let config: ManifestConfig = toml::from_str(&content)
            .map_err(|e| ManifestError::Config(format!("{}: {}", config_path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check hash kinds sit in the right tier and patterns compile
    pub fn validate(&self) -> ManifestResult<()> {
        if self.fasthash.is_empty() {
            return Err(ManifestError::Config("fasthash must name at least one hash".into()));
        }
        if self.fullhash.is_empty() {
            return Err(ManifestError::Config("fullhash must name at least one hash".into()));
        }
        if let Some(kind) = self.fasthash.iter().find(|k| !k.is_fast()) {
            return Err(ManifestError::Config(format!("{} is not a fast hash", kind)));
        }
        if let Some(kind) = self.fullhash.iter().find(|k| k.is_fast()) {
            return Err(ManifestError::Config(format!("{} is not a full hash", kind)));
        }
        if self.concurrency == Some(0) {
            return Err(ManifestError::Config("concurrency must be at least 1".into()));
        }
        self.ignore_patterns()?;
        Ok(())
    }

    pub fn ignore_patterns(&self) -> ManifestResult<Vec<glob::Pattern>> {
        self.ignore
            .iter()
            .map(|p| glob::Pattern::new(p).map_err(ManifestError::from))
            .collect()
    }

    /// Every configured kind, fast kinds first
    pub fn hash_kinds(&self) -> Vec<HashKind> {
        self.fasthash.iter().chain(&self.fullhash).copied().collect()
    }

    /// Number of hashing workers to allow
    pub fn worker_count(&self) -> usize {
        let available = std::thread::available_parallelism().map_or(4, |v| v.get());
        self.concurrency
            .unwrap_or(available)
            .clamp(1, MAX_WORKERS)
    }
}
