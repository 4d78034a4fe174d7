//! Version control revision lookup for manifest headers

use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Revision lookup, called only when a manifest is written
pub type RevisionFn = Arc<dyn Fn() -> Option<String> + Send + Sync>;

/// Commit id of HEAD for the repository containing `dir`
pub fn git_revision(dir: &Path) -> Option<String> {
    let repo = git2::Repository::discover(dir).ok()?;
    let head = repo.head().ok()?;
    let commit = head.peel_to_commit().ok()?;
    Some(commit.id().to_string())
}

/// Revision source backed by the git repository containing `dir`
pub fn git_revision_source(dir: impl Into<PathBuf>) -> RevisionFn {
    let dir = dir.into();
    Arc::new(move || git_revision(&dir))
}

/// Revision source for directories that are not under version control
pub fn no_revision() -> RevisionFn {
    Arc::new(|| None)
}
