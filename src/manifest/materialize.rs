//! Realize a manifest store in a work directory as symlinks or copies

use super::store::ManifestStore;
use crate::error::{ManifestError, ManifestResult};
use std::fs;
use std::io;
use std::path::Path;

/// What `make_links` did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaterializeReport {
    pub linked: usize,
    pub copied: usize,
    /// Symlink already pointed at the source
    pub unchanged: usize,
    /// A regular file occupied the link location and was left alone
    pub conflicts: Vec<String>,
    /// Source vanished; record dropped from the store
    pub removed: Vec<String>,
}

#[derive(Debug, PartialEq, Eq)]
enum LinkOutcome {
    Created,
    Replaced,
    Unchanged,
    Conflict,
}

/// Link or copy every record into `work_dir`
pub fn make_links(store: &mut ManifestStore, work_dir: &Path) -> ManifestResult<MaterializeReport> {
    let mut report = MaterializeReport::default();

    for record in store.iter() {
        let src = record.full_path();
        if !src.exists() {
            tracing::warn!(
                path = %src.display(),
                manifest = %store.location().display(),
                "file not found, removing from manifest"
            );
            report.removed.push(record.logical_path.clone());
            continue;
        }

        let dest = work_dir.join(&record.logical_path);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| ManifestError::io(parent, e))?;
        }

        if record.copy {
            copy_file(src, &dest).map_err(|e| ManifestError::io(&dest, e))?;
            report.copied += 1;
            continue;
        }

        match make_symlink(src, &dest).map_err(|e| ManifestError::io(&dest, e))? {
            LinkOutcome::Created | LinkOutcome::Replaced => report.linked += 1,
            LinkOutcome::Unchanged => report.unchanged += 1,
            LinkOutcome::Conflict => {
                tracing::warn!(
                    src = %src.display(),
                    dest = %dest.display(),
                    "cannot create symbolic link, a file with that name already exists"
                );
                report.conflicts.push(record.logical_path.clone());
            }
        }
    }

    store.remove_all(report.removed.iter().map(String::as_str));

    Ok(report)
}

fn copy_file(src: &Path, dest: &Path) -> io::Result<()> {
    // A link left by an earlier run would make the copy write into the source
    if fs::symlink_metadata(dest).is_ok_and(|m| m.file_type().is_symlink()) {
        fs::remove_file(dest)?;
    }
    fs::copy(src, dest)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dest, fs::Permissions::from_mode(0o644))?;
    }

    Ok(())
}

fn make_symlink(src: &Path, link: &Path) -> io::Result<LinkOutcome> {
    match fs::symlink_metadata(link) {
        Ok(meta) if meta.file_type().is_symlink() => {
            if fs::read_link(link)? == src {
                return Ok(LinkOutcome::Unchanged);
            }
            fs::remove_file(link)?;
            symlink(src, link)?;
            Ok(LinkOutcome::Replaced)
        }
        Ok(_) => Ok(LinkOutcome::Conflict),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            symlink(src, link)?;
            Ok(LinkOutcome::Created)
        }
        Err(e) => Err(e),
    }
}

#[cfg(unix)]
fn symlink(src: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(src, link)
}

#[cfg(windows)]
fn symlink(src: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(src, link)
}
