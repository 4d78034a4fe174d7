use crate::manifest::ManifestGroup;
use crate::models::ManifestConfig;
use crate::vcs;
use crate::Result;
use colored::Colorize;
use std::path::Path;

/// Copy the control directory's manifests into `dest`
pub fn run(control_dir: &Path, dest: &Path) -> Result<()> {
    let config = ManifestConfig::load(control_dir)?;
    let group = ManifestGroup::new(config, control_dir, vcs::no_revision())?;

    group.copy_manifests(dest)?;
    println!(
        "{}",
        format!("Copied manifests to {}", dest.display()).green()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_copy_existing_manifests_only() {
        let temp = TempDir::new().unwrap();
        let manifests = temp.path().join("manifests");
        std::fs::create_dir_all(&manifests).unwrap();
        std::fs::write(manifests.join("input.yaml"), "entries: {}\n").unwrap();

        let dest = temp.path().join("archive/output000/manifests");
        run(temp.path(), &dest).unwrap();

        assert!(dest.join("input.yaml").exists());
        assert!(!dest.join("exe.yaml").exists());
    }
}
