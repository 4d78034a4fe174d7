use crate::manifest::{ManifestStore, YamlFile};
use crate::models::{ManifestConfig, StoreKind};
use crate::vcs;
use crate::Result;
use colored::Colorize;
use std::path::Path;

/// Load one manifest from the control directory without modifying it
pub fn load_store(control_dir: &Path, kind: StoreKind) -> Result<ManifestStore> {
    let config = ManifestConfig::load(control_dir)?;
    let path = control_dir.join(&config.manifest_dir).join(kind.file_name());

    let mut store = ManifestStore::new(
        Box::new(YamlFile::new(path, vcs::no_revision())),
        config.hash_kinds(),
        Vec::new(),
    );
    store.load()?;
    Ok(store)
}

pub fn run(control_dir: &Path, kind: StoreKind, json: bool) -> Result<()> {
    let store = load_store(control_dir, kind)?;

    if json {
        let entries: Vec<_> = store
            .iter()
            .map(|r| {
                serde_json::json!({
                    "path": r.logical_path,
                    "fullpath": r.full_path,
                    "hashes": r.hashes,
                    "copy": r.copy,
                })
            })
            .collect();
        let output = serde_json::json!({
            "manifest": kind.as_str(),
            "vcs_revision": store.header().vcs_revision,
            "entries": entries,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!(
        "{}",
        format!("{} manifest: {}", kind, store.location().display())
            .cyan()
            .bold()
    );
    if let Some(rev) = &store.header().vcs_revision {
        println!("   Revision: {}", rev);
    }
    if store.is_empty() {
        println!("   {}", "(empty)".bright_black());
        return Ok(());
    }

    for record in store.iter() {
        let mode = if record.copy { "copy" } else { "link" };
        println!(
            "   {} → {} [{}]",
            record.logical_path.bold(),
            record.full_path.display(),
            mode
        );
        for (kind, value) in &record.hashes {
            let value = value.as_deref().unwrap_or("-");
            println!("      {:<8} {}", kind.as_str(), value.bright_black());
        }
    }

    Ok(())
}
