//! `runmanifest setup` - run the full manifest lifecycle for one run

use crate::manifest::{CheckReport, ManifestGroup, MaterializeReport};
use crate::models::{ManifestConfig, StoreKind};
use crate::vcs;
use crate::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::{Path, PathBuf};

#[derive(Args, Debug, Clone, Default)]
pub struct SetupArgs {
    /// Require bit-identical files to the recorded manifests
    #[arg(long)]
    pub reproduce: bool,

    /// Do not require the exe manifest when reproducing
    #[arg(long)]
    pub no_reproduce_exe: bool,

    /// Run counter (inferred from the restart manifest when reproducing)
    #[arg(long)]
    pub counter: Option<u32>,

    /// Work directory to populate
    #[arg(short, long, default_value = "work")]
    pub work_dir: PathBuf,

    /// Model executable
    #[arg(long)]
    pub exe: Option<PathBuf>,

    /// Input directory to scan (repeatable)
    #[arg(long = "input")]
    pub inputs: Vec<PathBuf>,

    /// Show hashing progress
    #[arg(long)]
    pub progress: bool,
}

pub fn run(control_dir: &Path, args: &SetupArgs) -> Result<()> {
    let mut config = ManifestConfig::load(control_dir)?;
    if args.no_reproduce_exe {
        config.reproduce.exe = Some(false);
    }

    let mut group = ManifestGroup::new(config, control_dir, vcs::git_revision_source(control_dir))?
        .with_progress(args.progress);

    group.setup(args.reproduce, args.counter)?;

    if group.scaninputs() {
        for dir in &args.inputs {
            let count = group
                .add_directory(StoreKind::Input, dir, "")
                .with_context(|| format!("Failed to scan input directory {}", dir.display()))?;
            println!("   {} {} input files from {}", "+".green(), count, dir.display());
        }
    }

    if let Some(exe) = &args.exe {
        let name = exe
            .file_name()
            .map(PathBuf::from)
            .with_context(|| format!("Invalid executable path {}", exe.display()))?;
        group.add_filepath(StoreKind::Exe, name, exe, false)?;
    }

    let checks = group.verify()?;
    let links = group.make_links(&args.work_dir)?;
    let written = group.finalize()?;

    print_summary(&group, &checks, &links, &written);
    Ok(())
}

fn print_summary(
    group: &ManifestGroup,
    checks: &[(StoreKind, CheckReport)],
    links: &[(StoreKind, MaterializeReport)],
    written: &[StoreKind],
) {
    println!("{}", "Manifests".cyan().bold());
    for kind in StoreKind::ALL {
        let store = group.store(kind);
        let mode = if group.reproduce(kind) {
            "reproduce".yellow()
        } else {
            "record".normal()
        };
        println!("   {:<8} {:>5} files  [{}]", kind.as_str(), store.len(), mode);

        if let Some((_, report)) = checks.iter().find(|(k, _)| *k == kind) {
            if !report.healed.is_empty() {
                println!("            {} fast hashes refreshed", report.healed.len());
            }
            if !report.rehashed.is_empty() {
                println!("            {} full hashes updated", report.rehashed.len());
            }
        }
        if let Some((_, report)) = links.iter().find(|(k, _)| *k == kind) {
            for path in &report.removed {
                println!("            {} {} (source missing)", "-".red(), path);
            }
            for path in &report.conflicts {
                println!("            {} {} (not a symlink, left in place)", "!".yellow(), path);
            }
        }
    }

    if let Some(counter) = group.counter() {
        println!("   Counter: {}", counter);
    }

    if written.is_empty() {
        println!("{}", "No manifest changes".bright_black());
    } else {
        let names: Vec<_> = written.iter().map(|k| k.file_name()).collect();
        println!("{}", format!("Wrote {}", names.join(", ")).green());
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_setup_records_then_reproduces() {
        let temp = TempDir::new().unwrap();
        let control = temp.path().join("control");
        let inputs = temp.path().join("inputs");
        std::fs::create_dir_all(&control).unwrap();
        std::fs::create_dir_all(inputs.join("grid")).unwrap();
        std::fs::write(inputs.join("grid/ocean_hgrid.nc"), "grid").unwrap();
        std::fs::write(inputs.join("forcing.nc"), "forcing").unwrap();
        let exe = temp.path().join("model.exe");
        std::fs::write(&exe, "binary").unwrap();
        std::fs::write(control.join("manifest.toml"), "[reproduce]\nrestart = false\n").unwrap();

        let args = SetupArgs {
            work_dir: control.join("work"),
            exe: Some(exe.clone()),
            inputs: vec![inputs.clone()],
            ..SetupArgs::default()
        };
        run(&control, &args).unwrap();

        let work = control.join("work");
        assert_eq!(
            std::fs::read_link(work.join("grid/ocean_hgrid.nc")).unwrap(),
            inputs.join("grid/ocean_hgrid.nc")
        );
        assert_eq!(std::fs::read_link(work.join("model.exe")).unwrap(), exe);
        assert!(control.join("manifests/input.yaml").exists());
        assert!(control.join("manifests/exe.yaml").exists());

        let reproduce = SetupArgs {
            reproduce: true,
            work_dir: control.join("work"),
            exe: Some(exe),
            ..SetupArgs::default()
        };
        run(&control, &reproduce).unwrap();

        std::fs::write(inputs.join("forcing.nc"), "tampered").unwrap();
        let err = run(&control, &reproduce).unwrap_err();
        let manifest_err = err.downcast_ref::<crate::ManifestError>().unwrap();
        assert_eq!(manifest_err.exit_code(), 3);
        assert!(err.to_string().contains("forcing.nc"));
    }
}
