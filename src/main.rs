use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use colored::Colorize;
use runmanifest::cli;
use runmanifest::{ManifestError, Result, StoreKind};
use std::io;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "runmanifest")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Record and verify the files behind a simulation run", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Control directory holding manifest.toml and the manifests
    #[arg(short = 'C', long, global = true, default_value = ".")]
    control_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load, verify, link and write the run manifests
    Setup(cli::setup::SetupArgs),

    /// Print the records of one manifest
    Show {
        /// Manifest: input, restart or exe
        store: StoreKind,

        /// Output in JSON format
        #[arg(short, long)]
        json: bool,
    },

    /// Copy the manifests into another directory
    Copy {
        /// Destination directory
        dest: PathBuf,
    },

    /// Generate shell completions
    Completions {
        /// Shell type
        shell: Shell,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    if let Err(err) = run(cli) {
        eprintln!("{} {:#}", "Error:".red().bold(), err);
        let code = err
            .downcast_ref::<ManifestError>()
            .map_or(1, ManifestError::exit_code);
        std::process::exit(code);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Setup(args) => {
            if args.reproduce {
                println!("{}", "🔁 Reproducing recorded run".cyan());
            }
            cli::setup::run(&cli.control_dir, &args)?;
        }

        Commands::Show { store, json } => {
            cli::show::run(&cli.control_dir, store, json)?;
        }

        Commands::Copy { dest } => {
            cli::copy::run(&cli.control_dir, &dest)?;
        }

        Commands::Completions { shell } => {
            generate(shell, &mut Cli::command(), "runmanifest", &mut io::stdout());
        }
    }

    Ok(())
}
