//! tangram-wrap - Inspect executables and wrapper manifests.
//!
//! Print executable metadata, the manifest embedded in a wrapper, or the
//! artifacts a wrapper depends on.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use memmap2::Mmap;
use rayon::prelude::*;
use serde_json::json;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use tangram_wrap::{dependency_set, metadata, Manifest};

/// Inspect executables and wrapper manifests.
#[derive(Parser, Debug)]
#[command(name = "tangram-wrap")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbosity level (0=quiet, 1=warnings, 2=info, 3=debug)
    #[arg(short, long, global = true, default_value = "1")]
    verbosity: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the metadata of one or more executables as JSON
    Inspect {
        /// Number of parallel jobs (default: number of CPUs)
        #[arg(short, long)]
        jobs: Option<usize>,

        /// Files to inspect
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Print the manifest embedded in a wrapper
    Manifest {
        /// Compact JSON instead of pretty-printed
        #[arg(short, long)]
        compact: bool,

        /// Wrapper file
        file: PathBuf,
    },

    /// List the artifacts a wrapper references
    Deps {
        /// Wrapper file
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbosity);

    match cli.command {
        Commands::Inspect { jobs, files } => cmd_inspect(files, jobs),
        Commands::Manifest { compact, file } => cmd_manifest(&file, compact),
        Commands::Deps { file } => cmd_deps(&file),
    }
}

fn setup_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::ERROR,
        1 => Level::WARN,
        2 => Level::INFO,
        _ => Level::DEBUG,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .without_time()
        .finish();

    tracing::subscriber::set_global_default(subscriber).ok();
}

/// Memory-maps a file read-only.
fn map_file(path: &Path) -> Result<Mmap> {
    let file =
        File::open(path).with_context(|| format!("Failed to open: {}", path.display()))?;
    // SAFETY: the map is read-only and dropped before the command returns.
    unsafe { Mmap::map(&file) }.with_context(|| format!("Failed to map: {}", path.display()))
}

/// Reads the manifest embedded in a wrapper file.
fn read_manifest(path: &Path) -> Result<Manifest> {
    let data = map_file(path)?;
    match Manifest::decode(&data)
        .with_context(|| format!("Failed to read manifest: {}", path.display()))?
    {
        Some(manifest) => Ok(manifest),
        None => bail!("Not a wrapper: {}", path.display()),
    }
}

fn cmd_inspect(files: Vec<PathBuf>, jobs: Option<usize>) -> Result<()> {
    let start = Instant::now();

    // Configure thread pool
    if let Some(n) = jobs {
        rayon::ThreadPoolBuilder::new()
            .num_threads(n)
            .build_global()
            .ok();
    }

    let results: Vec<_> = files
        .par_iter()
        .map(|path| {
            let result = map_file(path).and_then(|data| Ok(metadata(&data)?));
            match result {
                Ok(meta) => json!({ "path": path, "metadata": meta }),
                Err(err) => {
                    warn!("{}: {:#}", path.display(), err);
                    json!({ "path": path, "error": format!("{:#}", err) })
                }
            }
        })
        .collect();

    let failed = results.iter().filter(|r| r.get("error").is_some()).count();
    println!("{}", serde_json::to_string_pretty(&results)?);

    info!(
        "Inspected {} files in {:.2}s",
        files.len(),
        start.elapsed().as_secs_f64()
    );
    if failed > 0 {
        error!("{} of {} files could not be classified", failed, files.len());
    }

    Ok(())
}

fn cmd_manifest(path: &Path, compact: bool) -> Result<()> {
    let manifest = read_manifest(path)?;
    let out = if compact {
        serde_json::to_string(&manifest)?
    } else {
        serde_json::to_string_pretty(&manifest)?
    };
    println!("{}", out);
    Ok(())
}

fn cmd_deps(path: &Path) -> Result<()> {
    let manifest = read_manifest(path)?;
    let deps = dependency_set(&manifest);
    if deps.is_empty() {
        info!("{} references no artifacts", path.display());
    }
    for id in deps {
        println!("{}", id);
    }
    Ok(())
}
