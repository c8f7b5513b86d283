//! bbbc - command-line access to the BBBC dataset cache.
//!
//! Fetches catalogued datasets (or a custom JSON descriptor) into the local
//! cache and prints the resulting file paths. Logs go to stderr so stdout can
//! be piped.

use anyhow::{Context, Result};
use bbbc_datasets::{
    registry, AcquisitionReport, ArtifactRole, CacheConfig, DatasetCache, DatasetDescriptor,
    DownloadProgress,
};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "bbbc")]
#[command(about = "Download-on-demand cache for the Broad Bioimage Benchmark Collection")]
struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Storage root (defaults to $BBBC_DATASETS_ROOT or ~/.bbbc_datasets)
    #[arg(long, global = true)]
    storage_root: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the catalogued datasets
    List {
        /// Only volumetric datasets
        #[arg(long = "3d", conflicts_with = "two_d")]
        three_d: bool,

        /// Only planar datasets
        #[arg(long = "2d")]
        two_d: bool,
    },

    /// Download and unpack a catalogued dataset
    Fetch {
        /// Dataset id, e.g. BBBC039
        id: String,

        #[arg(long)]
        variant: Option<String>,

        /// Print the acquisition report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the files of a cached dataset without downloading
    Paths {
        id: String,

        #[arg(long)]
        variant: Option<String>,

        #[arg(long, value_enum, default_value_t = RoleArg::Images)]
        role: RoleArg,
    },

    /// Check that every URL of a dataset is reachable
    Probe {
        id: String,

        #[arg(long)]
        variant: Option<String>,
    },

    /// Download and unpack a dataset described by a JSON file
    FetchDescriptor {
        /// Cache directory name
        name: String,

        /// JSON object mapping role keys to URLs
        file: PathBuf,

        #[arg(long)]
        json: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum RoleArg {
    Images,
    Labels,
    Segmentation,
    Metadata,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    let config = match args.storage_root {
        Some(root) => CacheConfig::with_storage_root(root),
        None => CacheConfig::from_env()?,
    };

    match args.command {
        Command::List { three_d, two_d } => {
            let is_3d = match (three_d, two_d) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            };
            list(is_3d);
        }
        Command::Fetch { id, variant, json } => {
            let (name, descriptor) = registry::find(&id)?.descriptor(variant.as_deref())?;
            fetch(&name, descriptor, &config, json).await?;
        }
        Command::Paths { id, variant, role } => {
            let (name, descriptor) = registry::find(&id)?.descriptor(variant.as_deref())?;
            let cache = DatasetCache::builder(name, descriptor)
                .config(config)
                .open_offline()?;
            for path in role_paths(&cache, role) {
                println!("{}", path.display());
            }
        }
        Command::Probe { id, variant } => {
            let (name, descriptor) = registry::find(&id)?.descriptor(variant.as_deref())?;
            probe(&name, descriptor, &config).await?;
        }
        Command::FetchDescriptor { name, file, json } => {
            let descriptor = read_descriptor(&file)?;
            fetch(&name, descriptor, &config, json).await?;
        }
    }

    Ok(())
}

fn list(is_3d: Option<bool>) {
    for info in registry::filter(is_3d) {
        let dims = if info.is_3d { "3D" } else { "2D" };
        let variants = if info.variants.is_empty() {
            String::new()
        } else {
            format!(
                "  [{}; default {}]",
                info.variants.join(", "),
                info.default_variant.unwrap_or("-")
            )
        };
        println!("{:<8} {}  {}{}", info.id, dims, info.title, variants);
    }
}

fn read_descriptor(file: &Path) -> Result<DatasetDescriptor> {
    let json = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read descriptor {}", file.display()))?;
    Ok(DatasetDescriptor::from_json(&json)?)
}

async fn fetch(
    name: &str,
    descriptor: DatasetDescriptor,
    config: &CacheConfig,
    json: bool,
) -> Result<()> {
    let (tx, rx) = mpsc::channel(32);
    let reporter = tokio::spawn(log_progress(rx));

    let mut cache = DatasetCache::builder(name, descriptor)
        .config(config.clone())
        .progress(tx)
        .open()
        .await?;
    // Closing the channel lets the reporter log what is still queued and exit.
    drop(cache.detach_progress());
    if let Err(e) = reporter.await {
        warn!("Progress reporter failed: {}", e);
    }

    let report = cache.report();
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        print_summary(&cache, report);
    }
    Ok(())
}

/// Log every update until the channel closes; returns how many were logged.
async fn log_progress(mut rx: mpsc::Receiver<DownloadProgress>) -> usize {
    let mut logged = 0;
    while let Some(progress) = rx.recv().await {
        logged += 1;
        match progress.percent {
            Some(percent) => info!(
                "{}: {:.1}% ({:.1} MB/s)",
                progress.url,
                percent,
                progress.speed_bytes_per_sec / 1_000_000.0
            ),
            None => info!(
                "{}: {} bytes ({:.1} MB/s)",
                progress.url,
                progress.bytes_downloaded,
                progress.speed_bytes_per_sec / 1_000_000.0
            ),
        }
    }
    logged
}

fn print_summary(cache: &DatasetCache, report: &AcquisitionReport) {
    println!("{} -> {}", cache.name(), cache.root().display());
    println!(
        "  downloaded {} file(s), {} bytes; extracted {} archive(s)",
        report.downloaded(),
        report.bytes_transferred(),
        report.extracted()
    );
    println!("  images:       {}", cache.image_paths().len());
    println!("  labels:       {}", cache.label_paths().len());
    println!("  metadata:     {}", cache.metadata_paths().len());
    for (role, path) in cache.ground_truth_files() {
        println!("  {} ground truth: {}", role, path.display());
    }

    for outcome in report.outcomes.iter().filter(|o| o.state.is_failure()) {
        warn!(
            "{} ({}): {:?} {}",
            outcome.url,
            outcome.role_key,
            outcome.state,
            outcome.error.as_deref().unwrap_or("")
        );
    }
}

fn role_paths(cache: &DatasetCache, role: RoleArg) -> Vec<PathBuf> {
    match role {
        RoleArg::Images => cache.role_paths(ArtifactRole::Image),
        RoleArg::Labels => cache.role_paths(ArtifactRole::Label),
        RoleArg::Segmentation => cache.segmentation_paths(),
        RoleArg::Metadata => cache.role_paths(ArtifactRole::Metadata),
    }
}

async fn probe(name: &str, descriptor: DatasetDescriptor, config: &CacheConfig) -> Result<()> {
    let cache = DatasetCache::builder(name, descriptor)
        .config(config.clone())
        .open_offline()?;

    let results = cache.probe_all().await;
    let unreachable = results.iter().filter(|(_, ok)| !ok).count();
    for (url, ok) in &results {
        println!("{}  {}", if *ok { "ok  " } else { "FAIL" }, url);
    }
    if unreachable > 0 {
        anyhow::bail!("{} of {} URLs unreachable", unreachable, results.len());
    }
    Ok(())
}
