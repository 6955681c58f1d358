//! ringshift CLI
//!
//! Ring membership, chunked file transfer and join-time migration for a
//! consistent-hashing storage ring.

mod config;
mod progress;

use anyhow::Context;
use clap::{Parser, Subcommand};
use console::style;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use config::Config;
use progress::{ChunkProgress, format_bytes, format_duration};
use ringshift_core::{
    HttpChunkTransport, MigrationCoordinator, MigrationReport, RpcRingConnector, TransferAgent,
    create_ring, join_ring, place_file,
};
use ringshift_discovery::{HttpListingClient, ListingBody, hash_key, list_local_files};
use ringshift_files::{ChunkHandle, parse_chunk_ordinal};

/// ringshift - move files to the ring node that owns them
#[derive(Parser)]
#[command(name = "ringshift")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file path [default: <config dir>/ringshift/config.toml]
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the ring key of each name
    Hash {
        /// File names to hash
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// List files stored locally with their ring keys
    Files {
        /// Directory to list [default: storage_dir]
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Print the listing endpoint's JSON body
        #[arg(long)]
        json: bool,
    },

    /// Start a new ring on a node
    Create {
        /// Host running the ring binary
        #[arg(long)]
        node: String,
    },

    /// Join a node to an existing ring, then migrate the files it now owns
    Join {
        /// Host of the joining node
        #[arg(long)]
        node: String,

        /// Host of any node already in the ring
        #[arg(long)]
        via: String,

        /// Join only, do not migrate
        #[arg(long)]
        no_migrate: bool,
    },

    /// Migrate files the node now owns from its successor
    Migrate {
        /// Host of the node receiving files
        #[arg(long)]
        node: String,
    },

    /// Download a file from a peer as chunks and reconstruct it
    Pull {
        /// File name on the peer
        #[arg(required = true)]
        file: String,

        /// Peer host
        #[arg(long)]
        from: String,

        /// Directory receiving the reconstructed file [default: work dir]
        #[arg(long)]
        into: Option<PathBuf>,
    },

    /// Split a file into chunks and upload them to a peer
    Push {
        /// File to send
        #[arg(required = true)]
        file: PathBuf,

        /// Peer host
        #[arg(long)]
        to: String,

        /// Override the configured chunk size
        #[arg(long)]
        chunk_size: Option<usize>,
    },

    /// Split a file into chunk artifacts
    Split {
        /// File to split
        #[arg(required = true)]
        file: PathBuf,

        /// Output directory [default: work_dir]
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Override the configured chunk size
        #[arg(long)]
        chunk_size: Option<usize>,
    },

    /// Reassemble a file from its chunk artifacts
    Combine {
        /// Original file name
        #[arg(required = true)]
        name: String,

        /// Directory holding the chunks [default: work_dir]
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Output path [default: <dir>/<name>]
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => Config::load_or_default()?,
    };
    config.validate()?;

    init_logging(&config, cli.verbose)?;

    match cli.command {
        Commands::Hash { names } => hash_names(&names),
        Commands::Files { dir, json } => list_files(dir, json, &config)?,
        Commands::Create { node } => create(&node, &config).await?,
        Commands::Join {
            node,
            via,
            no_migrate,
        } => join(&node, &via, no_migrate, &config).await?,
        Commands::Migrate { node } => migrate(&node, &config).await?,
        Commands::Pull { file, from, into } => pull(&file, &from, into, &config).await?,
        Commands::Push {
            file,
            to,
            chunk_size,
        } => push(&file, &to, chunk_size, &config).await?,
        Commands::Split {
            file,
            out,
            chunk_size,
        } => split(file, out, chunk_size, &config).await?,
        Commands::Combine { name, dir, out } => combine(&name, dir, out, &config).await?,
        Commands::Config => print!("{}", toml::to_string_pretty(&config)?),
    }

    Ok(())
}

/// Install the `tracing` subscriber
///
/// `--verbose` forces `debug`. Otherwise `RUST_LOG` wins over the configured level.
fn init_logging(config: &Config, verbose: bool) -> anyhow::Result<()> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.logging.level.to_lowercase()))
    };

    match &config.logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Arc::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

fn agent(config: &Config, chunk_size: Option<usize>) -> anyhow::Result<TransferAgent> {
    let node = config.to_node_config();
    let mut transfer = node.transfer.clone();
    if let Some(size) = chunk_size {
        transfer.chunk_size = size;
    }
    transfer.validate()?;

    let transport = HttpChunkTransport::new(node.network.chunk_port, node.network.rpc_timeout)?;
    Ok(TransferAgent::new(transfer, Arc::new(transport)))
}

fn coordinator(config: &Config) -> anyhow::Result<MigrationCoordinator> {
    let node = config.to_node_config();
    let listing = HttpListingClient::new(node.network.listing_port, node.network.rpc_timeout)?;
    let connector = RpcRingConnector::from_config(&node.network);

    Ok(MigrationCoordinator::new(
        &node,
        Arc::new(connector),
        Arc::new(listing),
        agent(config, None)?,
    )
    .with_retry(config.retry_policy()))
}

fn hash_names(names: &[String]) {
    for name in names {
        println!("{:>10}  {}", hash_key(name), name);
    }
}

fn list_files(dir: Option<PathBuf>, json: bool, config: &Config) -> anyhow::Result<()> {
    let dir = dir.unwrap_or_else(|| config.node.storage_dir.clone());
    let files = list_local_files(&dir)?;

    if json {
        println!("{}", serde_json::to_string(&ListingBody::success(files))?);
        return Ok(());
    }

    if files.is_empty() {
        println!("No files in {}", dir.display());
    }
    for (name, key) in &files {
        println!("{:>10}  {}", key, name);
    }
    Ok(())
}

async fn create(node: &str, config: &Config) -> anyhow::Result<()> {
    let connector = RpcRingConnector::from_config(&config.to_node_config().network);
    let info = create_ring(&connector, node).await?;
    println!("{} Ring created on {}", style("✓").green(), info);
    Ok(())
}

async fn join(node: &str, via: &str, no_migrate: bool, config: &Config) -> anyhow::Result<()> {
    let connector = RpcRingConnector::from_config(&config.to_node_config().network);
    let contact = join_ring(&connector, node, via).await?;
    println!("{} {} joined via {}", style("✓").green(), node, contact);

    if no_migrate {
        return Ok(());
    }

    let settle = config.settle_delay();
    if !settle.is_zero() {
        tracing::info!("Waiting {:?} for the ring to stabilize", settle);
        tokio::time::sleep(settle).await;
    }
    migrate(node, config).await
}

async fn migrate(node: &str, config: &Config) -> anyhow::Result<()> {
    let report = coordinator(config)?.run(node).await?;
    print_report(&report);

    if !report.is_clean() {
        anyhow::bail!("{} file(s) failed to migrate", report.failed.len());
    }
    Ok(())
}

fn print_report(report: &MigrationReport) {
    println!("Node:      {}", report.new_node);
    println!("Successor: {}", report.successor);
    println!("Range:     {}", report.interval);
    println!(
        "Listed {}, selected {}, skipped {} in {}",
        report.listed,
        report.selected.len(),
        report.skipped,
        format_duration(report.elapsed)
    );

    for file in &report.migrated {
        println!(
            "  {} {} ({})",
            style("✓").green(),
            file.name,
            format_bytes(file.bytes)
        );
    }
    for file in &report.failed {
        println!("  {} {}: {}", style("✗").red(), file.name, file.error);
    }
}

async fn pull(
    file: &str,
    from: &str,
    into: Option<PathBuf>,
    config: &Config,
) -> anyhow::Result<()> {
    let progress = ChunkProgress::new(file, "Pulling");
    let agent = agent(config, None)?.with_progress(progress.callback());

    let report = match agent.pull_file(from, file).await {
        Ok(report) => report,
        Err(e) => {
            progress.abandon();
            return Err(e.into());
        }
    };
    progress.finish_with_message(format!(
        "Pulled {} ({}, {} chunks)",
        report.file_name,
        format_bytes(report.bytes),
        report.chunks
    ));

    let dir = into.unwrap_or_else(|| config.transfer.work_dir.clone());
    let path = move_into(&report.path, &dir, &report.file_name).await?;
    println!("{}", path.display());
    Ok(())
}

async fn move_into(path: &Path, dir: &Path, name: &str) -> anyhow::Result<PathBuf> {
    let dest = dir.join(name);
    if let Err(e) = place_file(path, &dest).await {
        let _ = tokio::fs::remove_file(path).await;
        return Err(e).with_context(|| format!("placing {}", dest.display()));
    }
    Ok(dest)
}

async fn push(
    file: &Path,
    to: &str,
    chunk_size: Option<usize>,
    config: &Config,
) -> anyhow::Result<()> {
    if !file.is_file() {
        anyhow::bail!("File not found: {}", file.display());
    }
    let size = tokio::fs::metadata(file).await?.len();
    let name = file.display().to_string();

    println!("File: {} ({})", name, format_bytes(size));
    println!("Peer: {}", to);

    let progress = ChunkProgress::new(&name, "Pushing");
    let agent = agent(config, chunk_size)?.with_progress(progress.callback());
    let report = match agent.push_file(file, to).await {
        Ok(report) => report,
        Err(e) => {
            progress.abandon();
            return Err(e.into());
        }
    };

    if report.is_complete() {
        progress.finish_with_message(format!(
            "Pushed {} ({} chunks)",
            report.file_name, report.total_chunks
        ));
        Ok(())
    } else {
        progress.abandon();
        anyhow::bail!(
            "{} of {} chunks failed: {:?}",
            report.failed.len(),
            report.total_chunks,
            report.failed
        )
    }
}

async fn split(
    file: PathBuf,
    out: Option<PathBuf>,
    chunk_size: Option<usize>,
    config: &Config,
) -> anyhow::Result<()> {
    let out = out.unwrap_or_else(|| config.transfer.work_dir.clone());
    let chunk_size = chunk_size.unwrap_or(config.transfer.chunk_size);
    tokio::fs::create_dir_all(&out).await?;

    let chunks =
        tokio::task::spawn_blocking(move || ringshift_files::split(&file, chunk_size, &out))
            .await??;
    for chunk in &chunks {
        println!("{}", chunk.path.display());
    }
    Ok(())
}

/// Chunk artifacts of `name` in `dir`, ordered by ordinal
fn find_chunks(dir: &Path, name: &str) -> anyhow::Result<Vec<ChunkHandle>> {
    let mut chunks = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
        let entry = entry?;
        let file_name = entry.file_name();
        let Some(artifact) = file_name.to_str() else {
            continue;
        };
        if let Some((base, ordinal)) = parse_chunk_ordinal(artifact) {
            if base == name {
                chunks.push(ChunkHandle::new(ordinal, entry.path()));
            }
        }
    }
    chunks.sort_by_key(|chunk| chunk.ordinal);
    Ok(chunks)
}

async fn combine(
    name: &str,
    dir: Option<PathBuf>,
    out: Option<PathBuf>,
    config: &Config,
) -> anyhow::Result<()> {
    let dir = dir.unwrap_or_else(|| config.transfer.work_dir.clone());
    let out = out.unwrap_or_else(|| dir.join(name));
    let chunks = find_chunks(&dir, name)?;

    let target = out.clone();
    let manifest =
        tokio::task::spawn_blocking(move || ringshift_files::combine(&chunks, &target)).await??;

    if manifest.original_file_name != name {
        tracing::warn!(
            "Manifest names {} but {} was requested",
            manifest.original_file_name,
            name
        );
    }
    println!(
        "{} {} from {} chunks",
        style("✓").green(),
        out.display(),
        manifest.total_chunks
    );
    Ok(())
}
