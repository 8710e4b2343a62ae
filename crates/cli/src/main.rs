//! `floectl`: read-only inspection CLI for Icechunk repositories.

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use floe_core::refs::RefSelector;
use floe_core::snapshot::Snapshot;
use floe_storage::HttpTransport;
use floe_store::{OpenOptions, Store};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::format_description::well_known::Rfc3339;
use tokio::io::AsyncWriteExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "floectl")]
#[command(about = "Read-only inspection CLI for Icechunk repositories")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct RepoArgs {
    /// Repository root URL
    #[arg(long, env = "FLOE_URL")]
    url: String,

    /// Branch to open (default: main)
    #[arg(long = "ref", value_name = "BRANCH", conflicts_with_all = ["tag", "snapshot"])]
    branch: Option<String>,

    /// Tag to open
    #[arg(long, conflicts_with = "snapshot")]
    tag: Option<String>,

    /// Snapshot id to open
    #[arg(long)]
    snapshot: Option<String>,

    /// Extra request header (repeatable)
    #[arg(long = "header", value_name = "NAME:VALUE")]
    headers: Vec<String>,

    /// Region for translating s3:// virtual chunk locations
    #[arg(long)]
    s3_region: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show snapshot information
    Info {
        #[command(flatten)]
        repo: RepoArgs,
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// List child nodes under a path
    Ls {
        #[command(flatten)]
        repo: RepoArgs,
        /// Hierarchy path (default: root)
        path: Option<String>,
    },
    /// Read one Zarr key and write its bytes
    Get {
        #[command(flatten)]
        repo: RepoArgs,
        /// Zarr key, e.g. `zarr.json` or `temperature/c/0/0`
        key: String,
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match Cli::parse().command {
        Commands::Info { repo, json } => info(&repo, json).await,
        Commands::Ls { repo, path } => ls(&repo, path.as_deref().unwrap_or("")).await,
        Commands::Get { repo, key, output } => get(&repo, &key, output.as_deref()).await,
    }
}

async fn open_store(repo: &RepoArgs) -> Result<Store> {
    let reference = if let Some(snapshot) = &repo.snapshot {
        RefSelector::from_snapshot_str(snapshot).context("invalid --snapshot")?
    } else if let Some(tag) = &repo.tag {
        RefSelector::Tag(tag.clone())
    } else if let Some(branch) = &repo.branch {
        RefSelector::Branch(branch.clone())
    } else {
        RefSelector::default()
    };

    let mut headers = HashMap::new();
    for header in &repo.headers {
        let (name, value) = header
            .split_once(':')
            .with_context(|| format!("invalid header {header:?}, expected NAME:VALUE"))?;
        headers.insert(name.trim().to_string(), value.trim().to_string());
    }

    let options = OpenOptions {
        reference,
        headers,
        s3_region: repo.s3_region.clone(),
        ..OpenOptions::default()
    };
    Store::open(&repo.url, Arc::new(HttpTransport::new()), options)
        .await
        .context("failed to open repository")
}

#[derive(Serialize)]
struct SnapshotInfo<'a> {
    id: String,
    parent_id: Option<String>,
    flushed_at: String,
    message: &'a str,
    metadata: &'a BTreeMap<String, String>,
    nodes: usize,
    arrays: usize,
    groups: usize,
    manifest_files: Vec<String>,
}

impl<'a> SnapshotInfo<'a> {
    fn new(snapshot: &'a Snapshot) -> Result<Self> {
        let arrays = snapshot.nodes().iter().filter(|n| n.is_array()).count();
        Ok(Self {
            id: snapshot.id.to_base32(),
            parent_id: snapshot.parent_id.map(|id| id.to_base32()),
            flushed_at: snapshot
                .flushed_at
                .format(&Rfc3339)
                .context("failed to format flushed-at timestamp")?,
            message: &snapshot.message,
            metadata: &snapshot.metadata,
            nodes: snapshot.nodes().len(),
            arrays,
            groups: snapshot.nodes().len() - arrays,
            manifest_files: snapshot
                .manifest_files
                .iter()
                .map(|id| id.to_base32())
                .collect(),
        })
    }
}

async fn info(repo: &RepoArgs, json: bool) -> Result<()> {
    let store = open_store(repo).await?;
    let snapshot = store.snapshot();
    let info = SnapshotInfo::new(&snapshot)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("snapshot:       {}", info.id);
    if let Some(parent) = &info.parent_id {
        println!("parent:         {parent}");
    }
    println!("flushed at:     {}", info.flushed_at);
    println!("message:        {}", info.message);
    for (key, value) in info.metadata {
        println!("metadata:       {key}={value}");
    }
    println!(
        "nodes:          {} ({} arrays, {} groups)",
        info.nodes, info.arrays, info.groups
    );
    println!("manifest files: {}", info.manifest_files.len());
    Ok(())
}

async fn ls(repo: &RepoArgs, path: &str) -> Result<()> {
    let store = open_store(repo).await?;
    for child in store.list_children(path) {
        println!("{child}");
    }
    Ok(())
}

async fn get(repo: &RepoArgs, key: &str, output: Option<&Path>) -> Result<()> {
    let store = open_store(repo).await?;
    let Some(bytes) = store.get(key).await? else {
        bail!("key not found: {key}");
    };
    match output {
        Some(path) => tokio::fs::write(path, &bytes)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(&bytes).await?;
            stdout.flush().await?;
        }
    }
    Ok(())
}
