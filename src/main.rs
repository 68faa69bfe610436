//! shardstore - Type-Sharded File Store
//!
//! Entry point for the CLI application.

use anyhow::{bail, Context, Result};
use clap::Parser;
use shardstore::config::{ClientAction, CliArgs, Command, StoreConfig};
use shardstore::server::shutdown_signal;
use shardstore::{Category, Coordinator, StorageNode, StoreClient};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    // Parse CLI arguments
    let args = CliArgs::parse();

    // Setup logging
    setup_logging(args.verbose)?;

    // Validate and create config
    let config = StoreConfig::from_args(&args).context("Invalid configuration")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create async runtime")?;

    runtime.block_on(async {
        match args.command {
            Command::Coordinator { bind, port, .. } => run_coordinator(config, &bind, port).await,
            Command::Node {
                category,
                bind,
                port,
                ..
            } => run_node(config, &category, &bind, port).await,
            Command::Client { server, action } => run_client(config, &server, action).await,
        }
    })
}

async fn run_coordinator(config: StoreConfig, bind: &str, port: u16) -> Result<()> {
    let coordinator = Coordinator::open(&config)
        .await
        .context("Failed to open coordinator root")?;

    let listener = TcpListener::bind((bind, port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", bind, port))?;

    coordinator
        .run(listener, shutdown_signal())
        .await
        .context("Coordinator failed")
}

async fn run_node(config: StoreConfig, category: &str, bind: &str, port: Option<u16>) -> Result<()> {
    let category: Category = category.parse()?;
    if category == config.namespace.local_category() {
        bail!("{} files are served by the coordinator", category);
    }
    let port = port.unwrap_or_else(|| category.default_port());

    let node = StorageNode::open(&config, category)
        .await
        .with_context(|| format!("Failed to open {} root", category))?;

    let listener = TcpListener::bind((bind, port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", bind, port))?;

    node.run(listener, shutdown_signal())
        .await
        .context("Storage node failed")
}

async fn run_client(config: StoreConfig, server: &str, action: ClientAction) -> Result<()> {
    let mut client = StoreClient::connect(server, config.wire)
        .await
        .with_context(|| format!("Failed to connect to {}", server))?;

    match action {
        ClientAction::Upload { file, destination } => {
            client
                .upload(&file, &destination)
                .await
                .with_context(|| format!("Upload of {} failed", file.display()))?;
        }
        ClientAction::Download { path, output } => {
            let output = output.unwrap_or_else(|| basename(&path));
            client
                .download(&path, &output)
                .await
                .with_context(|| format!("Download of {} failed", path))?;
        }
        ClientAction::Remove { path } => {
            client
                .remove(&path)
                .await
                .with_context(|| format!("Removal of {} failed", path))?;
        }
        ClientAction::Tar { extension, output } => {
            let output = output.unwrap_or_else(|| archive_name(&extension));
            client
                .archive(&extension, &output)
                .await
                .with_context(|| format!("Archive of {} files failed", extension))?;
        }
        ClientAction::Display { path } => {
            let listing = client
                .display(&path)
                .await
                .with_context(|| format!("Listing of {} failed", path))?;
            info!(entries = listing.len(), "Listing received");
            for entry in listing {
                println!("{}", entry);
            }
        }
    }

    client.quit().await.context("Failed to close session")?;
    Ok(())
}

fn setup_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("shardstore=debug,warn")
    } else {
        EnvFilter::new("shardstore=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    Ok(())
}

/// Local name for a downloaded file
fn basename(remote: &str) -> PathBuf {
    Path::new(remote)
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("download"))
}

/// Local name for a downloaded archive, e.g. `text.tar` for `.txt`
fn archive_name(extension: &str) -> PathBuf {
    let name = match Category::from_filter(extension) {
        Some(Category::Source) => "cfiles.tar",
        Some(Category::Document) => "pdf.tar",
        Some(Category::Text) => "text.tar",
        None => "archive.tar",
    };
    PathBuf::from(name)
}
