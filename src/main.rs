//! Node Composer CLI
//!
//! Runs the composer against an inventory fixture: compose a node from a
//! request, or reconcile composed nodes with a batch of rediscovered assets.
//! Results are printed as JSON; the updated inventory can be written back.

use anyhow::Context;
use async_trait::async_trait;
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use node_composer::{
    AssemblyTask, AssemblyTaskExecutor, ComposerConfig, DiscoveredAsset, Id, Inventory,
    InventorySnapshot, NodeComposer, RequestedNode,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Node Composer - compose logical nodes from pooled rack hardware
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Composer configuration file (YAML)
    #[arg(long, env = "COMPOSER_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Allocate resources for a node request
    Compose {
        #[command(flatten)]
        inventory: InventoryArgs,

        /// Node request (JSON or YAML)
        #[arg(long)]
        request: PathBuf,

        /// Run the deferred assembly tasks (logged only) after commit
        #[arg(long)]
        assemble: bool,
    },

    /// Reconcile composed nodes with rediscovered assets
    Recover {
        #[command(flatten)]
        inventory: InventoryArgs,

        /// Rediscovered computer system id
        #[arg(long = "computer-system")]
        computer_systems: Vec<u64>,

        /// Rediscovered remote target id
        #[arg(long = "remote-target")]
        remote_targets: Vec<u64>,
    },
}

#[derive(ClapArgs, Debug)]
struct InventoryArgs {
    /// Inventory fixture (YAML)
    #[arg(long, env = "COMPOSER_INVENTORY")]
    inventory: PathBuf,

    /// Write the resulting inventory here (YAML)
    #[arg(long)]
    output: Option<PathBuf>,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args);

    info!("Starting Node Composer");
    info!("  Version: {}", node_composer::VERSION);

    let config = match &args.config {
        Some(path) => ComposerConfig::from_yaml_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ComposerConfig::default(),
    };

    match args.command {
        Command::Compose {
            inventory,
            request,
            assemble,
        } => {
            let composer = load_composer(&inventory.inventory, &config)?;
            let request = load_request(&request)?;

            let outcome = composer.compose(&request)?;
            if assemble {
                composer.assemble(&outcome, &LoggingExecutor).await?;
            }

            println!("{}", serde_json::to_string_pretty(&outcome)?);
            write_inventory(&composer, inventory.output.as_deref())?;
        }
        Command::Recover {
            inventory,
            computer_systems,
            remote_targets,
        } => {
            let composer = load_composer(&inventory.inventory, &config)?;
            let assets: Vec<DiscoveredAsset> = computer_systems
                .into_iter()
                .map(|id| DiscoveredAsset::ComputerSystem(Id(id)))
                .chain(
                    remote_targets
                        .into_iter()
                        .map(|id| DiscoveredAsset::RemoteTarget(Id(id))),
                )
                .collect();

            let report = composer.recover(&assets)?;

            println!("{}", serde_json::to_string_pretty(&report)?);
            write_inventory(&composer, inventory.output.as_deref())?;
        }
    }

    info!("Node Composer finished");
    Ok(())
}

// =============================================================================
// Fixtures
// =============================================================================

fn load_composer(path: &Path, config: &ComposerConfig) -> anyhow::Result<std::sync::Arc<NodeComposer>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading inventory {}", path.display()))?;
    let snapshot: InventorySnapshot = serde_yaml::from_str(&contents)
        .with_context(|| format!("parsing inventory {}", path.display()))?;

    let inventory = Inventory::from_snapshot(snapshot, config.transaction_retry.clone());
    info!("Loaded inventory from {}", path.display());
    Ok(NodeComposer::new(inventory))
}

fn load_request(path: &Path) -> anyhow::Result<RequestedNode> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading request {}", path.display()))?;
    // YAML is a superset of JSON
    let request = serde_yaml::from_str(&contents)
        .with_context(|| format!("parsing request {}", path.display()))?;
    Ok(request)
}

fn write_inventory(composer: &NodeComposer, output: Option<&Path>) -> anyhow::Result<()> {
    let Some(path) = output else {
        return Ok(());
    };
    let yaml = serde_yaml::to_string(&composer.inventory().snapshot())?;
    std::fs::write(path, yaml).with_context(|| format!("writing inventory {}", path.display()))?;
    info!("Wrote inventory to {}", path.display());
    Ok(())
}

// =============================================================================
// Assembly
// =============================================================================

/// Logs assembly tasks instead of talking to switches and storage agents
struct LoggingExecutor;

#[async_trait]
impl AssemblyTaskExecutor for LoggingExecutor {
    async fn execute(&self, node: Id, task: &AssemblyTask) -> node_composer::Result<()> {
        info!("Node {}: {}", node, task);
        Ok(())
    }
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    // stdout carries the JSON result
    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
