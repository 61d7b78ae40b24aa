//! flowgrid: inspect cost-model configuration and priced flow graphs.
//!
//! # Usage
//!
//! ```text
//! flowgrid check-config --config flowgrid.toml
//! flowgrid price --config flowgrid.toml --cluster cluster.toml --now-us 1700000000000000
//! ```

mod cluster_file;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::info;

use flow_core::{Clock, FlowConfig, ManualClock, SystemClock};
use flowgrid_cost::{InMemoryKnowledgeBase, build_cost_model};
use flowgrid_scheduler::FlowGraphBuilder;

use crate::cluster_file::ClusterFile;

#[derive(Parser)]
#[command(name = "flowgrid", about = "Flow-network cost models for cluster scheduling")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a config file and print it with defaults filled in.
    CheckConfig {
        #[arg(long)]
        config: PathBuf,
    },
    /// Price a cluster description and print the flow graph as JSON.
    Price {
        #[arg(long)]
        config: PathBuf,

        /// TOML cluster description (resources, ensembles, tasks, runtimes).
        #[arg(long)]
        cluster: PathBuf,

        /// Pricing time in microseconds since the epoch. Defaults to now.
        #[arg(long)]
        now_us: Option<u64>,
    },
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout stays machine-readable.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,flowgrid=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::CheckConfig { config } => check_config(config),
        Command::Price {
            config,
            cluster,
            now_us,
        } => price(config, cluster, now_us),
    }
}

fn check_config(path: PathBuf) -> anyhow::Result<()> {
    let config = FlowConfig::from_file(&path)?;
    info!(path = ?path, policy = %config.scheduler.cost_model, "config is valid");
    print!("{}", config.to_toml_string()?);
    Ok(())
}

fn price(config_path: PathBuf, cluster_path: PathBuf, now_us: Option<u64>) -> anyhow::Result<()> {
    let config = FlowConfig::from_file(&config_path)?;
    let cluster = ClusterFile::from_file(&cluster_path)?;

    let kb = Arc::new(
        InMemoryKnowledgeBase::new()
            .with_default_runtime(Duration::from_millis(config.knowledge_base.default_runtime_ms)),
    );
    let loaded = cluster.load(&kb)?;

    let clock: Arc<dyn Clock> = match now_us {
        Some(now) => Arc::new(ManualClock::new(now)),
        None => Arc::new(SystemClock),
    };
    let now = clock.now_micros();

    let snapshot = Arc::new(loaded.snapshot);
    let model = build_cost_model(&config.cost_model_config(), Arc::clone(&snapshot), kb, clock);
    let graph = FlowGraphBuilder::new(model.as_ref(), &loaded.topology, &snapshot).build()?;
    info!(
        policy = %model.policy(),
        nodes = graph.nodes().len(),
        arcs = graph.arcs().len(),
        "cluster priced"
    );

    let output = serde_json::json!({
        "policy": model.policy(),
        "now_us": now,
        "graph": graph,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
