mod log_stream;
mod run;

use clap::{Parser, Subcommand};
use std::{fs::File, path::{Path, PathBuf}};
use tollgate_core::config::NodeConfig;
use tracing_subscriber::{filter::LevelFilter, fmt::{self, writer::BoxMakeWriter}, layer::SubscriberExt, util::SubscriberInitExt, Layer, Registry};

use crate::{log_stream::LogBroadcast, run::{launch_node, run_sandbox}};

fn setup_tracing(log_dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(log_dir)?;
    let file = File::create(log_dir.join("output.log"))?;

    let console_layer = fmt::layer()
        .with_ansi(true)
        .with_level(true)
        .with_filter(LevelFilter::INFO);

    let file_layer = fmt::layer()
        .with_writer(BoxMakeWriter::new(file))
        .with_ansi(false)
        .with_level(true)
        .with_filter(LevelFilter::DEBUG);

    let ws_layer = fmt::layer()
        .with_writer(BoxMakeWriter::new(LogBroadcast))
        .with_ansi(false)
        .with_filter(LevelFilter::INFO);

    Registry::default()
        .with(file_layer)
        .with(console_layer)
        .with(ws_layer)
        .try_init()
        .map_err(std::io::Error::other)
}

#[derive(Parser, Debug)]
#[command(version, about = "Tollgate access ledger node")]
struct Args {
    #[arg(short, long, help = "Root directory for output files", default_value = "./work")]
    work_dir: PathBuf,
    #[arg(short, long, help = "Name of the run (folders will be created with this name)")]
    name: Option<String>,
    #[arg(short, long, help = "Path to a TOML node config (written with defaults if missing)")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the unlock and withdraw flow once on a fresh in-memory chain.
    Sandbox,
    /// Serve a persistent chain over HTTP.
    Serve {
        #[arg(short, long, default_value_t = 3000)]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    // create a run id
    let run_id = args.name.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let run_dir = args.work_dir.join(&run_id);
    setup_tracing(&run_dir)?;
    tracing::info!("Starting tollgate run {} under {}", run_id, args.work_dir.display());

    let node_config = match &args.config {
        Some(path) => NodeConfig::load_or_default(path)?,
        None => NodeConfig::default(),
    };
    tracing::debug!("node config: {:?}", node_config);

    match args.command {
        Command::Sandbox => run_sandbox(&node_config).await?,
        Command::Serve { port } => launch_node(&node_config, &run_dir.join("db"), port).await?,
    }
    Ok(())
}
