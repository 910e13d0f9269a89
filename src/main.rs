use std::path::PathBuf;
use std::process::exit;

use clap::Parser;
use tracing::{error, info};

use mdtrelay::supervisor::Supervisor;
use mdtrelay::{config, logging};

/// Streaming model-driven telemetry relay.
#[derive(Parser, Debug)]
#[command(name = "mdtrelay", version, about)]
struct Cli {
    /// Location of the configuration file
    #[arg(short, long)]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short = 'v', long)]
    debug: bool,

    /// Directory for rolling log files; console only when unset
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let _log_guard = logging::init(cli.debug, cli.log_dir.as_deref());

    info!("Starting mdtrelay v{}", env!("CARGO_PKG_VERSION"));

    // Configuration problems are fatal before the pipeline starts
    let config = match config::load_from_file(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            exit(1);
        }
    };

    let supervisor = Supervisor::new(config);
    if let Err(e) = supervisor.run().await {
        error!("Pipeline failed: {}", e);
        exit(1);
    }

    info!("mdtrelay shut down successfully");
}
