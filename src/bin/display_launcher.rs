use anyhow::{Context, Result};
use clap::Parser;
use log::error;

use kimberley::config::Config;
use kimberley::core_cli::ServerCli;
use kimberley::core_log::logger;
use kimberley::server;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = ServerCli::parse();
    logger::init(args.verbose);

    let mut config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;

    // Command-line overrides
    if args.tunnel {
        config.server.tunnel = true;
    }
    if let Some(port) = args.port {
        config.server.port = Some(port);
    }
    if let Some(staging_dir) = args.staging_dir {
        config.server.staging_dir = staging_dir;
    }

    let shutdown = server::shutdown_on_ctrl_c();
    if let Err(e) = server::run(config, shutdown).await {
        error!("Display launcher stopped: {:#}", e);
        return Err(e);
    }
    Ok(())
}
