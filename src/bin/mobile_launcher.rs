use anyhow::{anyhow, Context, Result};
use clap::Parser;

use kimberley::config::Config;
use kimberley::core_cli::ClientCli;
use kimberley::core_discovery::registry::FileRegistry;
use kimberley::core_log::logger;
use kimberley::launcher::{self, LaunchRequest};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = ClientCli::parse();
    logger::init(args.verbose);

    let config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    let overlay = args
        .overlay()
        .ok_or_else(|| anyhow!("An overlay file, URL or path is required"))?;

    let request = LaunchRequest {
        vm_name: args.vm_name,
        overlay,
        floppy: args.floppy,
        key: args.key,
    };

    let discovery = FileRegistry::new(&config.discovery.registry_dir);
    launcher::run(&config, &request, &discovery).await
}
