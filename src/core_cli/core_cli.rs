use clap::{ArgGroup, Parser};
use std::path::PathBuf;

/// Command-line arguments of the display launcher
#[derive(Parser, Debug)]
#[command(
    name = "display-launcher",
    about = "Serves VM load requests and brings up their VNC display."
)]
pub struct ServerCli {
    /// Path to the configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable verbose mode
    #[arg(short, long)]
    pub verbose: bool,

    /// Serve RPC on loopback only and tunnel external connections into it
    #[arg(short, long)]
    pub tunnel: bool,

    /// Port to listen on (random when absent)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory uploaded files are staged in
    #[arg(long)]
    pub staging_dir: Option<PathBuf>,
}

/// Command-line arguments of the mobile launcher
#[derive(Parser, Debug)]
#[command(
    name = "mobile-launcher",
    about = "Ships a VM overlay to a display launcher and views the result."
)]
#[command(group(
    ArgGroup::new("overlay")
        .required(true)
        .args(["overlay_file", "overlay_url", "overlay_path"])
))]
pub struct ClientCli {
    /// Name of the VM to load
    pub vm_name: String,

    /// Local overlay file to upload
    #[arg(short = 'f', long)]
    pub overlay_file: Option<PathBuf>,

    /// Remote overlay location
    #[arg(short = 'i', long)]
    pub overlay_url: Option<String>,

    /// Overlay already present on the display host
    #[arg(short = 'p', long)]
    pub overlay_path: Option<String>,

    /// Persistent-state (floppy) image to attach
    #[arg(short = 'd', long)]
    pub floppy: Option<PathBuf>,

    /// Encryption key file to attach
    #[arg(short = 'k', long)]
    pub key: Option<PathBuf>,

    /// Path to the configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable verbose mode
    #[arg(short, long)]
    pub verbose: bool,
}

/// Where the client takes the overlay from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverlayChoice {
    File(PathBuf),
    Url(String),
    Path(String),
}

impl ClientCli {
    pub fn overlay(&self) -> Option<OverlayChoice> {
        if let Some(file) = &self.overlay_file {
            Some(OverlayChoice::File(file.clone()))
        } else if let Some(url) = &self.overlay_url {
            Some(OverlayChoice::Url(url.clone()))
        } else {
            self.overlay_path.clone().map(OverlayChoice::Path)
        }
    }
}
