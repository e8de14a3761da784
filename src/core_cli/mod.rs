#[allow(clippy::module_inception)]
mod core_cli;

pub use core_cli::{ClientCli, OverlayChoice, ServerCli};
