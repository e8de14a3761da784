pub mod config;
pub mod constants;
pub mod core_bringup;
pub mod core_cli;
pub mod core_discovery;
pub mod core_log;
pub mod core_rpc;
pub mod core_session;
pub mod core_transfer;
pub mod core_tunnel;
pub mod helpers;
pub mod launcher;
pub mod rtt;
pub mod server;
