// Error handling for VM bring-up
use std::path::PathBuf;
use thiserror::Error;

use crate::core_discovery::error::DiscoveryError;
use crate::core_rpc::protocol::Status;

#[derive(Error, Debug)]
pub enum BringupError {
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Sentinel I/O error on {path}: {source}")]
    Sentinel {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Sentinel content too short ({len} bytes, need {min})")]
    SentinelTooShort { len: usize, min: usize },

    #[error("No port number in sentinel content {0:?}")]
    NoDigits(String),

    #[error("Invalid port number {0:?}")]
    InvalidPort(String),

    #[error("Failed to publish the VNC endpoint: {0}")]
    Publish(#[from] DiscoveryError),

    #[error("Failed to withdraw a stale VNC endpoint: {0}")]
    Withdraw(DiscoveryError),

    #[error("Bring-up cancelled")]
    Cancelled,
}

impl BringupError {
    pub fn status(&self) -> Status {
        match self {
            BringupError::Spawn { .. } => Status::Exec,
            BringupError::Sentinel { .. } => Status::Io,
            _ => Status::Internal,
        }
    }
}
