// Error handling for the RPC layer
use thiserror::Error;

use crate::core_rpc::protocol::Status;

#[derive(Error, Debug)]
pub enum RpcError {
    #[error("Connection error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode message: {0}")]
    Encode(String),

    #[error("Failed to decode message: {0}")]
    Decode(String),

    #[error("Connection closed by peer")]
    Disconnected,

    #[error("Unexpected reply to {0}")]
    UnexpectedResponse(&'static str),

    #[error("{operation} failed ({status}): {message}")]
    Remote {
        operation: &'static str,
        status: Status,
        message: String,
    },
}

impl RpcError {
    /// Status reported by the peer, if the failure came from the remote side.
    pub fn remote_status(&self) -> Option<Status> {
        match self {
            RpcError::Remote { status, .. } => Some(*status),
            _ => None,
        }
    }
}
