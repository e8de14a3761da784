// Error handling for VM sessions
use std::path::PathBuf;
use thiserror::Error;

use crate::core_bringup::error::BringupError;
use crate::core_rpc::protocol::Status;
use crate::core_session::state::Phase;
use crate::core_transfer::error::TransferError;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error(transparent)]
    Bringup(#[from] BringupError),

    #[error("Bad arguments to {operation}: {reason}")]
    InvalidArgument {
        operation: &'static str,
        reason: String,
    },

    #[error("{operation} is not allowed while {phase}")]
    InvalidState {
        operation: &'static str,
        phase: Phase,
    },

    #[error("A display bring-up is already in progress")]
    BringupInProgress,

    #[error("File not found: {0}")]
    NotFound(PathBuf),

    #[error("{0} is still being uploaded")]
    UploadIncomplete(PathBuf),

    #[error("Failed to signal session end through {path}: {source}")]
    FinishSignal {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SessionError {
    pub fn invalid_argument(operation: &'static str, reason: impl Into<String>) -> Self {
        SessionError::InvalidArgument {
            operation,
            reason: reason.into(),
        }
    }

    pub fn status(&self) -> Status {
        match self {
            SessionError::Transfer(e) => e.status(),
            SessionError::Bringup(e) => e.status(),
            SessionError::InvalidArgument { .. } => Status::InvalidArgument,
            SessionError::InvalidState { .. } | SessionError::UploadIncomplete(_) => {
                Status::InvalidState
            }
            SessionError::BringupInProgress => Status::AlreadyInProgress,
            SessionError::NotFound(_) => Status::NotFound,
            SessionError::FinishSignal { .. } => Status::Io,
        }
    }
}
