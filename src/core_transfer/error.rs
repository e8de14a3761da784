// Error handling for chunked file transfers
use std::path::PathBuf;
use thiserror::Error;

use crate::core_rpc::error::RpcError;
use crate::core_rpc::protocol::Status;

#[derive(Error, Debug)]
pub enum TransferError {
    #[error("Invalid file name: {0:?}")]
    InvalidName(String),

    #[error("An upload of {0} is already in progress")]
    UploadInProgress(String),

    #[error("A download of {0} is already in progress")]
    DownloadInProgress(String),

    #[error("No upload in progress")]
    NoUpload,

    #[error("No download in progress")]
    NoDownload,

    #[error("Chunk of {chunk} bytes overruns {name} ({remaining} bytes remaining)")]
    Overrun {
        name: String,
        remaining: u64,
        chunk: u64,
    },

    #[error("File not found: {0}")]
    NotFound(PathBuf),

    #[error("Not a regular file: {0}")]
    NotAFile(PathBuf),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to (de)compress {path}: {source}")]
    Compression {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Rpc(#[from] RpcError),
}

impl TransferError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            TransferError::NotFound(path)
        } else {
            TransferError::Io { path, source }
        }
    }

    pub fn status(&self) -> Status {
        match self {
            TransferError::InvalidName(_) | TransferError::NotAFile(_) => Status::InvalidArgument,
            TransferError::Compression { .. } => Status::InvalidArgument,
            TransferError::UploadInProgress(_) | TransferError::DownloadInProgress(_) => {
                Status::AlreadyInProgress
            }
            TransferError::NoUpload | TransferError::NoDownload => Status::NotInProgress,
            TransferError::Overrun { .. } => Status::Overrun,
            TransferError::NotFound(_) => Status::NotFound,
            TransferError::Io { .. } => Status::Io,
            TransferError::Rpc(e) => e.remote_status().unwrap_or(Status::Internal),
        }
    }
}
