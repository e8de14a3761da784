// Operations carried between the mobile launcher and the display launcher
use serde::{Deserialize, Serialize};
use std::fmt;

/// Arguments shared by the three `load_vm_*` operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadVm {
    pub vm_name: String,
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    Ping,
    SendFile {
        name: String,
        size: u64,
    },
    SendChunk {
        #[serde(with = "serde_bytes")]
        data: Vec<u8>,
        offset: Option<u64>,
    },
    RetrieveFile {
        name: String,
    },
    RetrieveChunk {
        offset: Option<u64>,
    },
    UsePersistentState {
        name: String,
    },
    UseEncryptionKey {
        name: String,
    },
    LoadVmFromPath(LoadVm),
    LoadVmFromUrl(LoadVm),
    LoadVmFromAttachment(LoadVm),
    EndUsage {
        retrieve_state: bool,
    },
    UseUsbCable,
}

impl Request {
    /// Short operation name for log lines; never includes chunk payloads.
    pub fn name(&self) -> &'static str {
        match self {
            Request::Ping => "ping",
            Request::SendFile { .. } => "send_file",
            Request::SendChunk { .. } => "send_chunk",
            Request::RetrieveFile { .. } => "retrieve_file",
            Request::RetrieveChunk { .. } => "retrieve_chunk",
            Request::UsePersistentState { .. } => "use_persistent_state",
            Request::UseEncryptionKey { .. } => "use_encryption_key",
            Request::LoadVmFromPath(_) => "load_vm_from_path",
            Request::LoadVmFromUrl(_) => "load_vm_from_URL",
            Request::LoadVmFromAttachment(_) => "load_vm_from_attachment",
            Request::EndUsage { .. } => "end_usage",
            Request::UseUsbCable => "use_USB_cable",
        }
    }
}

/// Failure classes reported back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    InvalidArgument,
    NotFound,
    AlreadyInProgress,
    NotInProgress,
    InvalidState,
    Overrun,
    Io,
    Exec,
    Internal,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Status::InvalidArgument => "invalid argument",
            Status::NotFound => "not found",
            Status::AlreadyInProgress => "already in progress",
            Status::NotInProgress => "not in progress",
            Status::InvalidState => "invalid state",
            Status::Overrun => "overrun",
            Status::Io => "i/o error",
            Status::Exec => "exec failure",
            Status::Internal => "internal error",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    Ok,
    Size(u64),
    Chunk(#[serde(with = "serde_bytes")] Vec<u8>),
    StateFile(Option<String>),
    Error { status: Status, message: String },
}

impl Response {
    pub fn error(status: Status, message: impl Into<String>) -> Self {
        Response::Error {
            status,
            message: message.into(),
        }
    }
}
