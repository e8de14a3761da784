use log::trace;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use crate::core_rpc::codec::Channel;
use crate::core_rpc::error::RpcError;
use crate::core_rpc::protocol::{LoadVm, Request, Response};

/// Typed caller side of the launcher protocol.
pub struct RpcClient<T> {
    channel: Channel<T>,
}

impl RpcClient<TcpStream> {
    pub async fn connect(host: &str, port: u16) -> Result<Self, RpcError> {
        let stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true)?;
        Ok(Self::new(stream))
    }
}

impl<T> RpcClient<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(io: T) -> Self {
        Self {
            channel: Channel::new(io),
        }
    }

    async fn call(&mut self, request: Request) -> Result<Response, RpcError> {
        let operation = request.name();
        trace!("Calling {}", operation);
        self.channel.send(&request).await?;
        match self.channel.recv::<Response>().await? {
            Some(Response::Error { status, message }) => Err(RpcError::Remote {
                operation,
                status,
                message,
            }),
            Some(response) => Ok(response),
            None => Err(RpcError::Disconnected),
        }
    }

    async fn call_ok(&mut self, request: Request) -> Result<(), RpcError> {
        let operation = request.name();
        match self.call(request).await? {
            Response::Ok => Ok(()),
            _ => Err(RpcError::UnexpectedResponse(operation)),
        }
    }

    pub async fn ping(&mut self) -> Result<(), RpcError> {
        self.call_ok(Request::Ping).await
    }

    /// Announces an upload of `size` bytes under `name`.
    pub async fn send_file(&mut self, name: &str, size: u64) -> Result<(), RpcError> {
        self.call_ok(Request::SendFile {
            name: name.to_string(),
            size,
        })
        .await
    }

    pub async fn send_chunk(&mut self, data: Vec<u8>, offset: Option<u64>) -> Result<(), RpcError> {
        self.call_ok(Request::SendChunk { data, offset }).await
    }

    /// Opens `name` on the server for download and returns its size.
    pub async fn retrieve_file(&mut self, name: &str) -> Result<u64, RpcError> {
        match self
            .call(Request::RetrieveFile {
                name: name.to_string(),
            })
            .await?
        {
            Response::Size(size) => Ok(size),
            _ => Err(RpcError::UnexpectedResponse("retrieve_file")),
        }
    }

    /// Next chunk of the open download; empty at end of file.
    pub async fn retrieve_chunk(&mut self, offset: Option<u64>) -> Result<Vec<u8>, RpcError> {
        match self.call(Request::RetrieveChunk { offset }).await? {
            Response::Chunk(data) => Ok(data),
            _ => Err(RpcError::UnexpectedResponse("retrieve_chunk")),
        }
    }

    pub async fn use_persistent_state(&mut self, name: &str) -> Result<(), RpcError> {
        self.call_ok(Request::UsePersistentState {
            name: name.to_string(),
        })
        .await
    }

    pub async fn use_encryption_key(&mut self, name: &str) -> Result<(), RpcError> {
        self.call_ok(Request::UseEncryptionKey {
            name: name.to_string(),
        })
        .await
    }

    pub async fn load_vm_from_path(&mut self, vm_name: &str, path: &str) -> Result<(), RpcError> {
        self.call_ok(Request::LoadVmFromPath(load_vm(vm_name, path)))
            .await
    }

    pub async fn load_vm_from_url(&mut self, vm_name: &str, url: &str) -> Result<(), RpcError> {
        self.call_ok(Request::LoadVmFromUrl(load_vm(vm_name, url)))
            .await
    }

    pub async fn load_vm_from_attachment(
        &mut self,
        vm_name: &str,
        name: &str,
    ) -> Result<(), RpcError> {
        self.call_ok(Request::LoadVmFromAttachment(load_vm(vm_name, name)))
            .await
    }

    /// Signals end of use. Returns the name of the state diff to retrieve,
    /// if one was asked for and the session has persistent state.
    pub async fn end_usage(&mut self, retrieve_state: bool) -> Result<Option<String>, RpcError> {
        match self.call(Request::EndUsage { retrieve_state }).await? {
            Response::StateFile(name) => Ok(name),
            _ => Err(RpcError::UnexpectedResponse("end_usage")),
        }
    }

    pub async fn use_usb_cable(&mut self) -> Result<(), RpcError> {
        self.call_ok(Request::UseUsbCable).await
    }
}

fn load_vm(vm_name: &str, uri: &str) -> LoadVm {
    LoadVm {
        vm_name: vm_name.to_string(),
        uri: uri.to_string(),
    }
}
