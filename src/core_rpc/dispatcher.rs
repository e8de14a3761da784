use log::{debug, info, warn};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::core_discovery::Discovery;
use crate::core_rpc::codec::{decode, Channel};
use crate::core_rpc::error::RpcError;
use crate::core_rpc::protocol::{Request, Response, Status};
use crate::core_session::error::SessionError;
use crate::core_session::session::{OverlaySource, Session};

/// Serves requests from one connection, in order, until the peer hangs up.
///
/// Operation failures are answered with an error response and never end
/// the connection; only transport errors do.
pub async fn serve<T, D>(io: T, session: &mut Session<D>) -> Result<(), RpcError>
where
    T: AsyncRead + AsyncWrite + Unpin,
    D: Discovery + 'static,
{
    let mut channel = Channel::new(io);
    loop {
        let frame = match channel.recv_frame().await? {
            Some(frame) => frame,
            None => {
                info!("Client disconnected");
                return Ok(());
            }
        };

        let response = match decode::<Request>(&frame) {
            Ok(request) => dispatch(session, request).await,
            Err(e) => {
                warn!("Dropping malformed request: {}", e);
                Response::error(Status::InvalidArgument, e.to_string())
            }
        };
        channel.send(&response).await?;
    }
}

/// Runs one request against the session and builds its reply.
pub async fn dispatch<D>(session: &mut Session<D>, request: Request) -> Response
where
    D: Discovery + 'static,
{
    let operation = request.name();
    debug!("Received {}", operation);

    let result: Result<Response, SessionError> = match request {
        Request::Ping => {
            session.ping();
            Ok(Response::Ok)
        }
        Request::SendFile { name, size } => session.send_file(&name, size).await.map(|_| Response::Ok),
        Request::SendChunk { data, offset } => session
            .send_chunk(&data, offset)
            .await
            .map(|_| Response::Ok),
        Request::RetrieveFile { name } => session.retrieve_file(&name).await.map(Response::Size),
        Request::RetrieveChunk { offset } => {
            session.retrieve_chunk(offset).await.map(Response::Chunk)
        }
        Request::UsePersistentState { name } => session
            .use_persistent_state(&name)
            .await
            .map(|_| Response::Ok),
        Request::UseEncryptionKey { name } => session
            .use_encryption_key(&name)
            .await
            .map(|_| Response::Ok),
        Request::LoadVmFromPath(args) => session
            .load_vm(OverlaySource::Path, args)
            .await
            .map(|_| Response::Ok),
        Request::LoadVmFromUrl(args) => session
            .load_vm(OverlaySource::Url, args)
            .await
            .map(|_| Response::Ok),
        Request::LoadVmFromAttachment(args) => session
            .load_vm(OverlaySource::Attachment, args)
            .await
            .map(|_| Response::Ok),
        Request::EndUsage { retrieve_state } => session
            .end_usage(retrieve_state)
            .await
            .map(Response::StateFile),
        Request::UseUsbCable => {
            session.use_usb_cable();
            Ok(Response::Ok)
        }
    };

    match result {
        Ok(response) => response,
        Err(e) => {
            warn!("{} failed: {}", operation, e);
            Response::error(e.status(), e.to_string())
        }
    }
}
