use log::{debug, info, warn};
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::constants::CHUNK_SIZE;
use crate::core_rpc::client::RpcClient;
use crate::core_transfer::error::TransferError;
use crate::helpers::{read_full, remove_quietly};

fn chunk_count(size: u64) -> u64 {
    size.div_ceil(CHUNK_SIZE as u64)
}

/// Uploads `path` to the server under `remote_name`, one chunk per call.
/// Returns the number of bytes sent.
pub async fn send_file_in_pieces<T>(
    client: &mut RpcClient<T>,
    path: &Path,
    remote_name: &str,
) -> Result<u64, TransferError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let size = tokio::fs::metadata(path)
        .await
        .map_err(|e| TransferError::io(path, e))?
        .len();
    let mut file = File::open(path)
        .await
        .map_err(|e| TransferError::io(path, e))?;

    info!(
        "Transfer of {} (size={}) will take {} RPCs",
        path.display(),
        size,
        chunk_count(size)
    );
    client.send_file(remote_name, size).await?;

    let mut offset = 0u64;
    let mut buffer = vec![0u8; CHUNK_SIZE];
    loop {
        let n = read_full(&mut file, &mut buffer)
            .await
            .map_err(|e| TransferError::io(path, e))?;
        if n == 0 {
            break;
        }
        client.send_chunk(buffer[..n].to_vec(), Some(offset)).await?;
        offset += n as u64;
        debug!("Sent {}/{} bytes of {}", offset, size, path.display());
    }

    if offset != size {
        warn!(
            "{} changed size during upload: announced {}, sent {}",
            path.display(),
            size,
            offset
        );
    }
    Ok(offset)
}

/// Downloads `remote_name` from the server into `dest`. A failed download
/// removes the partial destination.
pub async fn retrieve_file_in_pieces<T>(
    client: &mut RpcClient<T>,
    remote_name: &str,
    dest: &Path,
) -> Result<u64, TransferError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    info!("Retrieving {} to {}", remote_name, dest.display());
    let size = client.retrieve_file(remote_name).await?;
    info!(
        "Transfer of {} (size={}) will take {} RPCs",
        remote_name,
        size,
        chunk_count(size)
    );

    let mut file = File::create(dest)
        .await
        .map_err(|e| TransferError::io(dest, e))?;

    match receive_chunks(client, &mut file, dest).await {
        Ok(received) => {
            if received != size {
                warn!(
                    "{} changed size during download: announced {}, received {}",
                    remote_name, size, received
                );
            }
            Ok(received)
        }
        Err(e) => {
            drop(file);
            remove_quietly(dest).await;
            Err(e)
        }
    }
}

async fn receive_chunks<T>(
    client: &mut RpcClient<T>,
    file: &mut File,
    dest: &Path,
) -> Result<u64, TransferError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let mut offset = 0u64;
    loop {
        let chunk = client.retrieve_chunk(Some(offset)).await?;
        if chunk.is_empty() {
            break;
        }
        file.write_all(&chunk)
            .await
            .map_err(|e| TransferError::io(dest, e))?;
        offset += chunk.len() as u64;
        debug!("Received {} bytes into {}", offset, dest.display());
    }
    file.flush().await.map_err(|e| TransferError::io(dest, e))?;
    Ok(offset)
}
