// Byte-for-byte relay between an external connection and the loopback RPC server
use log::{debug, error, info};
use std::io::ErrorKind;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::constants::TUNNEL_BUFFER_SIZE;

#[derive(Error, Debug)]
pub enum TunnelError {
    #[error("Read from the {side} side failed: {source}")]
    Read {
        side: Side,
        #[source]
        source: std::io::Error,
    },

    #[error("Write to the {side} side failed: {source}")]
    Write {
        side: Side,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    External,
    Local,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::External => f.write_str("external"),
            Side::Local => f.write_str("local"),
        }
    }
}

/// Byte counts relayed in each direction.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TunnelStats {
    /// External to local.
    pub inbound: u64,
    /// Local to external.
    pub outbound: u64,
    /// The side whose EOF ended the tunnel.
    pub closed_by: Option<Side>,
}

/// Writes all of `data`, retrying interrupted writes. Returns the number of
/// bytes written, which is short only if the peer stopped accepting bytes.
async fn write_fully<W>(writer: &mut W, data: &[u8]) -> std::io::Result<usize>
where
    W: AsyncWrite + Unpin,
{
    let mut written = 0;
    while written < data.len() {
        match writer.write(&data[written..]).await {
            Ok(0) => break,
            Ok(n) => written += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(written)
}

async fn relay<W>(out: &mut W, side: Side, data: &[u8]) -> Result<(), TunnelError>
where
    W: AsyncWrite + Unpin,
{
    let written = write_fully(out, data)
        .await
        .map_err(|source| TunnelError::Write { side, source })?;
    if written != data.len() {
        error!(
            "Somehow lost bytes towards the {} side, from {} in to {} out",
            side,
            data.len(),
            written
        );
    }
    out.flush()
        .await
        .map_err(|source| TunnelError::Write { side, source })
}

/// Pumps bytes between `external` and `local` until either side reaches
/// EOF or fails. Both streams are shut down and dropped together on every
/// exit path; a tunnel cannot be re-armed.
pub async fn local_tunnel<A, B>(mut external: A, mut local: B) -> Result<TunnelStats, TunnelError>
where
    A: AsyncRead + AsyncWrite + Unpin,
    B: AsyncRead + AsyncWrite + Unpin,
{
    info!("Tunneling..");
    let mut stats = TunnelStats::default();
    let mut external_buf = [0u8; TUNNEL_BUFFER_SIZE];
    let mut local_buf = [0u8; TUNNEL_BUFFER_SIZE];

    let result = loop {
        let step = tokio::select! {
            read = external.read(&mut external_buf) => match read {
                Ok(0) => Ok(Some(Side::External)),
                Ok(n) => relay(&mut local, Side::Local, &external_buf[..n])
                    .await
                    .map(|_| {
                        stats.inbound += n as u64;
                        None
                    }),
                Err(source) => Err(TunnelError::Read { side: Side::External, source }),
            },
            read = local.read(&mut local_buf) => match read {
                Ok(0) => Ok(Some(Side::Local)),
                Ok(n) => relay(&mut external, Side::External, &local_buf[..n])
                    .await
                    .map(|_| {
                        stats.outbound += n as u64;
                        None
                    }),
                Err(source) => Err(TunnelError::Read { side: Side::Local, source }),
            },
        };

        match step {
            Ok(None) => continue,
            Ok(Some(side)) => {
                info!("A connection ({} side) was closed (EOF on read)", side);
                stats.closed_by = Some(side);
                break Ok(stats);
            }
            Err(e) => {
                error!("Tunnel failed: {}", e);
                break Err(e);
            }
        }
    };

    if let Err(e) = external.shutdown().await {
        debug!("Shutting down the external side: {}", e);
    }
    if let Err(e) = local.shutdown().await {
        debug!("Shutting down the local side: {}", e);
    }
    result
}
