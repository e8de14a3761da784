// Filesystem sentinels shared with the display setup helper
use log::{debug, info};
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

use crate::constants::PORT_SENTINEL_BUFFER;
use crate::core_bringup::error::BringupError;

/// Extracts the VNC port from the port sentinel's content.
///
/// Leading non-digits are skipped and the first digit run is the port.
/// Content shorter than `min_len` is reported as too short so the caller
/// can retry on a sentinel that is still being written.
pub fn parse_vnc_port(content: &[u8], min_len: usize) -> Result<u16, BringupError> {
    if content.len() < min_len {
        return Err(BringupError::SentinelTooShort {
            len: content.len(),
            min: min_len,
        });
    }

    let digits: String = content
        .iter()
        .skip_while(|b| !b.is_ascii_digit())
        .take_while(|b| b.is_ascii_digit())
        .map(|b| *b as char)
        .collect();
    if digits.is_empty() {
        return Err(BringupError::NoDigits(
            String::from_utf8_lossy(content).into_owned(),
        ));
    }

    match digits.parse::<u16>() {
        Ok(port) if port != 0 => Ok(port),
        _ => Err(BringupError::InvalidPort(digits)),
    }
}

/// Sleeps for `interval`, or fails early when `cancel` fires.
async fn backoff(interval: Duration, cancel: &CancellationToken) -> Result<(), BringupError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(BringupError::Cancelled),
        _ = tokio::time::sleep(interval) => Ok(()),
    }
}

/// Waits for the port sentinel to appear fully written and returns its port.
pub async fn poll_vnc_port(
    path: &Path,
    interval: Duration,
    min_len: usize,
    cancel: &CancellationToken,
) -> Result<u16, BringupError> {
    info!("Waiting for thin client server on {}..", path.display());
    loop {
        if cancel.is_cancelled() {
            return Err(BringupError::Cancelled);
        }

        match read_sentinel(path).await {
            Ok(Some(content)) => match parse_vnc_port(&content, min_len) {
                Ok(port) => {
                    info!("Opened {}: VNC port {}", path.display(), port);
                    return Ok(port);
                }
                Err(BringupError::SentinelTooShort { len, .. }) => {
                    debug!("{} holds only {} bytes so far", path.display(), len);
                }
                Err(e) => return Err(e),
            },
            Ok(None) => debug!("{} not there yet", path.display()),
            Err(e) => return Err(e),
        }

        backoff(interval, cancel).await?;
    }
}

async fn read_sentinel(path: &Path) -> Result<Option<Vec<u8>>, BringupError> {
    let sentinel_error = |source| BringupError::Sentinel {
        path: path.to_path_buf(),
        source,
    };

    let file = match File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(sentinel_error(e)),
    };

    let mut content = Vec::with_capacity(PORT_SENTINEL_BUFFER);
    file.take(PORT_SENTINEL_BUFFER as u64)
        .read_to_end(&mut content)
        .await
        .map_err(sentinel_error)?;
    Ok(Some(content))
}

/// Waits until `path` exists.
pub async fn wait_for_file(
    path: &Path,
    interval: Duration,
    cancel: &CancellationToken,
) -> Result<(), BringupError> {
    info!("Waiting for {}..", path.display());
    loop {
        if cancel.is_cancelled() {
            return Err(BringupError::Cancelled);
        }
        match tokio::fs::try_exists(path).await {
            Ok(true) => {
                info!("Found {}", path.display());
                return Ok(());
            }
            Ok(false) => {}
            Err(source) => {
                return Err(BringupError::Sentinel {
                    path: path.to_path_buf(),
                    source,
                })
            }
        }
        backoff(interval, cancel).await?;
    }
}

/// Creates `path` if needed; its existence is the signal.
pub async fn touch(path: &Path) -> std::io::Result<()> {
    tokio::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .await
        .map(drop)
}
