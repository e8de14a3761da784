use log::{debug, warn};
use rand::Rng;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::constants::{RANDOM_PORT_MAX, RANDOM_PORT_MIN};

/// Reduces a client-supplied name to its final component.
///
/// Both `/` and `\` count as separators regardless of platform, and
/// names that reduce to nothing, `.` or `..` are rejected.
pub fn basename(name: &str) -> Option<&str> {
    let base = name.rsplit(['/', '\\']).next()?;
    match base {
        "" | "." | ".." => None,
        _ => Some(base),
    }
}

/// Re-roots a client-supplied file name under the staging directory.
pub fn local_filename(staging_dir: &Path, name: &str) -> Option<PathBuf> {
    basename(name).map(|base| staging_dir.join(base))
}

/// Removes a file, staying silent when it is already gone.
pub async fn remove_quietly(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed {}", path.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
    }
}

/// Fills `buf` from `reader` until it is full or the reader hits EOF.
/// Returns the number of bytes read.
pub async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]).await {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Picks a TCP port in the unprivileged range for a service to listen on.
pub fn choose_random_port() -> u16 {
    rand::thread_rng().gen_range(RANDOM_PORT_MIN..RANDOM_PORT_MAX)
}
