use log::{debug, info};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};

use crate::core_transfer::error::TransferError;

/// Receive side of one upload: the open destination and which byte ranges
/// of the announced size have been written so far.
#[derive(Debug)]
pub struct Upload {
    path: PathBuf,
    file: File,
    size: u64,
    cursor: u64,
    covered: Vec<(u64, u64)>,
}

impl Upload {
    /// Creates (or truncates) the destination and expects `size` bytes.
    pub async fn create(path: PathBuf, size: u64) -> Result<Self, TransferError> {
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600).custom_flags(libc::O_NOFOLLOW);

        let file = options
            .open(&path)
            .await
            .map_err(|e| TransferError::io(&path, e))?;

        info!("Receiving {} ({} bytes)", path.display(), size);
        Ok(Self {
            path,
            file,
            size,
            cursor: 0,
            covered: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn covered_bytes(&self) -> u64 {
        self.covered.iter().map(|(start, end)| end - start).sum()
    }

    pub fn is_complete(&self) -> bool {
        self.covered_bytes() == self.size
    }

    /// Writes one chunk, at `offset` when given, else after the previous one.
    /// A chunk reaching past the announced size is rejected before any write.
    /// Bytes written twice count once towards completion.
    pub async fn write_chunk(&mut self, data: &[u8], offset: Option<u64>) -> Result<(), TransferError> {
        let chunk = data.len() as u64;
        let start = offset.unwrap_or(self.cursor);
        let room = self.size.saturating_sub(start);
        if chunk > room {
            return Err(TransferError::Overrun {
                name: self.path.display().to_string(),
                remaining: room,
                chunk,
            });
        }

        if offset.is_some() {
            self.file
                .seek(SeekFrom::Start(start))
                .await
                .map_err(|e| TransferError::io(&self.path, e))?;
        }
        self.file
            .write_all(data)
            .await
            .map_err(|e| TransferError::io(&self.path, e))?;

        self.cursor = start + chunk;
        self.cover(start, self.cursor);
        debug!(
            "Wrote {} bytes at {} to {}, {} of {} covered",
            chunk,
            start,
            self.path.display(),
            self.covered_bytes(),
            self.size
        );
        Ok(())
    }

    /// Adds `[start, end)` to the covered ranges, merging neighbours.
    fn cover(&mut self, mut start: u64, mut end: u64) {
        if start == end {
            return;
        }
        let mut merged = Vec::with_capacity(self.covered.len() + 1);
        for &(s, e) in &self.covered {
            if e < start || s > end {
                merged.push((s, e));
            } else {
                start = start.min(s);
                end = end.max(e);
            }
        }
        merged.push((start, end));
        merged.sort_unstable();
        self.covered = merged;
    }

    /// Flushes and closes the destination.
    pub async fn finish(mut self) -> Result<PathBuf, TransferError> {
        self.file
            .flush()
            .await
            .map_err(|e| TransferError::io(&self.path, e))?;
        info!("Received {}", self.path.display());
        Ok(self.path)
    }
}
