use log::{debug, info};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::AsyncSeekExt;

use crate::constants::CHUNK_SIZE;
use crate::core_transfer::error::TransferError;
use crate::helpers::read_full;

/// Send side of one download.
#[derive(Debug)]
pub struct Download {
    path: PathBuf,
    file: File,
    remaining: u64,
}

impl Download {
    /// Opens `path` for reading and returns it with its size.
    ///
    /// A missing file is reported as [`TransferError::NotFound`], which is
    /// distinct from a successful open of an empty file.
    pub async fn open(path: PathBuf) -> Result<(Self, u64), TransferError> {
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| TransferError::io(&path, e))?;
        if !metadata.is_file() {
            return Err(TransferError::NotAFile(path));
        }

        let file = File::open(&path)
            .await
            .map_err(|e| TransferError::io(&path, e))?;
        let size = metadata.len();
        info!("Sending {} ({} bytes)", path.display(), size);

        Ok((
            Self {
                path,
                file,
                remaining: size,
            },
            size,
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads up to one chunk, from `offset` when given. An empty result is
    /// end of file.
    pub async fn read_chunk(&mut self, offset: Option<u64>) -> Result<Vec<u8>, TransferError> {
        if let Some(offset) = offset {
            self.file
                .seek(SeekFrom::Start(offset))
                .await
                .map_err(|e| TransferError::io(&self.path, e))?;
        }

        let mut buffer = vec![0u8; CHUNK_SIZE];
        let n = read_full(&mut self.file, &mut buffer)
            .await
            .map_err(|e| TransferError::io(&self.path, e))?;
        buffer.truncate(n);

        self.remaining = self.remaining.saturating_sub(n as u64);
        if n == 0 {
            info!("End of file retrieval for {}", self.path.display());
        } else {
            debug!(
                "Read {} bytes from {}, {} remaining",
                n,
                self.path.display(),
                self.remaining
            );
        }
        Ok(buffer)
    }
}
