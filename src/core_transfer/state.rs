use log::warn;
use std::path::{Path, PathBuf};

use crate::core_transfer::error::TransferError;
use crate::core_transfer::incoming::Upload;
use crate::core_transfer::outgoing::Download;

/// In-flight transfers of one connection: at most one upload and one
/// download at a time.
#[derive(Debug, Default)]
pub struct TransferState {
    upload: Option<Upload>,
    download: Option<Download>,
}

impl TransferState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Path of the upload currently being received, if any.
    pub fn upload_path(&self) -> Option<&Path> {
        self.upload.as_ref().map(Upload::path)
    }

    /// Opens an upload. A zero-length upload is complete on return and
    /// leaves nothing in flight. Returns the completed path in that case.
    pub async fn begin_upload(
        &mut self,
        path: PathBuf,
        size: u64,
    ) -> Result<Option<PathBuf>, TransferError> {
        if let Some(upload) = &self.upload {
            return Err(TransferError::UploadInProgress(
                upload.path().display().to_string(),
            ));
        }

        let upload = Upload::create(path, size).await?;
        if upload.is_complete() {
            return upload.finish().await.map(Some);
        }
        self.upload = Some(upload);
        Ok(None)
    }

    /// Feeds one chunk into the open upload. Returns the completed path once
    /// every announced byte has arrived.
    ///
    /// Any failure abandons the upload; the partial file stays on disk for
    /// the session cleanup to remove.
    pub async fn write_chunk(
        &mut self,
        data: &[u8],
        offset: Option<u64>,
    ) -> Result<Option<PathBuf>, TransferError> {
        let upload = self.upload.as_mut().ok_or(TransferError::NoUpload)?;

        if let Err(e) = upload.write_chunk(data, offset).await {
            warn!("Abandoning upload of {}: {}", upload.path().display(), e);
            self.upload = None;
            return Err(e);
        }

        if upload.is_complete() {
            if let Some(upload) = self.upload.take() {
                return upload.finish().await.map(Some);
            }
        }
        Ok(None)
    }

    /// Opens a download and returns the file size.
    pub async fn begin_download(&mut self, path: PathBuf) -> Result<u64, TransferError> {
        if let Some(download) = &self.download {
            return Err(TransferError::DownloadInProgress(
                download.path().display().to_string(),
            ));
        }

        let (download, size) = Download::open(path).await?;
        self.download = Some(download);
        Ok(size)
    }

    /// Next chunk of the open download. The empty end-of-file chunk also
    /// releases the read handle.
    pub async fn read_chunk(&mut self, offset: Option<u64>) -> Result<Vec<u8>, TransferError> {
        let download = self.download.as_mut().ok_or(TransferError::NoDownload)?;

        match download.read_chunk(offset).await {
            Ok(chunk) => {
                if chunk.is_empty() {
                    self.download = None;
                }
                Ok(chunk)
            }
            Err(e) => {
                self.download = None;
                Err(e)
            }
        }
    }

    /// Drops every open handle.
    pub fn abort(&mut self) {
        self.upload = None;
        self.download = None;
    }
}
