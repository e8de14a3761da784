use log::{debug, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::{BringupConfig, Config, DiscoveryConfig};
use crate::constants::{FINISHED_SENTINEL, RESUMED_SENTINEL, VNC_PORT_SENTINEL, VNC_SERVICE_NAME};
use crate::core_bringup::sentinel::touch;
use crate::core_bringup::worker::{self, BringupContext};
use crate::core_discovery::Discovery;
use crate::core_rpc::protocol::LoadVm;
use crate::core_session::error::SessionError;
use crate::core_session::state::{Overlay, Phase, SessionState};
use crate::core_transfer::compression::decompress_in_place;
use crate::core_transfer::error::TransferError;
use crate::core_transfer::state::TransferState;
use crate::helpers::{local_filename, remove_quietly};

/// How the client designates the overlay in a `load_vm_*` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlaySource {
    Path,
    Url,
    Attachment,
}

impl OverlaySource {
    fn operation(self) -> &'static str {
        match self {
            OverlaySource::Path => "load_vm_from_path",
            OverlaySource::Url => "load_vm_from_URL",
            OverlaySource::Attachment => "load_vm_from_attachment",
        }
    }
}

/// One VM session, owned by the handler of a single connection.
///
/// Transfer handles stay with the handler; the fields the bring-up worker
/// also touches live behind `state`, which is locked only around field
/// updates and never across I/O.
pub struct Session<D> {
    staging_dir: PathBuf,
    bringup: BringupConfig,
    discovery_config: DiscoveryConfig,
    discovery: Arc<D>,
    state: Arc<Mutex<SessionState>>,
    transfers: TransferState,
    cancel: CancellationToken,
    worker: Option<JoinHandle<()>>,
}

impl<D> Session<D>
where
    D: Discovery + 'static,
{
    pub fn new(config: &Config, discovery: Arc<D>) -> Self {
        Self {
            staging_dir: config.server.staging_dir.clone(),
            bringup: config.bringup.clone(),
            discovery_config: config.discovery.clone(),
            discovery,
            state: Arc::new(Mutex::new(SessionState::new())),
            transfers: TransferState::new(),
            cancel: CancellationToken::new(),
            worker: None,
        }
    }

    /// Shared session fields, for inspection.
    pub fn state(&self) -> Arc<Mutex<SessionState>> {
        Arc::clone(&self.state)
    }

    fn staged(&self, operation: &'static str, name: &str) -> Result<PathBuf, SessionError> {
        local_filename(&self.staging_dir, name).ok_or_else(|| {
            SessionError::Transfer(TransferError::InvalidName(format!("{} ({})", name, operation)))
        })
    }

    async fn staged_existing(
        &self,
        operation: &'static str,
        name: &str,
    ) -> Result<PathBuf, SessionError> {
        let path = self.staged(operation, name)?;
        if self.transfers.upload_path() == Some(path.as_path()) {
            return Err(SessionError::UploadIncomplete(path));
        }
        match tokio::fs::try_exists(&path).await {
            Ok(true) => Ok(path),
            Ok(false) => Err(SessionError::NotFound(path)),
            Err(e) => Err(TransferError::io(&path, e).into()),
        }
    }

    async fn require_before_bringup(&self, operation: &'static str) -> Result<(), SessionError> {
        let phase = self.state.lock().await.phase;
        if phase.before_bringup() {
            Ok(())
        } else {
            Err(SessionError::InvalidState { operation, phase })
        }
    }

    pub fn ping(&self) {
        debug!("Ping");
    }

    /// Announces an upload of `size` bytes named `name`.
    pub async fn send_file(&mut self, name: &str, size: u64) -> Result<(), SessionError> {
        let path = self.staged("send_file", name)?;
        if let Some(current) = self.transfers.upload_path() {
            return Err(TransferError::UploadInProgress(current.display().to_string()).into());
        }

        {
            let mut state = self.state.lock().await;
            state.track(&path);
            if state.phase.before_bringup() {
                state.phase = Phase::ReceivingOverlay;
            }
        }

        self.transfers.begin_upload(path, size).await?;
        Ok(())
    }

    pub async fn send_chunk(&mut self, data: &[u8], offset: Option<u64>) -> Result<(), SessionError> {
        self.transfers.write_chunk(data, offset).await?;
        Ok(())
    }

    /// Opens a staged file for download and returns its size.
    pub async fn retrieve_file(&mut self, name: &str) -> Result<u64, SessionError> {
        let path = self.staged("retrieve_file", name)?;
        Ok(self.transfers.begin_download(path).await?)
    }

    pub async fn retrieve_chunk(&mut self, offset: Option<u64>) -> Result<Vec<u8>, SessionError> {
        Ok(self.transfers.read_chunk(offset).await?)
    }

    /// Decompresses a previously uploaded persistent-state image in place
    /// and records it with its derived paths.
    pub async fn use_persistent_state(&mut self, name: &str) -> Result<(), SessionError> {
        const OPERATION: &str = "use_persistent_state";
        self.require_before_bringup(OPERATION).await?;
        let path = self.staged_existing(OPERATION, name).await?;

        info!("Decompressing persistent state {}..", path.display());
        decompress_in_place(&path).await?;

        let mut state = self.state.lock().await;
        if !state.phase.before_bringup() {
            return Err(SessionError::InvalidState {
                operation: OPERATION,
                phase: state.phase,
            });
        }
        let persistent = state.set_persistent_state(path);
        info!("Using persistent state: {}", persistent.original.display());
        Ok(())
    }

    pub async fn use_encryption_key(&mut self, name: &str) -> Result<(), SessionError> {
        const OPERATION: &str = "use_encryption_key";
        self.require_before_bringup(OPERATION).await?;
        let path = self.staged_existing(OPERATION, name).await?;

        let mut state = self.state.lock().await;
        if !state.phase.before_bringup() {
            return Err(SessionError::InvalidState {
                operation: OPERATION,
                phase: state.phase,
            });
        }
        info!("Using encryption key file: {}", path.display());
        state.set_encryption_key(path);
        Ok(())
    }

    /// Starts a display bring-up for `args.vm_name` with the given overlay.
    ///
    /// Returns once the helper has been started; readiness is awaited by a
    /// background worker so this connection keeps being served.
    pub async fn load_vm(&mut self, source: OverlaySource, args: LoadVm) -> Result<(), SessionError> {
        let operation = source.operation();
        if args.vm_name.trim().is_empty() || args.uri.trim().is_empty() {
            return Err(SessionError::invalid_argument(
                operation,
                "vm name and overlay are required",
            ));
        }

        let overlay = match source {
            OverlaySource::Path => Overlay::Path(self.staged_existing(operation, &args.uri).await?),
            OverlaySource::Attachment => {
                Overlay::Attachment(self.staged_existing(operation, &args.uri).await?)
            }
            OverlaySource::Url => Overlay::Url(
                Url::parse(&args.uri)
                    .map_err(|e| SessionError::invalid_argument(operation, e.to_string()))?,
            ),
        };

        info!(
            "Preparing new VNC display with vm '{}', overlay {:?}..",
            args.vm_name, overlay
        );

        let plan = {
            let mut state = self.state.lock().await;
            if state.display_in_progress {
                return Err(SessionError::BringupInProgress);
            }
            if !state.phase.before_bringup() {
                return Err(SessionError::InvalidState {
                    operation,
                    phase: state.phase,
                });
            }
            state.request_bringup(args.vm_name, overlay)
        };

        let context = BringupContext {
            state: Arc::clone(&self.state),
            bringup: self.bringup.clone(),
            discovery: Arc::clone(&self.discovery),
            discovery_config: self.discovery_config.clone(),
            cancel: self.cancel.child_token(),
        };

        match worker::start(context, &plan).await {
            Ok(handle) => {
                self.worker = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.state.lock().await.abort_bringup();
                Err(e.into())
            }
        }
    }

    /// Signals end of use to the helper. With `retrieve_state`, returns the
    /// diff path the client should fetch, when the session has one.
    pub async fn end_usage(&mut self, retrieve_state: bool) -> Result<Option<String>, SessionError> {
        let diff = self.state.lock().await.end_usage(retrieve_state);

        let finished = self.bringup.sentinel_dir.join(FINISHED_SENTINEL);
        if let Err(e) = touch(&finished).await {
            warn!("Failed to create {}: {}", finished.display(), e);
        }
        self.cancel.cancel();

        if let Some(diff) = &diff {
            info!("Client told to retrieve state: {}", diff);
        }
        Ok(diff)
    }

    pub fn use_usb_cable(&self) {
        info!("Client asked for a USB cable connection; nothing to do");
    }

    /// Tears the session down: releases the helper, stops any bring-up
    /// worker, removes every file the session recorded and takes back the
    /// VNC announcement.
    ///
    /// Only a failure to signal the helper is reported; removal failures
    /// are logged.
    pub async fn cleanup(&mut self) -> Result<(), SessionError> {
        self.cancel.cancel();
        self.transfers.abort();
        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.await {
                warn!("Bring-up worker ended abnormally: {}", e);
            }
        }

        let finished = self.bringup.sentinel_dir.join(FINISHED_SENTINEL);
        let signalled = touch(&finished)
            .await
            .map_err(|source| SessionError::FinishSignal {
                path: finished.clone(),
                source,
            });

        let tracked = self.state.lock().await.reset();
        for path in &tracked {
            remove_quietly(path).await;
        }
        for name in [VNC_PORT_SENTINEL, RESUMED_SENTINEL] {
            remove_quietly(&self.bringup.sentinel_dir.join(name)).await;
        }
        if let Err(e) = self.discovery.withdraw(VNC_SERVICE_NAME).await {
            warn!("Failed to withdraw {}: {}", VNC_SERVICE_NAME, e);
        }
        info!("Session cleaned up ({} tracked files)", tracked.len());

        self.cancel = CancellationToken::new();
        signalled
    }
}
