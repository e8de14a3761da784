// Mobile launcher: ships a VM to the display launcher and views it
use anyhow::{Context, Result};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::Command;

use crate::config::Config;
use crate::constants::{LAUNCHER_SERVICE_NAME, VNC_SERVICE_NAME};
use crate::core_cli::OverlayChoice;
use crate::core_discovery::retry::resolve_with_retry;
use crate::core_discovery::Discovery;
use crate::core_rpc::client::RpcClient;
use crate::core_transfer::compression::compress_into;
use crate::core_transfer::error::TransferError;
use crate::core_transfer::pieces::{retrieve_file_in_pieces, send_file_in_pieces};
use crate::helpers::basename;
use crate::rtt::{assess_link, LinkQuality};

/// What the user asked the launcher to bring up.
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    pub vm_name: String,
    pub overlay: OverlayChoice,
    pub floppy: Option<PathBuf>,
    pub key: Option<PathBuf>,
}

fn remote_name(path: &Path) -> Result<String, TransferError> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| TransferError::InvalidName(path.display().to_string()))
}

fn perform_authentication() {
    info!("Authentication is not required on this link");
}

/// Runs one complete launch: discover, connect, ship the files, load the
/// VM, view it, then tear the session down.
pub async fn run<D: Discovery>(
    config: &Config,
    request: &LaunchRequest,
    discovery: &D,
) -> Result<()> {
    info!("Discovering {}..", LAUNCHER_SERVICE_NAME);
    let port = resolve_with_retry(
        discovery,
        LAUNCHER_SERVICE_NAME,
        config.discovery.client_attempts,
        config.discovery.retry_interval(),
    )
    .await
    .context("Couldn't discover the display launcher")?;

    let host = &config.client.host;
    info!("Connecting to {}:{}..", host, port);
    let mut client = RpcClient::connect(host, port)
        .await
        .with_context(|| format!("Failed to connect to {}:{}", host, port))?;
    info!("Successfully connected. Bringing up launcher..");

    perform_authentication();

    let mut floppy_used = false;
    let result = drive(config, request, discovery, &mut client, &mut floppy_used).await;
    if let Err(e) = &result {
        error!("{:#}", e);
    }
    teardown(&mut client, floppy_used, &config.client.download_dir).await;
    result
}

async fn drive<D, T>(
    config: &Config,
    request: &LaunchRequest,
    discovery: &D,
    client: &mut RpcClient<T>,
    floppy_used: &mut bool,
) -> Result<()>
where
    D: Discovery,
    T: AsyncRead + AsyncWrite + Unpin,
{
    let quality = assess_link(
        client,
        config.client.ping_count,
        config.client.slow_link_threshold_ms,
    )
    .await
    .context("Ping failed")?;
    if quality == LinkQuality::Slow && config.client.use_usb_on_slow_link {
        info!("Asking for a USB cable connection");
        client.use_usb_cable().await.context("use_USB_cable failed")?;
    }

    if let Some(floppy) = &request.floppy {
        info!("Sending floppy disk image..");
        match attach_persistent_state(client, floppy).await {
            Ok(()) => *floppy_used = true,
            Err(e) => warn!("Failed sending floppy disk image, going on without it: {}", e),
        }
    }

    if let Some(key) = &request.key {
        info!("Sending encryption key..");
        attach_encryption_key(client, key)
            .await
            .context("Failed to attach the encryption key")?;
    }

    load_overlay(client, &request.vm_name, &request.overlay)
        .await
        .context("Failed to load the VM")?;

    let vnc_port = resolve_with_retry(
        discovery,
        VNC_SERVICE_NAME,
        config.discovery.client_attempts,
        config.discovery.retry_interval(),
    )
    .await
    .context("Couldn't discover thin client services")?;
    info!("Thin client service is on port {}", vnc_port);

    launch_viewer(&config.client.viewer, &config.client.host, vnc_port).await
}

/// Sends `floppy` gzip-compressed under its own name and makes it the
/// session's persistent state.
pub async fn attach_persistent_state<T>(
    client: &mut RpcClient<T>,
    floppy: &Path,
) -> Result<(), TransferError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let name = remote_name(floppy)?;
    let scratch = TempDir::new().map_err(|e| TransferError::io(std::env::temp_dir(), e))?;
    let compressed = compress_into(floppy, scratch.path()).await?;

    send_file_in_pieces(client, &compressed, &name).await?;
    client.use_persistent_state(&name).await?;
    Ok(())
}

pub async fn attach_encryption_key<T>(
    client: &mut RpcClient<T>,
    key: &Path,
) -> Result<(), TransferError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let name = remote_name(key)?;
    send_file_in_pieces(client, key, &name).await?;
    client.use_encryption_key(&name).await?;
    Ok(())
}

pub async fn load_overlay<T>(
    client: &mut RpcClient<T>,
    vm_name: &str,
    overlay: &OverlayChoice,
) -> Result<(), TransferError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    match overlay {
        OverlayChoice::File(path) => {
            info!("Sending VM overlay..");
            let name = remote_name(path)?;
            send_file_in_pieces(client, path, &name).await?;
            info!("Loading VM..");
            client.load_vm_from_attachment(vm_name, &name).await?;
        }
        OverlayChoice::Url(url) => {
            info!("Loading VM from {}..", url);
            client.load_vm_from_url(vm_name, url).await?;
        }
        OverlayChoice::Path(path) => {
            info!("Loading VM from {} on the display host..", path);
            client.load_vm_from_path(vm_name, path).await?;
        }
    }
    Ok(())
}

/// Runs the VNC viewer against `host::port` until the user closes it.
pub async fn launch_viewer(viewer: &str, host: &str, port: u16) -> Result<()> {
    let target = format!("{}::{}", host, port);
    info!("Executing {} {}..", viewer, target);
    let status = Command::new(viewer)
        .arg(&target)
        .status()
        .await
        .with_context(|| format!("Failed to execute {}", viewer))?;
    if !status.success() {
        warn!("{} exited with {}", viewer, status);
    }
    Ok(())
}

/// Ends the remote session and, when persistent state was in use, fetches
/// the state diff into `download_dir`. Returns where the diff was stored.
///
/// Failures here are logged only; the session is over either way.
pub async fn teardown<T>(
    client: &mut RpcClient<T>,
    floppy_used: bool,
    download_dir: &Path,
) -> Option<PathBuf>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let diff = match client.end_usage(floppy_used).await {
        Ok(diff) => diff?,
        Err(e) => {
            error!("end_usage failed: {}", e);
            return None;
        }
    };

    let Some(base) = basename(&diff) else {
        warn!("Server returned an unusable state file name {:?}", diff);
        return None;
    };
    let dest = download_dir.join(base);
    match retrieve_file_in_pieces(client, &diff, &dest).await {
        Ok(size) => {
            info!("Retrieved {} ({} bytes)", dest.display(), size);
            Some(dest)
        }
        Err(e) => {
            warn!("Couldn't retrieve '{}': {}", diff, e);
            None
        }
    }
}

#[cfg(test)]
mod test_launcher;
