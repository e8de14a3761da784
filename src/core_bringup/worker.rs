// Drives one display bring-up off the dispatcher's path
use log::{error, info};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{BringupConfig, DiscoveryConfig};
use crate::constants::{FINISHED_SENTINEL, RESUMED_SENTINEL, VNC_PORT_SENTINEL, VNC_SERVICE_NAME};
use crate::core_bringup::display_setup::{spawn_display_setup, BringupPlan};
use crate::core_bringup::error::BringupError;
use crate::core_bringup::sentinel::{poll_vnc_port, wait_for_file};
use crate::core_discovery::retry::publish_with_retry;
use crate::core_discovery::Discovery;
use crate::core_session::state::SessionState;
use crate::helpers::remove_quietly;

/// What a bring-up worker needs from its session.
pub struct BringupContext<D> {
    pub state: Arc<Mutex<SessionState>>,
    pub bringup: BringupConfig,
    pub discovery: Arc<D>,
    pub discovery_config: DiscoveryConfig,
    pub cancel: CancellationToken,
}

impl<D> BringupContext<D> {
    fn sentinel(&self, name: &str) -> PathBuf {
        self.bringup.sentinel_dir.join(name)
    }
}

/// Launches the helper and hands the readiness polling to a worker task.
///
/// A helper that cannot be started fails the call; everything after that
/// is reported through the session state.
pub async fn start<D>(
    context: BringupContext<D>,
    plan: &BringupPlan,
) -> Result<JoinHandle<()>, BringupError>
where
    D: Discovery + 'static,
{
    for name in [VNC_PORT_SENTINEL, RESUMED_SENTINEL, FINISHED_SENTINEL] {
        remove_quietly(&context.sentinel(name)).await;
    }
    // A client resolves the VNC service as soon as load_vm returns.
    context
        .discovery
        .withdraw(VNC_SERVICE_NAME)
        .await
        .map_err(BringupError::Withdraw)?;

    spawn_display_setup(&context.bringup.program, plan)?;
    context.state.lock().await.mark_bringup_running();

    Ok(tokio::spawn(run(context)))
}

async fn run<D: Discovery>(context: BringupContext<D>) {
    match watch(&context).await {
        Ok(()) => {}
        Err(BringupError::Cancelled) => {
            info!("Bring-up cancelled by session teardown");
            context.state.lock().await.abort_bringup();
        }
        Err(e) => {
            error!("Bring-up failed: {}", e);
            context.state.lock().await.abort_bringup();
        }
    }
}

async fn watch<D: Discovery>(context: &BringupContext<D>) -> Result<(), BringupError> {
    let port = poll_vnc_port(
        &context.sentinel(VNC_PORT_SENTINEL),
        context.bringup.port_poll_interval(),
        context.bringup.min_port_sentinel_len,
        &context.cancel,
    )
    .await?;

    info!("Registering VNC port {} as {}", port, VNC_SERVICE_NAME);
    tokio::select! {
        _ = context.cancel.cancelled() => return Err(BringupError::Cancelled),
        published = publish_with_retry(
            context.discovery.as_ref(),
            VNC_SERVICE_NAME,
            port,
            context.discovery_config.publish_attempts,
            context.discovery_config.retry_interval(),
        ) => published?,
    }
    context.state.lock().await.mark_display_ready(port);

    info!("Waiting for VM to come up..");
    wait_for_file(
        &context.sentinel(RESUMED_SENTINEL),
        context.bringup.resume_poll_interval(),
        &context.cancel,
    )
    .await?;
    context.state.lock().await.mark_in_use();
    Ok(())
}
