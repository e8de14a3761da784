use anyhow::{Context, Result};
use log::{error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{log_config, Config};
use crate::constants::{LAUNCHER_SERVICE_NAME, VNC_SERVICE_NAME};
use crate::core_discovery::registry::FileRegistry;
use crate::core_discovery::retry::publish_until_success;
use crate::core_discovery::Discovery;
use crate::core_rpc::dispatcher::serve;
use crate::core_session::session::Session;
use crate::core_tunnel::tunnel::local_tunnel;
use crate::helpers::choose_random_port;

/// Runs the display launcher with the provided configuration until
/// `shutdown` fires or a session cannot be cleaned up.
pub async fn run(config: Config, shutdown: CancellationToken) -> Result<()> {
    info!("Starting display launcher with config:");
    log_config(&config);

    let discovery = Arc::new(FileRegistry::new(&config.discovery.registry_dir));
    run_with(Arc::new(config), discovery, shutdown).await
}

pub async fn run_with<D>(
    config: Arc<Config>,
    discovery: Arc<D>,
    shutdown: CancellationToken,
) -> Result<()>
where
    D: Discovery + 'static,
{
    // A display left behind by a server that died without cleaning up.
    if let Err(e) = discovery.withdraw(VNC_SERVICE_NAME).await {
        warn!("Failed to withdraw stale {}: {}", VNC_SERVICE_NAME, e);
    }

    let port = config.server.port.unwrap_or_else(choose_random_port);
    if config.server.tunnel {
        run_tunnelled(config, discovery, port, shutdown).await
    } else {
        let address = config.server.bind_address.clone();
        let listener = bind(&address, port).await?;
        serve_sessions(listener, config, discovery, true, shutdown).await
    }
}

/// Cancels the returned token on the first SIGINT.
pub fn shutdown_on_ctrl_c() -> CancellationToken {
    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("SIGINT caught. Cleaning up..");
                trigger.cancel();
            }
            Err(e) => error!("Unable to listen for SIGINT: {}", e),
        }
    });
    shutdown
}

async fn bind(address: &str, port: u16) -> Result<TcpListener> {
    info!("Binding to {}:{}..", address, port);
    TcpListener::bind((address, port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", address, port))
}

/// Serves connections one after another, each with a fresh session.
///
/// With `publish`, the launcher service is announced before every accept.
/// A session that cannot be cleaned up ends the server with an error.
async fn serve_sessions<D>(
    listener: TcpListener,
    config: Arc<Config>,
    discovery: Arc<D>,
    publish: bool,
    shutdown: CancellationToken,
) -> Result<()>
where
    D: Discovery + 'static,
{
    let port = listener.local_addr()?.port();
    let mut session = Session::new(&config, Arc::clone(&discovery));
    info!("Launcher RPC server listening on port {}", port);

    loop {
        if publish {
            info!("Registering {} on port {}..", LAUNCHER_SERVICE_NAME, port);
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = publish_until_success(
                    discovery.as_ref(),
                    LAUNCHER_SERVICE_NAME,
                    port,
                    config.discovery.retry_interval(),
                ) => {}
            }
        }

        let (socket, addr) = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => accepted.context("Failed to accept a connection")?,
        };
        info!("New connection from {}", addr);
        if let Err(e) = socket.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY for {}: {}", addr, e);
        }

        let interrupted = tokio::select! {
            _ = shutdown.cancelled() => true,
            served = serve(socket, &mut session) => {
                if let Err(e) = served {
                    error!("Connection error with {}: {}", addr, e);
                }
                false
            }
        };
        if interrupted {
            warn!("Interrupted while serving {}", addr);
            break;
        }

        info!("Connection closed for {}", addr);
        session
            .cleanup()
            .await
            .context("Unable to clean up after the last connection")?;
    }

    session
        .cleanup()
        .await
        .context("Unable to clean up at shutdown")?;
    info!("Launcher RPC server on port {} stopped", port);
    Ok(())
}

/// Keeps the RPC server on loopback and relays each external connection
/// into it.
async fn run_tunnelled<D>(
    config: Arc<Config>,
    discovery: Arc<D>,
    port: u16,
    shutdown: CancellationToken,
) -> Result<()>
where
    D: Discovery + 'static,
{
    let rpc_listener = bind("127.0.0.1", 0).await?;
    let rpc_addr = rpc_listener.local_addr()?;
    info!("Bringing up launcher RPC server on {}..", rpc_addr);
    let mut rpc_server: JoinHandle<Result<()>> = tokio::spawn(serve_sessions(
        rpc_listener,
        Arc::clone(&config),
        Arc::clone(&discovery),
        false,
        shutdown.clone(),
    ));

    let listener = bind(&config.server.tunnel_bind_address, port).await?;
    let port = listener.local_addr()?.port();
    info!("Local tunnel listening on port {}", port);

    loop {
        info!("Registering {} on port {}..", LAUNCHER_SERVICE_NAME, port);
        tokio::select! {
            _ = shutdown.cancelled() => break,
            joined = &mut rpc_server => return rpc_server_exit(joined),
            _ = publish_until_success(
                discovery.as_ref(),
                LAUNCHER_SERVICE_NAME,
                port,
                config.discovery.retry_interval(),
            ) => {}
        }

        let (external, addr) = tokio::select! {
            _ = shutdown.cancelled() => break,
            joined = &mut rpc_server => return rpc_server_exit(joined),
            accepted = listener.accept() => accepted.context("Failed to accept a connection")?,
        };
        info!("Accepted tunnel connection from {}", addr);

        let closed = tokio::select! {
            _ = shutdown.cancelled() => false,
            result = tunnel(external, rpc_addr) => {
                if let Err(e) = result {
                    error!("Tunnel for {} failed: {:#}", addr, e);
                }
                true
            }
        };
        if !closed {
            break;
        }
        info!("A connection was closed");
    }

    shutdown.cancel();
    rpc_server_exit(rpc_server.await)
}

async fn tunnel(external: TcpStream, rpc_addr: SocketAddr) -> Result<()> {
    let local = TcpStream::connect(rpc_addr)
        .await
        .with_context(|| format!("Failed to connect to the RPC server at {}", rpc_addr))?;
    let stats = local_tunnel(external, local).await?;
    info!(
        "Tunnel relayed {} bytes in, {} bytes out",
        stats.inbound, stats.outbound
    );
    Ok(())
}

fn rpc_server_exit(joined: Result<Result<()>, tokio::task::JoinError>) -> Result<()> {
    joined.context("Launcher RPC server task failed")?
}
