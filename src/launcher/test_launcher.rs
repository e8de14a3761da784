use super::*;
use crate::core_discovery::registry::FileRegistry;
use crate::core_rpc::dispatcher::serve;
use crate::core_rpc::protocol::Status;
use crate::core_session::session::Session;
use crate::server::run_with;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{duplex, DuplexStream};
use tokio_util::sync::CancellationToken;

fn test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.server.staging_dir = root.join("staging");
    config.server.bind_address = String::from("127.0.0.1");
    config.server.port = Some(0);
    config.bringup.sentinel_dir = root.join("run");
    config.bringup.port_poll_interval_ms = 5;
    config.discovery.registry_dir = root.join("registry");
    config.discovery.retry_interval_ms = 10;
    config.discovery.client_attempts = 500;
    config.client.host = String::from("127.0.0.1");
    config.client.download_dir = root.join("downloads");
    config.client.ping_count = 2;
    for dir in [
        &config.server.staging_dir,
        &config.bringup.sentinel_dir,
        &config.client.download_dir,
    ] {
        std::fs::create_dir_all(dir).unwrap();
    }
    config
}

fn connect_session(config: &Config) -> RpcClient<DuplexStream> {
    let (client_io, server_io) = duplex(64 * 1024);
    let registry = Arc::new(FileRegistry::new(&config.discovery.registry_dir));
    let mut session = Session::new(config, registry);
    tokio::spawn(async move {
        let _ = serve(server_io, &mut session).await;
        session.cleanup().await.unwrap();
    });
    RpcClient::new(client_io)
}

#[tokio::test]
async fn test_persistent_state_round_trip() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let mut client = connect_session(&config);

    let floppy = dir.path().join("floppy.img");
    let image: Vec<u8> = (0..10_000u32).map(|i| (i % 7) as u8).collect();
    std::fs::write(&floppy, &image).unwrap();

    attach_persistent_state(&mut client, &floppy).await.unwrap();
    let staged = config.server.staging_dir.join("floppy.img");
    assert_eq!(std::fs::read(&staged).unwrap(), image);

    // Stand-in for what the helper leaves behind.
    std::fs::write(config.server.staging_dir.join("floppy.img.diff"), b"diff").unwrap();

    let fetched = teardown(&mut client, true, &config.client.download_dir).await;
    let expected = config.client.download_dir.join("floppy.img.diff");
    assert_eq!(fetched, Some(expected.clone()));
    assert_eq!(std::fs::read(&expected).unwrap(), b"diff");
}

#[tokio::test]
async fn test_teardown_without_state() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let mut client = connect_session(&config);

    assert_eq!(
        teardown(&mut client, false, &config.client.download_dir).await,
        None
    );
    assert!(std::fs::read_dir(&config.client.download_dir)
        .unwrap()
        .next()
        .is_none());
}

#[tokio::test]
async fn test_missing_floppy_is_reported() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let mut client = connect_session(&config);

    let err = attach_persistent_state(&mut client, &dir.path().join("absent.img"))
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::NotFound(_)));

    // The connection is still usable afterwards.
    client.ping().await.unwrap();
}

#[tokio::test]
async fn test_encryption_key_and_overlay_errors() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let mut client = connect_session(&config);

    let key = dir.path().join("vm.key");
    std::fs::write(&key, b"secret").unwrap();
    attach_encryption_key(&mut client, &key).await.unwrap();
    assert_eq!(
        std::fs::read(config.server.staging_dir.join("vm.key")).unwrap(),
        b"secret"
    );

    let err = load_overlay(
        &mut client,
        "vm",
        &OverlayChoice::Path(String::from("not-staged.patch")),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status(), Status::NotFound);
}

#[cfg(unix)]
#[tokio::test]
async fn test_launch_end_to_end() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path());
    // `/bin/sh -f <overlay> <vm>` runs the uploaded overlay as the helper.
    config.bringup.program = String::from("/bin/sh");
    config.client.viewer = String::from("true");

    let run_dir = config.bringup.sentinel_dir.clone();
    let overlay = dir.path().join("overlay.sh");
    std::fs::write(
        &overlay,
        format!(
            "printf '5999\\n' > {}\n: > {}\n",
            run_dir.join("x11vnc_port").display(),
            run_dir.join("dekimberlize.resumed").display(),
        ),
    )
    .unwrap();

    let registry = Arc::new(FileRegistry::new(&config.discovery.registry_dir));
    let shutdown = CancellationToken::new();
    let server = tokio::spawn(run_with(
        Arc::new(config.clone()),
        Arc::clone(&registry),
        shutdown.clone(),
    ));

    let request = LaunchRequest {
        vm_name: String::from("winxp"),
        overlay: OverlayChoice::File(overlay),
        floppy: None,
        key: None,
    };
    tokio::time::timeout(Duration::from_secs(10), run(&config, &request, registry.as_ref()))
        .await
        .unwrap()
        .unwrap();

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(!config.server.staging_dir.join("overlay.sh").exists());
    assert!(run_dir.join("dekimberlize_finished").exists());
}
