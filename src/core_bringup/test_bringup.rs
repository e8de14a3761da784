use super::display_setup::{spawn_display_setup, BringupPlan, OverlayArg};
use super::error::BringupError;
use super::sentinel::{parse_vnc_port, poll_vnc_port, touch, wait_for_file};
use crate::core_rpc::protocol::Status;
use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

#[test]
fn test_parse_port_skips_leading_noise() {
    assert_eq!(parse_vnc_port(b"5901\n", 4).unwrap(), 5901);
    assert_eq!(parse_vnc_port(b"PORT=5902\n", 4).unwrap(), 5902);
    assert_eq!(parse_vnc_port(b"  12345 trailing 99", 4).unwrap(), 12345);
}

#[test]
fn test_parse_port_short_content_is_retryable() {
    assert!(matches!(
        parse_vnc_port(b"59", 4),
        Err(BringupError::SentinelTooShort { len: 2, min: 4 })
    ));
    assert!(matches!(
        parse_vnc_port(b"", 4),
        Err(BringupError::SentinelTooShort { len: 0, .. })
    ));
}

#[test]
fn test_parse_port_rejects_bad_content() {
    assert!(matches!(
        parse_vnc_port(b"no port here", 4),
        Err(BringupError::NoDigits(_))
    ));
    assert!(matches!(
        parse_vnc_port(b"port 99999", 4),
        Err(BringupError::InvalidPort(_))
    ));
    assert!(matches!(
        parse_vnc_port(b"port 0000", 4),
        Err(BringupError::InvalidPort(_))
    ));
}

#[test]
fn test_helper_arguments() {
    let plan = BringupPlan {
        vm_name: String::from("winxp"),
        overlay: OverlayArg::Patch(PathBuf::from("/tmp/overlay.patch")),
        persistent_state: Some(PathBuf::from("/tmp/floppy.img")),
        encryption_key: Some(PathBuf::from("/tmp/key")),
    };
    let expected: Vec<OsString> = [
        "-a",
        "/tmp/floppy.img",
        "-d",
        "/tmp/key",
        "-f",
        "/tmp/overlay.patch",
        "winxp",
    ]
    .iter()
    .map(OsString::from)
    .collect();
    assert_eq!(plan.args(), expected);

    let plan = BringupPlan {
        vm_name: String::from("fedora"),
        overlay: OverlayArg::Url(String::from("http://example.org/overlay")),
        persistent_state: None,
        encryption_key: None,
    };
    let expected: Vec<OsString> = ["-i", "http://example.org/overlay", "fedora"]
        .iter()
        .map(OsString::from)
        .collect();
    assert_eq!(plan.args(), expected);
}

#[tokio::test]
async fn test_poll_finds_sentinel_written_later() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("x11vnc_port");

    let writer = path.clone();
    tokio::spawn(async move {
        // A partial write first, then the complete content.
        tokio::time::sleep(Duration::from_millis(20)).await;
        tokio::fs::write(&writer, b"59").await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        tokio::fs::write(&writer, b"5901\n").await.unwrap();
    });

    let cancel = CancellationToken::new();
    let port = poll_vnc_port(&path, Duration::from_millis(5), 4, &cancel)
        .await
        .unwrap();
    assert_eq!(port, 5901);
}

#[tokio::test]
async fn test_poll_fails_on_garbage() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("x11vnc_port");
    std::fs::write(&path, b"not a number").unwrap();

    let cancel = CancellationToken::new();
    let err = poll_vnc_port(&path, Duration::from_millis(5), 4, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, BringupError::NoDigits(_)));
}

#[tokio::test]
async fn test_poll_is_cancellable() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("x11vnc_port");

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let err = poll_vnc_port(&path, Duration::from_secs(60), 4, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, BringupError::Cancelled));
}

#[tokio::test]
async fn test_wait_for_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("dekimberlize.resumed");

    let creator = path.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        touch(&creator).await.unwrap();
    });

    let cancel = CancellationToken::new();
    wait_for_file(&path, Duration::from_millis(2), &cancel)
        .await
        .unwrap();
    assert!(path.exists());

    let absent = dir.path().join("never");
    cancel.cancel();
    assert!(matches!(
        wait_for_file(&absent, Duration::from_millis(2), &cancel).await,
        Err(BringupError::Cancelled)
    ));
}

#[tokio::test]
async fn test_touch_keeps_existing_content() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("dekimberlize_finished");
    std::fs::write(&path, b"keep").unwrap();
    touch(&path).await.unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), b"keep");
}

#[tokio::test]
async fn test_missing_helper_is_an_exec_failure() {
    let plan = BringupPlan {
        vm_name: String::from("vm"),
        overlay: OverlayArg::Url(String::from("http://example.org/o")),
        persistent_state: None,
        encryption_key: None,
    };
    let err = spawn_display_setup("/nonexistent/display_setup", &plan).unwrap_err();
    assert!(matches!(err, BringupError::Spawn { .. }));
    assert_eq!(err.status(), Status::Exec);
}

#[cfg(unix)]
#[tokio::test]
async fn test_helper_runs_with_plan_arguments() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("args");
    let script = dir.path().join("setup.sh");
    std::fs::write(&script, format!("echo \"$@\" > {}\n", out.display())).unwrap();

    // `sh -f <script> <vm>` runs the script with the vm name as argument.
    let plan = BringupPlan {
        vm_name: String::from("winxp"),
        overlay: OverlayArg::Patch(script),
        persistent_state: None,
        encryption_key: None,
    };
    spawn_display_setup("/bin/sh", &plan).unwrap();

    let cancel = CancellationToken::new();
    wait_for_file(&out, Duration::from_millis(5), &cancel)
        .await
        .unwrap();
    let mut content = String::new();
    for _ in 0..200 {
        content = std::fs::read_to_string(&out).unwrap();
        if !content.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(content.trim(), "winxp");
}
