use super::error::DiscoveryError;
use super::registry::FileRegistry;
use super::retry::{publish_with_retry, resolve_with_retry};
use super::Discovery;
use std::time::Duration;
use tempfile::TempDir;

#[tokio::test]
async fn test_publish_then_resolve() {
    let dir = TempDir::new().unwrap();
    let registry = FileRegistry::new(dir.path().join("registry"));

    registry.publish("_vnc_kcm._tcp", 5901).await.unwrap();
    assert_eq!(registry.resolve("_vnc_kcm._tcp").await.unwrap(), 5901);

    registry.publish("_vnc_kcm._tcp", 5902).await.unwrap();
    assert_eq!(registry.resolve("_vnc_kcm._tcp").await.unwrap(), 5902);
}

#[tokio::test]
async fn test_unpublished_service() {
    let dir = TempDir::new().unwrap();
    let registry = FileRegistry::new(dir.path());
    assert!(matches!(
        registry.resolve("_launcher_kcm._tcp").await,
        Err(DiscoveryError::NotPublished(_))
    ));
}

#[tokio::test]
async fn test_service_names_cannot_escape_registry() {
    let dir = TempDir::new().unwrap();
    let registry = FileRegistry::new(dir.path());
    assert!(matches!(
        registry.publish("../evil", 1).await,
        Err(DiscoveryError::InvalidServiceName(_))
    ));
}

#[tokio::test]
async fn test_malformed_entry() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("svc.port"), "not a port").unwrap();
    let registry = FileRegistry::new(dir.path());
    assert!(matches!(
        registry.resolve("svc").await,
        Err(DiscoveryError::MalformedEntry { .. })
    ));
}

#[tokio::test]
async fn test_resolve_gives_up_after_budget() {
    let dir = TempDir::new().unwrap();
    let registry = FileRegistry::new(dir.path());
    let err = resolve_with_retry(&registry, "svc", 3, Duration::from_millis(1))
        .await
        .unwrap_err();
    assert!(matches!(err, DiscoveryError::Exhausted { attempts: 3, .. }));
}

#[tokio::test]
async fn test_resolve_waits_for_late_publication() {
    let dir = TempDir::new().unwrap();
    let registry = FileRegistry::new(dir.path());

    let publisher = registry.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        publisher.publish("svc", 12345).await.unwrap();
    });

    let port = resolve_with_retry(&registry, "svc", 200, Duration::from_millis(5))
        .await
        .unwrap();
    assert_eq!(port, 12345);
}

#[tokio::test]
async fn test_publish_with_retry_succeeds() {
    let dir = TempDir::new().unwrap();
    let registry = FileRegistry::new(dir.path().join("nested").join("registry"));
    publish_with_retry(&registry, "svc", 4242, 2, Duration::from_millis(1))
        .await
        .unwrap();
    assert_eq!(registry.resolve("svc").await.unwrap(), 4242);
}

#[tokio::test]
async fn test_withdraw() {
    let dir = TempDir::new().unwrap();
    let registry = FileRegistry::new(dir.path());

    registry.withdraw("svc").await.unwrap();
    registry.publish("svc", 5901).await.unwrap();
    registry.withdraw("svc").await.unwrap();
    assert!(matches!(
        registry.resolve("svc").await,
        Err(DiscoveryError::NotPublished(_))
    ));
}
