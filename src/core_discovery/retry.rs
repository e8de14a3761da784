use log::warn;
use std::time::Duration;

use crate::core_discovery::error::DiscoveryError;
use crate::core_discovery::Discovery;

/// Resolves `service`, retrying with a fixed backoff up to `attempts` times.
pub async fn resolve_with_retry<D: Discovery>(
    discovery: &D,
    service: &str,
    attempts: u32,
    interval: Duration,
) -> Result<u16, DiscoveryError> {
    let mut last = None;
    for attempt in 1..=attempts.max(1) {
        match discovery.resolve(service).await {
            Ok(port) => return Ok(port),
            Err(e) => {
                warn!(
                    "Discovery of {} failed (attempt {}/{}): {}",
                    service, attempt, attempts, e
                );
                last = Some(e);
            }
        }
        if attempt < attempts {
            tokio::time::sleep(interval).await;
        }
    }
    Err(exhausted(service, attempts, last))
}

/// Publishes `service`, retrying with a fixed backoff up to `attempts` times.
pub async fn publish_with_retry<D: Discovery>(
    discovery: &D,
    service: &str,
    port: u16,
    attempts: u32,
    interval: Duration,
) -> Result<(), DiscoveryError> {
    let mut last = None;
    for attempt in 1..=attempts.max(1) {
        match discovery.publish(service, port).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                warn!(
                    "Publishing {} failed (attempt {}/{}): {}",
                    service, attempt, attempts, e
                );
                last = Some(e);
            }
        }
        if attempt < attempts {
            tokio::time::sleep(interval).await;
        }
    }
    Err(exhausted(service, attempts, last))
}

/// Publishes `service`, retrying until it succeeds.
pub async fn publish_until_success<D: Discovery>(
    discovery: &D,
    service: &str,
    port: u16,
    interval: Duration,
) {
    while let Err(e) = discovery.publish(service, port).await {
        warn!(
            "Failed to publish {}: {}. Sleeping {:?} and trying again..",
            service, e, interval
        );
        tokio::time::sleep(interval).await;
    }
}

fn exhausted(service: &str, attempts: u32, last: Option<DiscoveryError>) -> DiscoveryError {
    DiscoveryError::Exhausted {
        service: service.to_string(),
        attempts,
        last: Box::new(last.unwrap_or_else(|| DiscoveryError::NotPublished(service.to_string()))),
    }
}
