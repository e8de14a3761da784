pub mod error;
pub mod registry;
pub mod retry;

use std::future::Future;

use crate::core_discovery::error::DiscoveryError;

/// Name-to-port service discovery, as provided by the connection manager.
pub trait Discovery: Send + Sync {
    /// Looks up the port a service is reachable on.
    fn resolve(&self, service: &str) -> impl Future<Output = Result<u16, DiscoveryError>> + Send;

    /// Announces that a service accepts connections on `port`.
    fn publish(
        &self,
        service: &str,
        port: u16,
    ) -> impl Future<Output = Result<(), DiscoveryError>> + Send;

    /// Takes a service announcement back. Withdrawing an unpublished
    /// service succeeds.
    fn withdraw(&self, service: &str) -> impl Future<Output = Result<(), DiscoveryError>> + Send;
}

#[cfg(test)]
mod test_discovery;
