use log::{debug, info};
use std::io::ErrorKind;
use std::path::PathBuf;

use crate::core_discovery::error::DiscoveryError;
use crate::core_discovery::Discovery;
use crate::helpers::basename;

/// Discovery backed by a shared directory: every published service is a
/// `<service>.port` file holding the port in ASCII.
#[derive(Debug, Clone)]
pub struct FileRegistry {
    dir: PathBuf,
}

impl FileRegistry {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn entry_path(&self, service: &str) -> Result<PathBuf, DiscoveryError> {
        match basename(service) {
            Some(base) if base == service => Ok(self.dir.join(format!("{}.port", service))),
            _ => Err(DiscoveryError::InvalidServiceName(service.to_string())),
        }
    }
}

impl Discovery for FileRegistry {
    async fn resolve(&self, service: &str) -> Result<u16, DiscoveryError> {
        let path = self.entry_path(service)?;
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(DiscoveryError::NotPublished(service.to_string()))
            }
            Err(source) => return Err(DiscoveryError::Io { path, source }),
        };

        let port = content
            .trim()
            .parse::<u16>()
            .ok()
            .filter(|port| *port != 0)
            .ok_or_else(|| DiscoveryError::MalformedEntry {
                path: path.clone(),
                content: content.clone(),
            })?;
        debug!("Resolved {} to port {}", service, port);
        Ok(port)
    }

    async fn publish(&self, service: &str, port: u16) -> Result<(), DiscoveryError> {
        let path = self.entry_path(service)?;
        let io_error = |source| DiscoveryError::Io {
            path: path.clone(),
            source,
        };

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(io_error)?;

        // Readers never see a half-written entry.
        let staging = path.with_extension("port.tmp");
        tokio::fs::write(&staging, format!("{}\n", port))
            .await
            .map_err(io_error)?;
        tokio::fs::rename(&staging, &path)
            .await
            .map_err(io_error)?;

        info!("Published {} on port {}", service, port);
        Ok(())
    }

    async fn withdraw(&self, service: &str) -> Result<(), DiscoveryError> {
        let path = self.entry_path(service)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                info!("Withdrew {}", service);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(DiscoveryError::Io { path, source }),
        }
    }
}
