// Error handling for service discovery
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Service {0} is not published")]
    NotPublished(String),

    #[error("Invalid service name: {0:?}")]
    InvalidServiceName(String),

    #[error("Malformed registry entry {path}: {content:?}")]
    MalformedEntry { path: PathBuf, content: String },

    #[error("Registry I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Gave up on {service} after {attempts} attempts: {last}")]
    Exhausted {
        service: String,
        attempts: u32,
        last: Box<DiscoveryError>,
    },
}
