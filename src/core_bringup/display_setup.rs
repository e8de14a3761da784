// Launching the external display setup helper
use log::{error, info, warn};
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

use crate::core_bringup::error::BringupError;

/// Where the overlay for a bring-up comes from, as the helper sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverlayArg {
    /// A local patch file (`-f`).
    Patch(PathBuf),
    /// A remote overlay location (`-i`).
    Url(String),
}

/// Everything the helper is told about one bring-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BringupPlan {
    pub vm_name: String,
    pub overlay: OverlayArg,
    pub persistent_state: Option<PathBuf>,
    pub encryption_key: Option<PathBuf>,
}

impl BringupPlan {
    /// Helper argument list: `[-a state] [-d key] (-f patch | -i url) vm`.
    pub fn args(&self) -> Vec<OsString> {
        let mut args = Vec::new();
        if let Some(state) = &self.persistent_state {
            args.push(OsString::from("-a"));
            args.push(state.clone().into_os_string());
        }
        if let Some(key) = &self.encryption_key {
            args.push(OsString::from("-d"));
            args.push(key.clone().into_os_string());
        }
        match &self.overlay {
            OverlayArg::Patch(path) => {
                args.push(OsString::from("-f"));
                args.push(path.clone().into_os_string());
            }
            OverlayArg::Url(url) => {
                args.push(OsString::from("-i"));
                args.push(OsString::from(url));
            }
        }
        args.push(OsString::from(&self.vm_name));
        args
    }
}

/// Starts the helper detached from the caller.
///
/// Only a failure to start is reported; the exit status is collected by a
/// background task that merely logs it.
pub fn spawn_display_setup(program: &str, plan: &BringupPlan) -> Result<u32, BringupError> {
    info!("Starting display setup: {} {:?}", program, plan.args());

    let mut child = Command::new(program)
        .args(plan.args())
        .stdin(Stdio::null())
        .kill_on_drop(false)
        .spawn()
        .map_err(|source| BringupError::Spawn {
            program: program.to_string(),
            source,
        })?;

    let pid = child.id().unwrap_or_default();
    let program = program.to_string();
    tokio::spawn(async move {
        match child.wait().await {
            Ok(status) if status.success() => info!("{} (pid {}) exited", program, pid),
            Ok(status) => warn!("{} (pid {}) exited with {}", program, pid, status),
            Err(e) => error!("Failed to reap {} (pid {}): {}", program, pid, e),
        }
    });

    Ok(pid)
}
