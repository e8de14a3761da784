use log::info;
use std::fmt;
use std::path::{Path, PathBuf};
use url::Url;

use crate::constants::{PERSISTENT_STATE_DIFF_SUFFIX, PERSISTENT_STATE_MODIFIED_SUFFIX};
use crate::core_bringup::display_setup::{BringupPlan, OverlayArg};

/// Where a session is in the VM load sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    ReceivingAuxiliaryFiles,
    ReceivingOverlay,
    BringupRequested,
    BringupRunning,
    DisplayReady,
    InUse,
    Ending,
}

impl Phase {
    /// Auxiliary files and the overlay may only be set up before a load.
    pub fn before_bringup(self) -> bool {
        matches!(
            self,
            Phase::Idle | Phase::ReceivingAuxiliaryFiles | Phase::ReceivingOverlay
        )
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Phase::Idle => "idle",
            Phase::ReceivingAuxiliaryFiles => "receiving auxiliary files",
            Phase::ReceivingOverlay => "receiving the overlay",
            Phase::BringupRequested => "bring-up requested",
            Phase::BringupRunning => "bring-up running",
            Phase::DisplayReady => "display ready",
            Phase::InUse => "in use",
            Phase::Ending => "ending",
        };
        f.write_str(text)
    }
}

/// Provenance of the VM overlay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Overlay {
    /// A file already present in the staging directory.
    Path(PathBuf),
    /// A remote location handed through to the helper.
    Url(Url),
    /// A file uploaded on this connection.
    Attachment(PathBuf),
}

impl Overlay {
    pub fn local_path(&self) -> Option<&Path> {
        match self {
            Overlay::Path(path) | Overlay::Attachment(path) => Some(path),
            Overlay::Url(_) => None,
        }
    }

    fn to_arg(&self) -> OverlayArg {
        match self {
            Overlay::Path(path) | Overlay::Attachment(path) => OverlayArg::Patch(path.clone()),
            Overlay::Url(url) => OverlayArg::Url(url.to_string()),
        }
    }
}

/// A decompressed persistent-state image and the files derived from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistentState {
    pub original: PathBuf,
    pub modified: PathBuf,
    pub diff: PathBuf,
}

impl PersistentState {
    pub fn new(original: PathBuf) -> Self {
        Self {
            modified: with_suffix(&original, PERSISTENT_STATE_MODIFIED_SUFFIX),
            diff: with_suffix(&original, PERSISTENT_STATE_DIFF_SUFFIX),
            original,
        }
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Session fields shared between the dispatcher and the bring-up worker.
#[derive(Debug)]
pub struct SessionState {
    pub phase: Phase,
    pub vm_name: Option<String>,
    pub overlay: Option<Overlay>,
    pub encryption_key: Option<PathBuf>,
    pub persistent_state: Option<PersistentState>,
    pub display_in_progress: bool,
    pub vnc_port: Option<u16>,
    tracked: Vec<PathBuf>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            vm_name: None,
            overlay: None,
            encryption_key: None,
            persistent_state: None,
            display_in_progress: false,
            vnc_port: None,
            tracked: Vec::new(),
        }
    }

    /// Records a file the session is responsible for removing.
    pub fn track(&mut self, path: &Path) {
        if !self.tracked.iter().any(|p| p == path) {
            self.tracked.push(path.to_path_buf());
        }
    }

    pub fn tracked_files(&self) -> &[PathBuf] {
        &self.tracked
    }

    pub fn set_persistent_state(&mut self, original: PathBuf) -> &PersistentState {
        let state = PersistentState::new(original);
        self.track(&state.original);
        self.track(&state.modified);
        self.track(&state.diff);
        self.phase = Phase::ReceivingAuxiliaryFiles;
        self.persistent_state.insert(state)
    }

    pub fn set_encryption_key(&mut self, key: PathBuf) {
        self.track(&key);
        self.encryption_key = Some(key);
        self.phase = Phase::ReceivingAuxiliaryFiles;
    }

    /// Claims the session for a bring-up and returns what the helper needs.
    pub fn request_bringup(&mut self, vm_name: String, overlay: Overlay) -> BringupPlan {
        if let Some(path) = overlay.local_path() {
            self.track(path);
        }
        let plan = BringupPlan {
            vm_name: vm_name.clone(),
            overlay: overlay.to_arg(),
            persistent_state: self.persistent_state.as_ref().map(|s| s.original.clone()),
            encryption_key: self.encryption_key.clone(),
        };
        self.vm_name = Some(vm_name);
        self.overlay = Some(overlay);
        self.display_in_progress = true;
        self.vnc_port = None;
        self.phase = Phase::BringupRequested;
        plan
    }

    pub fn mark_bringup_running(&mut self) {
        if self.phase == Phase::BringupRequested {
            self.phase = Phase::BringupRunning;
        }
    }

    pub fn mark_display_ready(&mut self, port: u16) {
        self.vnc_port = Some(port);
        if self.phase == Phase::BringupRunning {
            self.phase = Phase::DisplayReady;
        }
    }

    pub fn mark_in_use(&mut self) {
        self.display_in_progress = false;
        if self.phase == Phase::DisplayReady {
            self.phase = Phase::InUse;
            info!("VM {:?} is in use", self.vm_name);
        }
    }

    /// Releases a failed or cancelled bring-up so a new load may be tried.
    /// An ending session stays ending.
    pub fn abort_bringup(&mut self) {
        self.display_in_progress = false;
        if matches!(
            self.phase,
            Phase::BringupRequested | Phase::BringupRunning | Phase::DisplayReady
        ) {
            self.overlay = None;
            self.vm_name = None;
            self.vnc_port = None;
            self.phase = if self.persistent_state.is_some() || self.encryption_key.is_some() {
                Phase::ReceivingAuxiliaryFiles
            } else {
                Phase::Idle
            };
        }
    }

    /// Path handed to the client for retrieving the state diff, if any.
    pub fn end_usage(&mut self, retrieve_state: bool) -> Option<String> {
        self.phase = Phase::Ending;
        if !retrieve_state {
            return None;
        }
        self.persistent_state
            .as_ref()
            .map(|state| state.diff.display().to_string())
    }

    /// Empties the session and hands back every file it was tracking.
    pub fn reset(&mut self) -> Vec<PathBuf> {
        let tracked = std::mem::take(&mut self.tracked);
        *self = Self::new();
        tracked
    }
}
