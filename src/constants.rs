// src/constants.rs

/// Largest payload carried by a single send/retrieve chunk call.
pub const CHUNK_SIZE: usize = 1024 * 1024;
/// Upper bound on one encoded RPC frame: a full chunk plus envelope.
pub const MAX_FRAME_LENGTH: usize = 2 * CHUNK_SIZE;

pub const TUNNEL_BUFFER_SIZE: usize = 4096;

pub const LAUNCHER_SERVICE_NAME: &str = "_launcher_kcm._tcp";
pub const VNC_SERVICE_NAME: &str = "_vnc_kcm._tcp";

pub const DISPLAY_SETUP_PROGRAM: &str = "display_setup";
pub const VNC_PORT_SENTINEL: &str = "x11vnc_port";
pub const RESUMED_SENTINEL: &str = "dekimberlize.resumed";
pub const FINISHED_SENTINEL: &str = "dekimberlize_finished";
/// Read cap for the VNC port sentinel.
pub const PORT_SENTINEL_BUFFER: usize = 256;

pub const PERSISTENT_STATE_MODIFIED_SUFFIX: &str = ".new";
pub const PERSISTENT_STATE_DIFF_SUFFIX: &str = ".diff";

pub const RANDOM_PORT_MIN: u16 = 10000;
pub const RANDOM_PORT_MAX: u16 = 65000;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/kimberley.conf";
