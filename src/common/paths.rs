//! Configuration, log and worker paths, and shared memory region names
//!
//! Directories come from the `directories` crate:
//! - Linux: `~/.config/framecheck/` and `~/.local/share/framecheck/`
//! - macOS: `~/Library/Application Support/framecheck/`

use std::path::PathBuf;

/// Application name used for directories
const APP_NAME: &str = "framecheck";

/// File name of the worker executable
pub const WORKER_BIN: &str = "framecheck-worker";

/// Prefix of every shared memory region created by the driver
const REGION_PREFIX: &str = "/fc-";

/// Generate a fresh, collision-free shared memory region name
///
/// POSIX names must start with a slash, and macOS limits them to 31 bytes,
/// so the name is the prefix plus 24 hex digits of a v4 UUID.
pub fn region_name() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("{}{}", REGION_PREFIX, &id[..24])
}

/// Locate the worker executable
///
/// Looks next to the current executable first (the normal install layout),
/// then on `PATH`.
pub fn default_worker_path() -> Option<PathBuf> {
    let sibling = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(WORKER_BIN)))
        .filter(|path| path.exists());

    sibling.or_else(|| which::which(WORKER_BIN).ok())
}

/// Get the configuration directory path
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the configuration file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}

/// Get the path to the log directory
pub fn log_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.data_dir().join("logs"))
}
