//! Configuration, inventory and control socket paths
//!
//! Unix: control sockets live under `$XDG_RUNTIME_DIR/netreach` or
//! `/tmp/netreach-<uid>`. Other platforms fall back to the temp dir.

use std::io;
use std::path::PathBuf;

/// Name used for config and runtime directories
const APP_NAME: &str = "netreach";

/// Directory holding OpenSSH ControlMaster sockets
///
/// Platform-specific:
/// - Unix: `$XDG_RUNTIME_DIR/netreach` or `/tmp/netreach-<uid>`
/// - Other: `<temp>/netreach`
#[cfg(unix)]
pub fn control_dir() -> PathBuf {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        return PathBuf::from(runtime_dir).join(APP_NAME);
    }

    // Fallback to /tmp with uid so users don't share sockets
    let uid = unsafe { libc::getuid() };
    PathBuf::from(format!("/tmp/{}-{}", APP_NAME, uid))
}

#[cfg(not(unix))]
pub fn control_dir() -> PathBuf {
    std::env::temp_dir().join(APP_NAME)
}

/// Ensure the control socket directory exists with proper permissions
///
/// On Unix, creates the directory with mode 0700; ssh refuses control
/// sockets in directories other users can write to.
#[cfg(unix)]
pub fn ensure_control_dir() -> io::Result<PathBuf> {
    let dir = control_dir();

    if !dir.exists() {
        std::fs::create_dir_all(&dir)?;
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o700))?;
    }

    Ok(dir)
}

#[cfg(not(unix))]
pub fn ensure_control_dir() -> io::Result<PathBuf> {
    let dir = control_dir();
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Get the configuration directory path
///
/// Uses the directories crate for platform-appropriate locations:
/// - Linux: `~/.config/netreach/`
/// - macOS: `~/Library/Application Support/netreach/`
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME)
        .map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the configuration file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}

/// Get the default inventory path
pub fn inventory_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("inventory.yaml"))
}
