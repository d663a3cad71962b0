//! Well-known local paths: configuration search list and private state.
//!
//! Nothing here touches remote hosts. The state directory holds the ssh
//! known-hosts file tierup maintains separately from the operator's own,
//! since host keys change every time a machine is re-imaged.

use std::path::{Path, PathBuf};

/// File name looked up in the working directory.
pub const LOCAL_CONFIG_NAME: &str = "tierup.toml";

/// System-wide fallback.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/tierup/config.toml";

/// Ordered list of places a configuration file is looked for when
/// `--config` is not given. The first existing entry wins.
pub fn default_config_search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(LOCAL_CONFIG_NAME)];
    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("tierup").join("config.toml"));
    }
    paths.push(PathBuf::from(SYSTEM_CONFIG_PATH));
    paths
}

/// Return the first path in `candidates` that exists as a file.
pub fn first_existing(candidates: &[PathBuf]) -> Option<PathBuf> {
    candidates.iter().find(|p| p.is_file()).cloned()
}

/// Private state directory: `$XDG_STATE_HOME/tierup`, falling back to
/// `~/.local/state/tierup`, then `./.tierup`.
pub fn state_dir() -> PathBuf {
    if let Some(dir) = dirs::state_dir() {
        return dir.join("tierup");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".local/state/tierup");
    }
    PathBuf::from(".tierup")
}

/// Known-hosts file used for every ssh/scp invocation.
pub fn known_hosts_path(state_dir: &Path) -> PathBuf {
    state_dir.join("known_hosts")
}
