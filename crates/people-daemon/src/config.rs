//! Command-line paths and log filter selection.

use people_core::settings::SETTINGS_FILE_NAME;
use std::path::{Path, PathBuf};

/// Expand a leading `~` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    } else if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// The settings file to use: the explicit one, or the file inside the vault.
pub fn settings_path(vault: &Path, explicit: Option<&str>) -> PathBuf {
    match explicit {
        Some(path) => expand_home(path),
        None => vault.join(SETTINGS_FILE_NAME),
    }
}

/// Default `EnvFilter` directive when `RUST_LOG` is unset
pub fn default_log_filter(verbose: bool) -> &'static str {
    if verbose {
        "debug,people_daemon=debug,people_core=debug"
    } else {
        "info"
    }
}
