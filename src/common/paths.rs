//! Configuration and log file locations

use std::path::PathBuf;

/// Directory name used under the platform config/data dirs
const APP_NAME: &str = "paramsweep";

/// Get the configuration directory path
///
/// Uses the directories crate for platform-appropriate locations:
/// - Linux: `~/.config/paramsweep/`
/// - macOS: `~/Library/Application Support/paramsweep/`
/// - Windows: `%APPDATA%\paramsweep\`
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the configuration file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}
