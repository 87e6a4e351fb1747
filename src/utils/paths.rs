//! Application path resolution
//!
//! Paths are always absolute. A desktop launcher may start the process with `/` as the
//! working directory, so nothing here is resolved relative to the cwd.

use std::path::PathBuf;
use tracing::{debug, warn};

const APP_DIR_NAME: &str = "Tubeloader";

/// Get the application data directory, creating it if needed.
///
/// Linux: `~/.local/share/Tubeloader`, macOS: `~/Library/Application Support/Tubeloader`,
/// Windows: `%APPDATA%\Tubeloader`.
pub fn get_app_support_dir() -> PathBuf {
    let dir = dirs::data_dir()
        .map(|base| base.join(APP_DIR_NAME))
        .or_else(|| dirs::home_dir().map(|home| home.join(format!(".{}", APP_DIR_NAME.to_lowercase()))))
        .unwrap_or_else(|| std::env::temp_dir().join(APP_DIR_NAME));

    if let Err(e) = std::fs::create_dir_all(&dir) {
        warn!("Failed to create app support directory {:?}: {}", dir, e);
    }

    debug!("App support directory: {:?}", dir);
    dir
}

/// Get the queue database path
pub fn get_database_path() -> PathBuf {
    get_app_support_dir().join("tubeloader.db")
}

/// Get the settings file path
pub fn get_settings_path() -> PathBuf {
    get_app_support_dir().join("settings.json")
}

/// Get the downloads directory, falling back to `~/Downloads` and then the temp dir.
pub fn get_downloads_dir() -> PathBuf {
    dirs::download_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join("Downloads")))
        .unwrap_or_else(|| {
            warn!("Could not determine Downloads directory, using temp dir");
            std::env::temp_dir()
        })
}
