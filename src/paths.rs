//! Centralized path resolution
//!
//! All file and directory paths are resolved through this module.
//!
//! ```text
//! <data dir>/SwapOrchestrator/
//! ├── data/
//! │   ├── config.toml
//! │   └── swaps.db
//! └── logs/
//!     └── orchestrator_YYYY-MM-DD.log
//! ```

use once_cell::sync::Lazy;
use std::path::PathBuf;

const APP_DIR: &str = "SwapOrchestrator";

/// Lazy-initialized base directory
static BASE_DIRECTORY: Lazy<PathBuf> = Lazy::new(resolve_base_directory);

/// Resolves the platform data directory, falling back to the home directory
/// and finally to a relative path.
fn resolve_base_directory() -> PathBuf {
    if let Ok(dir) = std::env::var("SWAP_ORCHESTRATOR_HOME") {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }

    if let Some(dir) = dirs::data_local_dir() {
        return dir.join(APP_DIR);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(APP_DIR);
    }

    PathBuf::from(APP_DIR)
}

pub fn get_base_directory() -> PathBuf {
    BASE_DIRECTORY.clone()
}

pub fn get_data_directory() -> PathBuf {
    BASE_DIRECTORY.join("data")
}

pub fn get_logs_directory() -> PathBuf {
    BASE_DIRECTORY.join("logs")
}

pub fn get_config_path() -> PathBuf {
    get_data_directory().join("config.toml")
}

/// Default database file, used when `database.path` is empty
pub fn get_swaps_db_path() -> PathBuf {
    get_data_directory().join("swaps.db")
}

/// Creates every directory the application writes into
pub fn ensure_all_directories() -> Result<(), String> {
    for dir in [get_data_directory(), get_logs_directory()] {
        std::fs::create_dir_all(&dir)
            .map_err(|e| format!("Failed to create directory {}: {}", dir.display(), e))?;
    }
    Ok(())
}
