/// Loading, reloading and access helpers for the global configuration
use super::schemas::Config;
use crate::logger::{self, LogTag};
use crate::paths;
use once_cell::sync::OnceCell;
use std::path::Path;
use std::sync::RwLock;

/// Global configuration instance
pub static CONFIG: OnceCell<RwLock<Config>> = OnceCell::new();

/// Load `config.toml` from the data directory
pub fn load_config() -> Result<(), String> {
    let path = paths::get_config_path();
    load_config_from_path(&path)
}

/// Load configuration from a specific file and install it globally.
/// A missing file yields the defaults.
pub fn load_config_from_path(path: &Path) -> Result<(), String> {
    let config = read_config_file(path)?;
    CONFIG
        .set(RwLock::new(config))
        .map_err(|_| "Config already initialized".to_string())
}

fn read_config_file(path: &Path) -> Result<Config, String> {
    if !path.exists() {
        logger::warning(
            LogTag::Config,
            &format!("Config file '{}' not found, using default values", path.display()),
        );
        return Ok(Config::default());
    }

    let contents = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config file '{}': {}", path.display(), e))?;
    toml::from_str::<Config>(&contents)
        .map_err(|e| format!("Failed to parse config file '{}': {}", path.display(), e))
}

/// Re-read the configuration file and swap it in atomically
pub fn reload_config() -> Result<(), String> {
    let path = paths::get_config_path();
    let new_config = read_config_file(&path)?;

    let lock = CONFIG
        .get()
        .ok_or_else(|| "Config not initialized. Call load_config() first.".to_string())?;
    let mut config = lock
        .write()
        .map_err(|e| format!("Failed to acquire config write lock: {}", e))?;
    *config = new_config;
    logger::info(LogTag::Config, "Configuration reloaded");
    Ok(())
}

/// Read access to the configuration.
/// Falls back to defaults when nothing has been loaded.
pub fn with_config<F, R>(f: F) -> R
where
    F: FnOnce(&Config) -> R,
{
    let lock = CONFIG.get_or_init(|| RwLock::new(Config::default()));
    match lock.read() {
        Ok(cfg) => f(&cfg),
        Err(poisoned) => f(&poisoned.into_inner()),
    }
}

/// Owned copy for use across await points
pub fn get_config_clone() -> Config {
    with_config(|cfg| cfg.clone())
}

/// Write the current configuration to disk
pub fn save_config(path: Option<&Path>) -> Result<(), String> {
    let default_path = paths::get_config_path();
    let path = path.unwrap_or(&default_path);

    let contents = with_config(|cfg| {
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))
    })?;
    std::fs::write(path, contents)
        .map_err(|e| format!("Failed to write config file '{}': {}", path.display(), e))
}
