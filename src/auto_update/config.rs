// Update Configuration File Handler
// Loads and saves update configuration from/to a JSON file

use std::fs;
use std::path::{Path, PathBuf};

use crate::auto_update::{UpdateConfig, UpdateError};

/// Configuration file name
const CONFIG_FILE_NAME: &str = "update_config.json";

/// Directory (under the user's home) holding updater state
const CONFIG_DIR_NAME: &str = ".desktop-updater";

/// Get the configuration file path
/// Stores in the home directory: ~/.desktop-updater/update_config.json
pub fn get_config_path() -> PathBuf {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    home.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME)
}

/// Load update configuration from the default location
/// Returns default config if the file doesn't exist or can't be parsed
pub fn load_config() -> UpdateConfig {
    load_config_from(&get_config_path())
}

/// Load update configuration from an explicit path
pub fn load_config_from(config_path: &Path) -> UpdateConfig {
    if !config_path.exists() {
        log::info!("[UpdateConfig] Config file not found, using defaults");
        return UpdateConfig::default();
    }

    match fs::read_to_string(config_path) {
        Ok(content) => match serde_json::from_str::<UpdateConfig>(&content) {
            Ok(config) => {
                log::info!("[UpdateConfig] Loaded config from {:?}", config_path);
                log::info!("[UpdateConfig] Repository: {}", config.slug());
                config
            }
            Err(e) => {
                log::warn!("[UpdateConfig] Failed to parse config: {}, using defaults", e);
                UpdateConfig::default()
            }
        },
        Err(e) => {
            log::warn!("[UpdateConfig] Failed to read config: {}, using defaults", e);
            UpdateConfig::default()
        }
    }
}

/// Save update configuration to the default location
pub fn save_config(config: &UpdateConfig) -> Result<(), UpdateError> {
    save_config_to(config, &get_config_path())
}

/// Save update configuration to an explicit path
pub fn save_config_to(config: &UpdateConfig, config_path: &Path) -> Result<(), UpdateError> {
    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            UpdateError::FileSystem(format!("Failed to create config directory: {}", e))
        })?;
    }

    let json = serde_json::to_string_pretty(config)
        .map_err(|e| UpdateError::Configuration(format!("Failed to serialize config: {}", e)))?;

    fs::write(config_path, json)
        .map_err(|e| UpdateError::FileSystem(format!("Failed to write config: {}", e)))?;

    log::info!("[UpdateConfig] Saved config to {:?}", config_path);
    Ok(())
}

/// Create default config file if it doesn't exist
pub fn ensure_config_exists() -> Result<PathBuf, UpdateError> {
    let config_path = get_config_path();

    if !config_path.exists() {
        save_config_to(&UpdateConfig::default(), &config_path)?;
        log::info!("[UpdateConfig] Created default config at {:?}", config_path);
    }

    Ok(config_path)
}
