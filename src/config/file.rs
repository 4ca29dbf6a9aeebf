//! Configuration file loading

use super::Config;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Config file name inside the config directory
const CONFIG_FILE: &str = "config.toml";

/// Fallback in the working directory
const LOCAL_CONFIG: &str = "./onionmeet.toml";

/// Load configuration
///
/// An explicit path must exist. Otherwise the config directory and then the
/// working directory are tried; when neither has a file, defaults are used.
pub fn load_config(explicit: Option<&Path>, config_dir: &Path) -> Result<Config> {
    if let Some(path) = explicit {
        return load_from_path(path);
    }

    match find_config_file(config_dir) {
        Some(path) => load_from_path(&path),
        None => {
            debug!("No configuration file found, using defaults");
            let config = Config::default();
            super::validate(&config)?;
            Ok(config)
        },
    }
}

/// Find first existing config file
fn find_config_file(config_dir: &Path) -> Option<PathBuf> {
    [config_dir.join(CONFIG_FILE), PathBuf::from(LOCAL_CONFIG)]
        .into_iter()
        .find(|p| p.is_file())
}

/// Load and parse config from path
pub fn load_from_path(path: &Path) -> Result<Config> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    super::validate(&config)?;

    debug!("Loaded configuration from {}", path.display());
    Ok(config)
}
