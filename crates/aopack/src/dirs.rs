use std::path::PathBuf;

use anyhow::{Context, Result};
use etcetera::{BaseStrategy, choose_base_strategy};

/// Environment variable that overrides the user configuration directory
pub const CONFIG_DIR_ENV: &str = "AOPACK_CONFIG_DIR";

/// Get the configuration directory for aopack, respecting `XDG_CONFIG_HOME`
///
/// `AOPACK_CONFIG_DIR` takes precedence over the platform default.
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(custom) = std::env::var(CONFIG_DIR_ENV) {
        return Ok(PathBuf::from(custom));
    }

    let strategy = choose_base_strategy().context("Unable to find config directory")?;
    Ok(strategy.config_dir().join("aopack"))
}

/// Location of the user-level `aopack.toml`
pub fn user_config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(crate::config::CONFIG_FILE_NAME))
}
