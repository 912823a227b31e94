pub mod daemon;
pub mod error;

pub use daemon::{DaemonConfig, IntervalConfig};
pub use error::*;

use std::path::PathBuf;

pub const CONFIG_ENV_VAR: &str = "STRATUM_CONFIG";
const CONFIG_FILE: &str = "stratum.yaml";

/// Stratum's per-user config directory
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("stratum");
    Ok(config_dir)
}

/// Locate `stratum.yaml`
///
/// Search order:
/// 1. `STRATUM_CONFIG` (direct path)
/// 2. `./stratum.yaml`
/// 3. `./.stratum/stratum.yaml`
/// 4. `~/.config/stratum/stratum.yaml`
///
/// Returns `None` when no candidate exists.
pub fn find_config_file() -> Result<Option<PathBuf>> {
    if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(Some(path));
        }
    }

    let current_dir = std::env::current_dir()?;
    let candidates = [
        current_dir.join(CONFIG_FILE),
        current_dir.join(".stratum").join(CONFIG_FILE),
    ];
    if let Some(path) = candidates.into_iter().find(|p| p.exists()) {
        return Ok(Some(path));
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global_config = config_dir.join("stratum").join(CONFIG_FILE);
        if global_config.exists() {
            return Ok(Some(global_config));
        }
    }

    Ok(None)
}
