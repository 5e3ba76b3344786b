//! Configuration loading and root folder resolution

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable naming the root folder (database, logs)
pub const ROOT_FOLDER_ENV: &str = "VIZIER_ROOT_FOLDER";

/// Environment variable naming an explicit configuration file
pub const CONFIG_FILE_ENV: &str = "VIZIER_CONFIG";

/// File name searched for in the platform configuration directory
pub const CONFIG_FILE_NAME: &str = "vizier.toml";

/// Root folder resolution, highest priority first:
/// 1. Command-line argument
/// 2. Environment variable
/// 3. `root_folder` value from the TOML config file
/// 4. OS-dependent compiled default
pub fn resolve_root_folder(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    config_value: Option<&Path>,
) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = config_value {
        return path.to_path_buf();
    }

    default_root_folder()
}

/// Locate the configuration file.
///
/// Priority: command-line argument, then `env_var_name`, then the
/// platform config directory (`~/.config/vizier/vizier.toml` on Linux,
/// falling back to `/etc/vizier/vizier.toml`). Returns `None` when no
/// candidate exists; explicit paths are returned even if missing so the
/// caller can report them.
pub fn locate_config_file(cli_arg: Option<&Path>, env_var_name: &str) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    let user_config = dirs::config_dir().map(|d| d.join("vizier").join(CONFIG_FILE_NAME));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/vizier").join(CONFIG_FILE_NAME);
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Load a TOML config file into `T`.
///
/// A missing file is not fatal: a warning is logged and `T::default()` is
/// returned. A file that exists but cannot be read or parsed is a
/// configuration error.
pub fn load_toml_config<T>(path: Option<&Path>) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let Some(path) = path else {
        warn!("No configuration file found, using compiled defaults");
        return Ok(T::default());
    };

    if !path.exists() {
        warn!(
            path = %path.display(),
            "Configuration file not found, using compiled defaults"
        );
        return Ok(T::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;

    let config = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;

    debug!(path = %path.display(), "Loaded configuration file");
    Ok(config)
}

/// OS-dependent default root folder
pub fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/vizier (or /var/lib/vizier for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("vizier"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/vizier"))
    } else if cfg!(target_os = "macos") {
        // ~/Library/Application Support/vizier
        dirs::data_dir()
            .map(|d| d.join("vizier"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/vizier"))
    } else if cfg!(target_os = "windows") {
        // %LOCALAPPDATA%\vizier
        dirs::data_local_dir()
            .map(|d| d.join("vizier"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\vizier"))
    } else {
        PathBuf::from("./vizier_data")
    }
}

/// Database file inside a root folder
pub fn database_path(root_folder: &Path) -> PathBuf {
    root_folder.join("vizier.db")
}

/// Directory for log files inside a root folder
pub fn logs_dir(root_folder: &Path) -> PathBuf {
    root_folder.join("logs")
}
