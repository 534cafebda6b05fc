use crate::config::Config;
use crate::utils::get_rolodex_home;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub fn get_config_path() -> Result<PathBuf> {
    Ok(get_rolodex_home()?.join("config.json"))
}

/// Load the config, apply env overrides and run full validation.
pub fn load_config(config_path: Option<&Path>) -> Result<Config> {
    let config = read_config(config_path)?;
    config
        .validate()
        .with_context(|| "Configuration validation failed")?;
    Ok(config)
}

/// Like [`load_config`] but only checks what doesn't require secrets.
pub fn read_config(config_path: Option<&Path>) -> Result<Config> {
    let default_path = get_config_path().unwrap_or_else(|_| PathBuf::from("config.json"));
    let path = config_path.unwrap_or(default_path.as_path());

    let mut config = if path.exists() {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        check_file_permissions(path);
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config JSON from {}", path.display()))?
    } else {
        debug!("no config at {}, using defaults", path.display());
        Config::default()
    };

    crate::config::credentials::apply_env_overrides(&mut config);

    config
        .validate_structure()
        .with_context(|| "Configuration validation failed")?;
    Ok(config)
}

/// Warn if the config file or its parent directory is readable by others.
/// Only emits warnings once per process.
#[cfg(unix)]
fn check_file_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    use std::sync::Once;

    static WARNED: Once = Once::new();
    WARNED.call_once(|| {
        if let Ok(meta) = std::fs::metadata(path) {
            let mode = meta.permissions().mode();
            if mode & 0o077 != 0 {
                warn!(
                    "config file {} has permissions {:o}, recommend 0600",
                    path.display(),
                    mode & 0o777
                );
            }
        }

        if let Some(parent) = path.parent()
            && let Ok(meta) = std::fs::metadata(parent)
        {
            let mode = meta.permissions().mode();
            if mode & 0o077 != 0 {
                warn!(
                    "config directory {} has permissions {:o}, recommend 0700",
                    parent.display(),
                    mode & 0o777
                );
            }
        }
    });
}

#[cfg(not(unix))]
fn check_file_permissions(_path: &Path) {}

#[cfg(test)]
mod tests;
