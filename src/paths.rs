//! Config/log file locations
//!
//! Priority: `--config` file / CLI dir -> `ORBITVIEW_CONFIG_DIR` -> local folder
//! (if it already holds orbitview files) -> platform config dir from dirs-next.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "orbitview.json";
pub const LOG_FILE: &str = "orbitview.log";
const APP_DIR: &str = "orbitview";
const ENV_CONFIG_DIR: &str = "ORBITVIEW_CONFIG_DIR";

/// Overrides for the default application paths
#[derive(Debug, Clone, Default)]
pub struct PathConfig {
    /// Custom config directory (from CLI or ENV)
    pub config_dir: Option<PathBuf>,
}

impl PathConfig {
    /// CLI dir wins over `ORBITVIEW_CONFIG_DIR`
    pub fn from_env_and_cli(cli_dir: Option<PathBuf>) -> Self {
        let config_dir = cli_dir.or_else(|| std::env::var(ENV_CONFIG_DIR).ok().map(PathBuf::from));
        Self { config_dir }
    }
}

/// Path of a file in the config directory
///
/// Platform paths:
/// - Linux: ~/.config/orbitview/{name}
/// - macOS: ~/Library/Application Support/orbitview/{name}
/// - Windows: %APPDATA%\orbitview\{name}
pub fn config_file(name: &str, config: &PathConfig) -> PathBuf {
    config_dir(config).join(name)
}

/// Create the config directory if missing
pub fn ensure_dirs(config: &PathConfig) -> Result<()> {
    let dir = config_dir(config);
    if !dir.exists() {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
    }
    Ok(())
}

fn has_local_files(dir: &Path) -> bool {
    [CONFIG_FILE, LOG_FILE].iter().any(|f| dir.join(f).exists())
}

fn config_dir(config: &PathConfig) -> PathBuf {
    if let Some(dir) = &config.config_dir {
        return dir.clone();
    }
    if let Ok(current) = std::env::current_dir() {
        if has_local_files(&current) {
            return current;
        }
    }
    if let Some(dir) = dirs_next::config_dir() {
        return dir.join(APP_DIR);
    }
    PathBuf::from(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_file_with_custom_dir() {
        let config = PathConfig { config_dir: Some(PathBuf::from("/custom")) };
        assert_eq!(config_file(CONFIG_FILE, &config), PathBuf::from("/custom/orbitview.json"));
    }

    #[test]
    fn test_cli_dir_beats_env() {
        // Only this test touches ORBITVIEW_CONFIG_DIR
        let saved = std::env::var_os(ENV_CONFIG_DIR);
        unsafe { std::env::set_var(ENV_CONFIG_DIR, "/from-env") };

        let from_env = PathConfig::from_env_and_cli(None);
        let from_cli = PathConfig::from_env_and_cli(Some(PathBuf::from("/from-cli")));

        match saved {
            Some(value) => unsafe { std::env::set_var(ENV_CONFIG_DIR, value) },
            None => unsafe { std::env::remove_var(ENV_CONFIG_DIR) },
        }
        assert_eq!(from_env.config_dir, Some(PathBuf::from("/from-env")));
        assert_eq!(from_cli.config_dir, Some(PathBuf::from("/from-cli")));
    }

    #[test]
    fn test_platform_default_names_app() {
        let config = PathConfig { config_dir: None };
        let path = config_file(CONFIG_FILE, &config);
        assert!(path.ends_with(CONFIG_FILE));
    }

    #[test]
    fn test_ensure_dirs_creates_custom_dir() {
        let dir = std::env::temp_dir().join(format!("orbitview-paths-{}", std::process::id()));
        let config = PathConfig { config_dir: Some(dir.clone()) };
        ensure_dirs(&config).unwrap();
        assert!(dir.is_dir());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
