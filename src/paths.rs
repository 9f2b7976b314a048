//! Config file discovery for deckhand
//!
//! # Resolution Priority
//!
//! 1. `--config <path>` flag
//! 2. `DECKHAND_CONFIG` environment variable
//! 3. `./deckhand.toml` in the working directory
//! 4. `<config dir>/deckhand/config.toml`:
//!    - `XDG_CONFIG_HOME/deckhand` (if set)
//!    - Platform default (`~/.config/deckhand`, `%APPDATA%\deckhand`)
//!
//! When none of these exist the built-in topology is used.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Environment variable for the config file override
pub const ENV_CONFIG: &str = "DECKHAND_CONFIG";

/// File name looked up in the working directory
pub const LOCAL_CONFIG: &str = "deckhand.toml";

/// Where the effective config comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Given on the command line
    Flag(PathBuf),
    /// Named by `DECKHAND_CONFIG`
    Env(PathBuf),
    /// Found by searching the usual locations
    Discovered(PathBuf),
    /// No file; built-in defaults
    Builtin,
}

impl ConfigSource {
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Flag(p) | Self::Env(p) | Self::Discovered(p) => Some(p),
            Self::Builtin => None,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Flag(p) => format!("{} (--config)", p.display()),
            Self::Env(p) => format!("{} ({ENV_CONFIG})", p.display()),
            Self::Discovered(p) => p.display().to_string(),
            Self::Builtin => "built-in defaults".to_string(),
        }
    }
}

/// Get the deckhand config directory path
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg_config).join("deckhand");
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    #[cfg(windows)]
    {
        if let Some(app_data) = dirs::config_dir() {
            return Ok(app_data.join("deckhand"));
        }
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".config").join("deckhand"))
}

/// Resolve which config file to load
///
/// An explicit flag or env var must point at an existing file; discovered
/// locations are simply skipped when absent.
pub fn resolve_config(flag: Option<&str>) -> Result<ConfigSource> {
    if let Some(flag) = flag {
        let path = expand(flag);
        anyhow::ensure!(path.is_file(), "Config file not found: {}", path.display());
        return Ok(ConfigSource::Flag(path));
    }

    if let Ok(value) = std::env::var(ENV_CONFIG) {
        let path = expand(&value);
        log::debug!("Using config from {}: {}", ENV_CONFIG, path.display());
        anyhow::ensure!(
            path.is_file(),
            "{} points at a missing file: {}",
            ENV_CONFIG,
            path.display()
        );
        return Ok(ConfigSource::Env(path));
    }

    let local = PathBuf::from(LOCAL_CONFIG);
    if local.is_file() {
        return Ok(ConfigSource::Discovered(local));
    }

    let global = config_dir()?.join("config.toml");
    if global.is_file() {
        return Ok(ConfigSource::Discovered(global));
    }

    log::debug!("No config file found, using built-in defaults");
    Ok(ConfigSource::Builtin)
}

/// Expand ~ and environment variables in a path string.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::fs;
    use tempfile::TempDir;

    /// Run `f` with `key` set, restoring the previous value afterwards
    ///
    /// # Safety
    /// Uses unsafe env::set_var/remove_var; only call from tests that do not
    /// read the same variable concurrently.
    fn with_env_var<F, R>(key: &str, value: &str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let original = env::var(key).ok();
        // SAFETY: the variable is unique to this test
        unsafe { env::set_var(key, value) };
        let result = f();
        match original {
            // SAFETY: as above
            Some(v) => unsafe { env::set_var(key, v) },
            None => unsafe { env::remove_var(key) },
        }
        result
    }

    #[test]
    fn test_flag_wins() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("fleet.toml");
        fs::write(&file, "").unwrap();

        let source = resolve_config(Some(file.to_str().unwrap())).unwrap();
        assert_eq!(source, ConfigSource::Flag(file.clone()));
        assert_eq!(source.path(), Some(file.as_path()));
    }

    #[test]
    fn test_missing_flag_file_is_an_error() {
        let err = resolve_config(Some("/nonexistent/deckhand.toml")).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_expand_with_tilde() {
        let result = expand("~/secrets");
        let home = dirs::home_dir().unwrap();
        assert_eq!(result, home.join("secrets"));
    }

    #[test]
    fn test_expand_with_env_var() {
        with_env_var("DECKHAND_TEST_VAR", "labels", || {
            assert_eq!(
                expand("/srv/$DECKHAND_TEST_VAR/src"),
                PathBuf::from("/srv/labels/src")
            );
        });
    }

    #[test]
    fn test_xdg_config_home() {
        with_env_var("XDG_CONFIG_HOME", "/tmp/xdg-deckhand-test", || {
            assert_eq!(
                config_dir().unwrap(),
                PathBuf::from("/tmp/xdg-deckhand-test/deckhand")
            );
        });
    }

    #[test]
    fn test_builtin_source_has_no_path() {
        assert_eq!(ConfigSource::Builtin.path(), None);
        assert_eq!(ConfigSource::Builtin.describe(), "built-in defaults");
    }
}
