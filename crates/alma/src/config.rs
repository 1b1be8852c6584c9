//! Registry configuration
//!
//! Layered with the `config` crate: an optional TOML file first, then
//! environment variables (`ALMA_DEFAULT_COPY_ON_STORE`, `ALMA_TRACE_CHANGES`).

use std::path::Path;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Settings applied by a [`VariableRegistry`](crate::VariableRegistry) to the
/// variables it creates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlmaConfig {
    /// Copy-on-store policy used when `WatchOptions` leaves it unset
    pub default_copy_on_store: bool,
    /// Attach a `TracingListener` to every watched variable
    pub trace_changes: bool,
}

impl Default for AlmaConfig {
    fn default() -> Self {
        Self {
            default_copy_on_store: true,
            trace_changes: false,
        }
    }
}

impl AlmaConfig {
    /// Environment prefix read by [`AlmaConfig::load`]
    pub const ENV_PREFIX: &'static str = "ALMA";

    /// Load from `ALMA_*` environment variables
    pub fn load() -> Result<Self> {
        Self::load_from(None, Self::ENV_PREFIX)
    }

    /// Load from a TOML file that must exist, without environment overrides
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()).required(true))
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// Load an optional file, then apply variables starting with `env_prefix`
    pub fn load_from(path: Option<&Path>, env_prefix: &str) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(false));
        }
        let config = builder
            .add_source(Environment::with_prefix(env_prefix).try_parsing(true))
            .build()?;
        Ok(config.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = AlmaConfig::default();
        assert!(config.default_copy_on_store);
        assert!(!config.trace_changes);
    }

    #[test]
    fn test_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("alma.toml");
        fs::write(&path, "trace_changes = true\n").unwrap();

        let config = AlmaConfig::from_file(&path).unwrap();
        assert!(config.trace_changes);
        assert!(config.default_copy_on_store);
    }

    #[test]
    fn test_from_missing_file_fails() {
        let temp_dir = TempDir::new().unwrap();
        let result = AlmaConfig::from_file(temp_dir.path().join("missing.toml"));
        assert!(matches!(result, Err(crate::AlmaError::Config(_))));
    }

    #[test]
    fn test_env_overrides_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("alma.toml");
        fs::write(&path, "default_copy_on_store = true\n").unwrap();
        std::env::set_var("ALMA_CFG_TEST_DEFAULT_COPY_ON_STORE", "false");

        let config = AlmaConfig::load_from(Some(&path), "ALMA_CFG_TEST").unwrap();
        std::env::remove_var("ALMA_CFG_TEST_DEFAULT_COPY_ON_STORE");

        assert!(!config.default_copy_on_store);
        assert!(!config.trace_changes);
    }

    #[test]
    fn test_missing_optional_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("absent.toml");
        let config = AlmaConfig::load_from(Some(&path), "ALMA_CFG_ABSENT").unwrap();
        assert_eq!(config, AlmaConfig::default());
    }
}
