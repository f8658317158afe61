//! # Loader Configuration
//!
//! TOML-based configuration for fetch timeouts and concurrency, with
//! environment-variable overrides.

use crate::error::{LoaderError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Composite loader configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Fetch timeout in seconds (expiry counts as a load failure)
    #[serde(default = "default_timeout")]
    pub fetch_timeout_secs: u64,

    /// Maximum simultaneous fetches (0 = unbounded)
    #[serde(default)]
    pub max_concurrent_fetches: usize,
}

fn default_timeout() -> u64 { 30 }

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: default_timeout(),
            max_concurrent_fetches: 0,
        }
    }
}

impl LoaderConfig {
    /// Load from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| LoaderError::Config(format!("Failed to read config: {}", e)))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| LoaderError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from TOML file or return default
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            match Self::from_file(path) {
                Ok(config) => return config,
                Err(e) => tracing::warn!("Failed to load loader config: {}", e),
            }
        }
        Self::default()
    }

    /// Apply `VITRINE_FETCH_TIMEOUT_SECS` / `VITRINE_MAX_CONCURRENT_FETCHES`.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(value) = lookup("VITRINE_FETCH_TIMEOUT_SECS") {
            self.fetch_timeout_secs = value.trim().parse().map_err(|e| {
                LoaderError::Config(format!("VITRINE_FETCH_TIMEOUT_SECS={}: {}", value, e))
            })?;
        }
        if let Some(value) = lookup("VITRINE_MAX_CONCURRENT_FETCHES") {
            self.max_concurrent_fetches = value.trim().parse().map_err(|e| {
                LoaderError::Config(format!("VITRINE_MAX_CONCURRENT_FETCHES={}: {}", value, e))
            })?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.fetch_timeout_secs == 0 {
            return Err(LoaderError::Config("fetch_timeout_secs must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn with_fetch_timeout_secs(mut self, secs: u64) -> Self {
        self.fetch_timeout_secs = secs;
        self
    }

    pub fn with_max_concurrent_fetches(mut self, limit: usize) -> Self {
        self.max_concurrent_fetches = limit;
        self
    }
}

/// Example TOML configuration file
pub const EXAMPLE_CONFIG: &str = r#"
# Vitrine loader configuration

# Seconds before a part fetch is abandoned and reported as a load failure
fetch_timeout_secs = 30

# Maximum simultaneous fetches (0 = unbounded)
max_concurrent_fetches = 0
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_example_config_parses() {
        let config = LoaderConfig::from_toml_str(EXAMPLE_CONFIG).unwrap();
        assert_eq!(config, LoaderConfig::default());
        assert_eq!(config.fetch_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config = LoaderConfig::from_toml_str("max_concurrent_fetches = 4").unwrap();
        assert_eq!(config.fetch_timeout_secs, 30);
        assert_eq!(config.max_concurrent_fetches, 4);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        assert!(LoaderConfig::from_toml_str("fetch_timeout_secs = 0").is_err());
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("VITRINE_FETCH_TIMEOUT_SECS", "5"),
            ("VITRINE_MAX_CONCURRENT_FETCHES", "2"),
        ]
        .into_iter()
        .collect();

        let config = LoaderConfig::default()
            .with_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.fetch_timeout_secs, 5);
        assert_eq!(config.max_concurrent_fetches, 2);

        let bad = LoaderConfig::default()
            .with_overrides(|key| (key == "VITRINE_FETCH_TIMEOUT_SECS").then(|| "soon".to_string()));
        assert!(matches!(bad, Err(LoaderError::Config(_))));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoaderConfig::load_or_default(&dir.path().join("loader.toml"));
        assert_eq!(config, LoaderConfig::default());
    }
}
