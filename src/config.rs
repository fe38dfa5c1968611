//! Configuration file support
//!
//! Every key is optional; command-line flags take precedence over the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use cwtail_tail::{DEFAULT_BUFFER_SIZE, DEFAULT_CACHE_TTL, DEFAULT_PURGE_INTERVAL, DEFAULT_REFRESH_INTERVAL};

use crate::output::OutputOptions;

/// Environment variable naming an alternative config file
pub const CONFIG_ENV: &str = "CWTAIL_CONFIG";

/// Settings loaded from `config.toml`
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub region: Option<String>,
    pub profile: Option<String>,
    pub poll_interval_ms: u64,
    pub buffer_size: usize,
    pub refresh_interval_secs: u64,
    pub purge_interval_secs: u64,
    pub cache_ttl_secs: u64,
    pub output: OutputOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            region: None,
            profile: None,
            poll_interval_ms: 250,
            buffer_size: DEFAULT_BUFFER_SIZE,
            refresh_interval_secs: DEFAULT_REFRESH_INTERVAL.as_secs(),
            purge_interval_secs: DEFAULT_PURGE_INTERVAL.as_secs(),
            cache_ttl_secs: DEFAULT_CACHE_TTL.as_secs(),
            output: OutputOptions::default(),
        }
    }
}

impl Config {
    /// Load from `explicit`, then `$CWTAIL_CONFIG`, then the default location.
    ///
    /// A missing file at the default location yields the defaults; a missing
    /// file that was asked for by name is an error.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Self::from_file(Path::new(&path));
        }

        match default_path() {
            Some(path) if path.is_file() => Self::from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let config = Self::parse(&text)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        tracing::debug!(path = %path.display(), "loaded config");

        Ok(config)
    }

    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs.max(1))
    }

    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval_secs.max(1))
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs.max(1))
    }
}

/// `$HOME/.config/cwtail/config.toml`
fn default_path() -> Option<PathBuf> {
    let home = std::env::var_os("HOME")?;
    Some(PathBuf::from(home).join(".config").join("cwtail").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.poll_interval(), Duration::from_millis(250));
        assert_eq!(config.cache_ttl(), Duration::from_secs(60));
    }

    #[test]
    fn test_parse_full_file() {
        let config = Config::parse(
            r#"
            region = "eu-west-1"
            profile = "staging"
            poll_interval_ms = 500
            buffer_size = 50
            refresh_interval_secs = 10

            [output]
            timestamp = true
            stream_name = true
            "#,
        )
        .unwrap();

        assert_eq!(config.region.as_deref(), Some("eu-west-1"));
        assert_eq!(config.profile.as_deref(), Some("staging"));
        assert_eq!(config.poll_interval(), Duration::from_millis(500));
        assert_eq!(config.buffer_size, 50);
        assert_eq!(config.refresh_interval(), Duration::from_secs(10));
        assert_eq!(config.purge_interval(), Duration::from_secs(30));
        assert!(config.output.timestamp);
        assert!(config.output.stream_name);
        assert!(!config.output.json);
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(Config::parse("pol_interval_ms = 5").is_err());
        assert!(Config::parse("[output]\ncolour = true").is_err());
    }

    #[test]
    fn test_zero_intervals_are_clamped() {
        let config = Config::parse(
            "poll_interval_ms = 0\nrefresh_interval_secs = 0\ncache_ttl_secs = 0",
        )
        .unwrap();
        assert_eq!(config.poll_interval(), Duration::from_millis(1));
        assert_eq!(config.refresh_interval(), Duration::from_secs(1));
        assert_eq!(config.cache_ttl(), Duration::from_secs(1));
    }
}
