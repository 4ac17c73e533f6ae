//! Runtime settings.
//!
//! Loaded from `pricecrawl.toml` (or `--config PATH`) when present, then
//! overridden from the environment:
//!
//! - `PRICECRAWL_TIMEOUT` - navigation timeout in seconds
//! - `PRICECRAWL_SETTLE_MS` - default post-navigation settle time
//! - `PRICECRAWL_SITES_FILE` - site table replacing the bundled one
//! - `BROWSER_URL`, `SOCKS_PROXY`, `CHROME_PATH` - see [`BrowserEngineConfig`]

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::browser::BrowserEngineConfig;
use crate::crawler::CrawlSettings;
use crate::extract::PriceBounds;
use crate::sites::{RegistryError, SiteRegistry};

/// Config file looked up in the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "pricecrawl.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Navigation timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Settle time after navigation, in milliseconds. Sites may override.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    /// Plausible range for prices found by the text scan.
    #[serde(default)]
    pub price_bounds: PriceBounds,

    /// Site table path. Relative paths resolve against the config file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sites_file: Option<PathBuf>,

    #[serde(default)]
    pub browser: BrowserEngineConfig,

    /// File these settings were read from.
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

fn default_request_timeout_secs() -> u64 {
    90
}

fn default_settle_ms() -> u64 {
    2000
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
            settle_ms: default_settle_ms(),
            price_bounds: PriceBounds::default(),
            sites_file: None,
            browser: BrowserEngineConfig::default(),
            source_path: None,
        }
    }
}

impl Settings {
    /// Load settings from `path` (or [`DEFAULT_CONFIG_FILE`]) and apply
    /// environment overrides. A missing file means defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));

        let settings = if path.exists() {
            Self::load_from_path(path)?
        } else {
            debug!("No config file at {}, using defaults", path.display());
            Self::default()
        };

        Ok(settings.with_env_overrides())
    }

    /// Parse a TOML settings file without applying overrides.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut settings: Settings = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse TOML config {}", path.display()))?;

        if let (Some(sites), Some(base)) = (&settings.sites_file, path.parent()) {
            if sites.is_relative() {
                settings.sites_file = Some(base.join(sites));
            }
        }
        settings.source_path = Some(path.to_path_buf());
        Ok(settings)
    }

    pub fn with_env_overrides(self) -> Self {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| var(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(value) = var("PRICECRAWL_TIMEOUT") {
            match value.parse() {
                Ok(secs) => self.request_timeout_secs = secs,
                Err(_) => warn!("Ignoring invalid PRICECRAWL_TIMEOUT: {}", value),
            }
        }
        if let Some(value) = var("PRICECRAWL_SETTLE_MS") {
            match value.parse() {
                Ok(ms) => self.settle_ms = ms,
                Err(_) => warn!("Ignoring invalid PRICECRAWL_SETTLE_MS: {}", value),
            }
        }
        if let Some(value) = var("PRICECRAWL_SITES_FILE") {
            debug!("Using PRICECRAWL_SITES_FILE from environment: {}", value);
            self.sites_file = Some(PathBuf::from(value));
        }

        self.browser = self.browser.with_env_overrides();
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// The configured site table, or the bundled one.
    pub fn load_registry(&self) -> Result<SiteRegistry, RegistryError> {
        match &self.sites_file {
            Some(path) => SiteRegistry::load(path),
            None => SiteRegistry::bundled(),
        }
    }

    pub fn crawl_settings(&self) -> CrawlSettings {
        CrawlSettings {
            request_timeout: self.request_timeout(),
            settle: Duration::from_millis(self.settle_ms),
            price_bounds: self.price_bounds,
            ..CrawlSettings::default()
        }
    }

    /// Browser settings with the CDP command timeout raised to cover a
    /// full navigation.
    pub fn browser_config(&self) -> BrowserEngineConfig {
        let mut browser = self.browser.clone();
        browser.command_timeout = browser.command_timeout.max(self.request_timeout_secs);
        browser
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::collections::HashMap;
    use std::io::Write;

    fn overrides(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.request_timeout(), Duration::from_secs(90));
        assert_eq!(settings.settle_ms, 2000);
        assert_eq!(settings.price_bounds, PriceBounds::default());
        assert!(settings.sites_file.is_none());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let settings = Settings::load(Some(Path::new("/nonexistent/pricecrawl.toml"))).unwrap();
        assert!(settings.source_path.is_none());
    }

    #[test]
    fn test_load_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pricecrawl.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
request_timeout_secs = 30
sites_file = "sites.toml"

[price_bounds]
min = 1
max = "500"

[browser]
headless = false
"#
        )
        .unwrap();

        let settings = Settings::load_from_path(&path).unwrap();
        assert_eq!(settings.request_timeout_secs, 30);
        assert_eq!(settings.settle_ms, 2000);
        assert_eq!(settings.price_bounds.min, Decimal::from(1));
        assert_eq!(settings.price_bounds.max, Decimal::from(500));
        assert!(!settings.browser.headless);
        assert_eq!(settings.sites_file, Some(dir.path().join("sites.toml")));
        assert_eq!(settings.source_path, Some(path));
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "request_timeout_secs = \"soon\"").unwrap();
        assert!(Settings::load_from_path(file.path()).is_err());
    }

    #[test]
    fn test_overrides() {
        let settings = Settings::default().apply_overrides(overrides(&[
            ("PRICECRAWL_TIMEOUT", "15"),
            ("PRICECRAWL_SETTLE_MS", " 250 "),
            ("PRICECRAWL_SITES_FILE", "/etc/pricecrawl/sites.toml"),
        ]));
        assert_eq!(settings.request_timeout_secs, 15);
        assert_eq!(settings.settle_ms, 250);
        assert_eq!(
            settings.sites_file,
            Some(PathBuf::from("/etc/pricecrawl/sites.toml"))
        );
    }

    #[test]
    fn test_invalid_overrides_ignored() {
        let settings = Settings::default().apply_overrides(overrides(&[
            ("PRICECRAWL_TIMEOUT", "ninety"),
            ("PRICECRAWL_SETTLE_MS", ""),
        ]));
        assert_eq!(settings.request_timeout_secs, 90);
        assert_eq!(settings.settle_ms, 2000);
    }

    #[test]
    fn test_crawl_settings() {
        let settings = Settings {
            settle_ms: 0,
            ..Settings::default()
        };
        let crawl = settings.crawl_settings();
        assert_eq!(crawl.settle, Duration::ZERO);
        assert_eq!(crawl.request_timeout, Duration::from_secs(90));
    }

    #[test]
    fn test_browser_timeout_covers_navigation() {
        let settings = Settings::default();
        assert_eq!(settings.browser_config().command_timeout, 90);
    }

    #[test]
    fn test_registry_from_settings() {
        let registry = Settings::default().load_registry().unwrap();
        assert!(registry.len() > 0);

        let missing = Settings {
            sites_file: Some(PathBuf::from("/nonexistent/sites.toml")),
            ..Settings::default()
        };
        assert!(missing.load_registry().is_err());
    }
}
