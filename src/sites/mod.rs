//! Per-storefront extraction hints.
//!
//! The selector data lives in a declarative TOML table (`config/sites.toml`,
//! bundled into the binary). This module only loads it and answers lookups;
//! lookups are exact after stripping a leading `www.`, and anything unknown
//! gets the shared default hints.

mod currency;

pub use currency::{is_currency_code, resolve_currency};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Site table compiled into the binary.
pub const BUNDLED_SITES: &str = include_str!("../../config/sites.toml");

/// Domain key reported by the default config.
pub const DEFAULT_DOMAIN: &str = "default";

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to read site table {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid site table: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Cookie placed on a browsing context before navigating to a site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default = "default_cookie_path")]
    pub path: String,
}

fn default_cookie_path() -> String {
    "/".to_string()
}

/// Extraction hints for one storefront.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Lookup key this config was registered under.
    #[serde(skip)]
    pub domain: String,
    #[serde(default)]
    pub price_selectors: Vec<String>,
    #[serde(default)]
    pub name_selectors: Vec<String>,
    #[serde(default)]
    pub image_selectors: Vec<String>,
    /// Fixed currency for every price on the site.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    /// Post-navigation settle time override, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settle_ms: Option<u64>,
    /// Scroll position to visit before extraction (lazy-loaded prices).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scroll_offset: Option<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cookies: Vec<SiteCookie>,
}

impl SiteConfig {
    /// Settle time for this site, falling back to `default` when unset.
    pub fn settle_time(&self, default: Duration) -> Duration {
        self.settle_ms.map(Duration::from_millis).unwrap_or(default)
    }
}

#[derive(Debug, Deserialize)]
struct SiteTable {
    #[serde(default)]
    currencies: HashMap<String, String>,
    default: SiteConfig,
    #[serde(default)]
    sites: HashMap<String, SiteConfig>,
}

/// Immutable domain -> [`SiteConfig`] lookup.
#[derive(Debug)]
pub struct SiteRegistry {
    sites: HashMap<String, SiteConfig>,
    default: SiteConfig,
    currencies: HashMap<String, String>,
}

impl SiteRegistry {
    /// Registry over the bundled site table.
    pub fn bundled() -> Result<Self, RegistryError> {
        Self::from_toml(BUNDLED_SITES)
    }

    /// Load a site table from disk.
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let content = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, RegistryError> {
        let table: SiteTable = toml::from_str(content)?;

        let mut default = table.default;
        default.domain = DEFAULT_DOMAIN.to_string();

        let sites = table
            .sites
            .into_iter()
            .map(|(domain, mut config)| {
                config.domain = domain.clone();
                (domain, config)
            })
            .collect();

        Ok(Self {
            sites,
            default,
            currencies: table.currencies,
        })
    }

    /// Hints for `domain`. A leading `www.` is ignored; no other
    /// normalization or wildcard matching happens.
    pub fn resolve(&self, domain: &str) -> &SiteConfig {
        let key = domain.strip_prefix("www.").unwrap_or(domain);
        self.sites.get(key).unwrap_or(&self.default)
    }

    /// The shared config returned for unknown domains.
    pub fn default_config(&self) -> &SiteConfig {
        &self.default
    }

    /// Currency implied by the domain alone (e.g. `amazon.de` -> `EUR`).
    pub fn known_currency(&self, domain: &str) -> Option<&str> {
        let key = domain.strip_prefix("www.").unwrap_or(domain);
        self.currencies.get(key).map(String::as_str)
    }

    /// Configured domains in sorted order.
    pub fn domains(&self) -> Vec<&str> {
        let mut domains: Vec<&str> = self.sites.keys().map(String::as_str).collect();
        domains.sort_unstable();
        domains
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }
}

/// Lookup key for a URL: its host with a leading `www.` removed.
pub fn domain_of(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    host.strip_prefix("www.").unwrap_or(host).to_string()
}
