//! Browser engine configuration types.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Browser engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrowserEngineConfig {
    /// Run in headless mode (default: true).
    /// Set to false for debugging or if headless detection is an issue.
    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Proxy server URL (e.g., "socks5://127.0.0.1:1080").
    #[serde(default)]
    pub proxy: Option<String>,

    /// Chrome executable. Common install locations and PATH are searched
    /// when unset.
    #[serde(default)]
    pub executable: Option<PathBuf>,

    /// Additional Chrome arguments.
    #[serde(default)]
    pub chrome_args: Vec<String>,

    /// Remote Chrome DevTools URL (e.g., "ws://localhost:9222").
    /// If set, connects to existing browser instead of launching one.
    #[serde(default)]
    pub remote_url: Option<String>,

    /// Per-command CDP timeout in seconds; also bounds context setup.
    #[serde(default = "default_command_timeout")]
    pub command_timeout: u64,

    /// Budget in seconds for each page read after navigation (title,
    /// selectors, clicks).
    #[serde(default = "default_script_timeout")]
    pub script_timeout: u64,
}

pub fn default_headless() -> bool {
    true
}

pub fn default_command_timeout() -> u64 {
    30
}

pub fn default_script_timeout() -> u64 {
    5
}

impl Default for BrowserEngineConfig {
    fn default() -> Self {
        Self {
            headless: default_headless(),
            proxy: None,
            executable: None,
            chrome_args: Vec::new(),
            remote_url: None,
            command_timeout: default_command_timeout(),
            script_timeout: default_script_timeout(),
        }
    }
}

impl BrowserEngineConfig {
    /// Apply environment overrides.
    ///
    /// - `BROWSER_URL` - remote DevTools endpoint
    /// - `SOCKS_PROXY` - proxy server for browser traffic
    /// - `CHROME_PATH` - Chrome executable
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("BROWSER_URL") {
            if !url.trim().is_empty() {
                self.remote_url = Some(url.trim().to_string());
            }
        }
        if let Ok(proxy) = std::env::var("SOCKS_PROXY") {
            if !proxy.trim().is_empty() {
                self.proxy = Some(proxy.trim().to_string());
            }
        }
        if let Ok(path) = std::env::var("CHROME_PATH") {
            if !path.trim().is_empty() {
                self.executable = Some(PathBuf::from(path.trim()));
            }
        }
        self
    }

    pub fn script_budget(&self) -> Duration {
        Duration::from_secs(self.script_timeout)
    }
}
