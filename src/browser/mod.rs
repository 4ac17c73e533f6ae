//! Page acquisition: the rendering-engine contract the crawler runs against.
//!
//! A [`RenderEngine`] is started once and shared. Each crawl asks it for a
//! fresh [`RenderContext`] (its own cookie jar and fingerprint), navigates,
//! reads the page through [`PageView`], and closes the context.
//!
//! Two engines ship here: [`ChromiumEngine`] drives a real headless Chrome
//! over CDP (feature `browser`), and [`StaticEngine`] serves saved HTML for
//! offline extraction and tests.

mod config;
mod fingerprint;
mod static_page;

#[cfg(feature = "browser")]
mod chromium;

pub use config::BrowserEngineConfig;
pub use fingerprint::{Fingerprint, Geolocation, Viewport, STEALTH_SCRIPTS};
pub use static_page::{StaticContext, StaticEngine, StaticPage};

#[cfg(feature = "browser")]
pub use chromium::{ChromiumContext, ChromiumEngine};

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

use crate::sites::SiteCookie;

/// Failures of the rendering engine itself, as opposed to extraction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AcquireError {
    #[error("navigation timed out")]
    Timeout,
    #[error("{0}")]
    Navigation(String),
    #[error("rendering engine unavailable: {0}")]
    Unavailable(String),
}

/// Read access to a rendered page.
///
/// Selector methods take CSS selectors and look at the first match only.
#[async_trait]
pub trait PageView: Send + Sync {
    /// Current page URL (after redirects).
    async fn url(&self) -> Result<String>;

    async fn title(&self) -> Result<String>;

    /// Visible text of `<body>`; script and style contents excluded.
    async fn body_text(&self) -> Result<String>;

    /// Text content of the first element matching `selector`.
    async fn select_text(&self, selector: &str) -> Result<Option<String>>;

    /// Attribute `name` of the first element matching `selector`.
    async fn select_attribute(&self, selector: &str, name: &str) -> Result<Option<String>>;

    /// Text content of every element matching `selector`, in document order.
    async fn select_all_text(&self, selector: &str) -> Result<Vec<String>>;

    /// Click the first element matching `selector` if it is visible.
    /// Returns whether a click happened.
    async fn click_if_visible(&self, selector: &str) -> Result<bool>;

    /// Scroll the viewport to vertical offset `y`.
    async fn scroll_to(&self, y: i64) -> Result<()>;
}

/// One isolated browsing context with a single page.
#[async_trait]
pub trait RenderContext: Send + Sync {
    /// Navigate and wait (bounded by `timeout`) for the network to go quiet.
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), AcquireError>;

    fn page(&self) -> &dyn PageView;

    /// Dispose the context. Implementations must also release on drop, so
    /// an abandoned crawl doesn't leak browser state.
    async fn close(self: Box<Self>);
}

/// A started rendering engine shared across concurrent crawls.
#[async_trait]
pub trait RenderEngine: Send + Sync {
    /// Open a fresh context shaped by `fingerprint`, with `cookies` set
    /// before any navigation.
    async fn new_context(
        &self,
        fingerprint: &Fingerprint,
        cookies: &[SiteCookie],
    ) -> Result<Box<dyn RenderContext>, AcquireError>;

    /// Number of contexts opened and not yet disposed.
    fn active_contexts(&self) -> usize;
}
