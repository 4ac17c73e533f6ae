//! Shared fixtures for crawl pipeline tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use rust_decimal::Decimal;

use pricecrawl::browser::{
    AcquireError, Fingerprint, PageView, RenderContext, RenderEngine, StaticEngine, StaticPage,
};
use pricecrawl::crawler::{CrawlSettings, Crawler};
use pricecrawl::sites::{SiteCookie, SiteRegistry};

/// Small site table with one entry per behaviour under test.
pub const TEST_SITES: &str = r##"
[currencies]
"amazon.de" = "EUR"

[default]
price_selectors = ["[itemprop='price']", ".price"]
name_selectors = ["[itemprop='name']", "h1"]
image_selectors = ["[itemprop='image']"]

[sites."shop.example"]
price_selectors = [".price-now", ".price-was"]
name_selectors = ["h1.title"]
image_selectors = ["img.hero"]
cookies = [
    { name = "region", value = "us", domain = ".shop.example" },
]

[sites."fixed.example"]
price_selectors = [".price-now"]
currency = "GBP"

[sites."amazon.de"]
price_selectors = [".a-price .a-offscreen"]
name_selectors = ["#productTitle"]
scroll_offset = 500
"##;

pub fn registry() -> Arc<SiteRegistry> {
    Arc::new(SiteRegistry::from_toml(TEST_SITES).unwrap())
}

/// Pipeline settings with every wait removed.
pub fn settings() -> CrawlSettings {
    CrawlSettings {
        settle: Duration::ZERO,
        popup_pause: Duration::ZERO,
        scroll_pause: Duration::ZERO,
        ..CrawlSettings::default()
    }
}

pub fn crawler(engine: Arc<dyn RenderEngine>) -> Crawler {
    Crawler::new(engine, registry(), settings())
}

pub fn engine_with(pages: &[(&str, &str)]) -> Arc<StaticEngine> {
    let engine = pages
        .iter()
        .fold(StaticEngine::new(), |engine, (url, html)| {
            engine.with_page(url, *html)
        });
    Arc::new(engine)
}

pub fn cents(value: i64) -> Decimal {
    Decimal::new(value, 2)
}

/// Minimal product page with `body` inside `<body>`.
pub fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html><html><head><title>{}</title></head><body>{}</body></html>",
        title, body
    )
}

/// How a [`FaultyEngine`] misbehaves.
#[derive(Debug, Clone)]
pub enum Fault {
    /// `new_context` fails.
    Unavailable,
    /// Navigation exceeds its budget.
    Timeout,
    /// Navigation fails with this message.
    Navigation(String),
    /// Navigation never finishes.
    Hang,
    /// Navigation succeeds, then the page answers this many reads and
    /// fails every one after.
    PageLost { after_reads: usize },
}

/// Engine whose contexts fail in a chosen way, counting live contexts and
/// recording the navigation budget each one was given.
pub struct FaultyEngine {
    fault: Fault,
    active: Arc<AtomicUsize>,
    timeouts: Arc<Mutex<Vec<Duration>>>,
}

impl FaultyEngine {
    pub fn new(fault: Fault) -> Self {
        Self {
            fault,
            active: Arc::new(AtomicUsize::new(0)),
            timeouts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn timeouts(&self) -> Vec<Duration> {
        self.timeouts.lock().unwrap().clone()
    }
}

#[async_trait]
impl RenderEngine for FaultyEngine {
    async fn new_context(
        &self,
        _fingerprint: &Fingerprint,
        _cookies: &[SiteCookie],
    ) -> Result<Box<dyn RenderContext>, AcquireError> {
        if let Fault::Unavailable = self.fault {
            return Err(AcquireError::Unavailable("browser not started".to_string()));
        }
        self.active.fetch_add(1, Ordering::SeqCst);
        let page: Box<dyn PageView> = match self.fault {
            Fault::PageLost { after_reads } => Box::new(DyingPage {
                reads_left: AtomicUsize::new(after_reads),
            }),
            _ => Box::new(StaticPage::default()),
        };
        Ok(Box::new(FaultyContext {
            fault: self.fault.clone(),
            page,
            active: Arc::clone(&self.active),
            timeouts: Arc::clone(&self.timeouts),
        }))
    }

    fn active_contexts(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

struct FaultyContext {
    fault: Fault,
    page: Box<dyn PageView>,
    active: Arc<AtomicUsize>,
    timeouts: Arc<Mutex<Vec<Duration>>>,
}

#[async_trait]
impl RenderContext for FaultyContext {
    async fn navigate(&mut self, _url: &str, timeout: Duration) -> Result<(), AcquireError> {
        self.timeouts.lock().unwrap().push(timeout);
        match &self.fault {
            Fault::Timeout => Err(AcquireError::Timeout),
            Fault::Navigation(message) => Err(AcquireError::Navigation(message.clone())),
            Fault::Hang => {
                std::future::pending::<()>().await;
                Ok(())
            }
            Fault::Unavailable | Fault::PageLost { .. } => Ok(()),
        }
    }

    fn page(&self) -> &dyn PageView {
        self.page.as_ref()
    }

    async fn close(self: Box<Self>) {}
}

impl Drop for FaultyContext {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Blank page whose connection drops after a fixed number of reads.
struct DyingPage {
    reads_left: AtomicUsize,
}

impl DyingPage {
    fn read(&self) -> anyhow::Result<()> {
        let answered = self
            .reads_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match answered {
            Ok(_) => Ok(()),
            Err(_) => Err(anyhow!("connection closed")),
        }
    }
}

#[async_trait]
impl PageView for DyingPage {
    async fn url(&self) -> anyhow::Result<String> {
        self.read().map(|_| "about:blank".to_string())
    }

    async fn title(&self) -> anyhow::Result<String> {
        self.read().map(|_| String::new())
    }

    async fn body_text(&self) -> anyhow::Result<String> {
        self.read().map(|_| String::new())
    }

    async fn select_text(&self, _selector: &str) -> anyhow::Result<Option<String>> {
        self.read().map(|_| None)
    }

    async fn select_attribute(
        &self,
        _selector: &str,
        _name: &str,
    ) -> anyhow::Result<Option<String>> {
        self.read().map(|_| None)
    }

    async fn select_all_text(&self, _selector: &str) -> anyhow::Result<Vec<String>> {
        self.read().map(|_| Vec::new())
    }

    async fn click_if_visible(&self, _selector: &str) -> anyhow::Result<bool> {
        self.read().map(|_| false)
    }

    async fn scroll_to(&self, _y: i64) -> anyhow::Result<()> {
        self.read()
    }
}

/// Static engine that remembers what each context was opened with.
pub struct RecordingEngine {
    inner: StaticEngine,
    cookies: Mutex<Vec<Vec<SiteCookie>>>,
    user_agents: Mutex<Vec<String>>,
}

impl RecordingEngine {
    pub fn new(inner: StaticEngine) -> Self {
        Self {
            inner,
            cookies: Mutex::new(Vec::new()),
            user_agents: Mutex::new(Vec::new()),
        }
    }

    pub fn cookies(&self) -> Vec<Vec<SiteCookie>> {
        self.cookies.lock().unwrap().clone()
    }

    pub fn user_agents(&self) -> Vec<String> {
        self.user_agents.lock().unwrap().clone()
    }
}

#[async_trait]
impl RenderEngine for RecordingEngine {
    async fn new_context(
        &self,
        fingerprint: &Fingerprint,
        cookies: &[SiteCookie],
    ) -> Result<Box<dyn RenderContext>, AcquireError> {
        self.cookies.lock().unwrap().push(cookies.to_vec());
        self.user_agents
            .lock()
            .unwrap()
            .push(fingerprint.user_agent.clone());
        self.inner.new_context(fingerprint, cookies).await
    }

    fn active_contexts(&self) -> usize {
        self.inner.active_contexts()
    }
}

/// Single-page engine whose page records scroll and click calls. Clicking
/// [`FAILING_CLICK`] errors and clicking [`OPEN_POPUP`] reports a dismissal.
pub struct InstrumentedEngine {
    url: String,
    html: String,
    calls: Arc<Mutex<Vec<String>>>,
    active: Arc<AtomicUsize>,
}

/// Popup selector whose click fails.
pub const FAILING_CLICK: &str = "[aria-label='Close']";

/// Popup selector that finds something to close.
pub const OPEN_POPUP: &str = ".modal-close";

impl InstrumentedEngine {
    pub fn new(url: &str, html: impl Into<String>) -> Self {
        Self {
            url: url.to_string(),
            html: html.into(),
            calls: Arc::new(Mutex::new(Vec::new())),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RenderEngine for InstrumentedEngine {
    async fn new_context(
        &self,
        _fingerprint: &Fingerprint,
        _cookies: &[SiteCookie],
    ) -> Result<Box<dyn RenderContext>, AcquireError> {
        self.active.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(InstrumentedContext {
            page: InstrumentedPage {
                inner: StaticPage::new(self.url.clone(), self.html.clone()),
                calls: Arc::clone(&self.calls),
            },
            active: Arc::clone(&self.active),
        }))
    }

    fn active_contexts(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

struct InstrumentedContext {
    page: InstrumentedPage,
    active: Arc<AtomicUsize>,
}

#[async_trait]
impl RenderContext for InstrumentedContext {
    async fn navigate(&mut self, _url: &str, _timeout: Duration) -> Result<(), AcquireError> {
        Ok(())
    }

    fn page(&self) -> &dyn PageView {
        &self.page
    }

    async fn close(self: Box<Self>) {}
}

impl Drop for InstrumentedContext {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

struct InstrumentedPage {
    inner: StaticPage,
    calls: Arc<Mutex<Vec<String>>>,
}

impl InstrumentedPage {
    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl PageView for InstrumentedPage {
    async fn url(&self) -> anyhow::Result<String> {
        self.inner.url().await
    }

    async fn title(&self) -> anyhow::Result<String> {
        self.inner.title().await
    }

    async fn body_text(&self) -> anyhow::Result<String> {
        self.inner.body_text().await
    }

    async fn select_text(&self, selector: &str) -> anyhow::Result<Option<String>> {
        self.inner.select_text(selector).await
    }

    async fn select_attribute(&self, selector: &str, name: &str) -> anyhow::Result<Option<String>> {
        self.inner.select_attribute(selector, name).await
    }

    async fn select_all_text(&self, selector: &str) -> anyhow::Result<Vec<String>> {
        self.inner.select_all_text(selector).await
    }

    async fn click_if_visible(&self, selector: &str) -> anyhow::Result<bool> {
        self.record(format!("click {}", selector));
        if selector == FAILING_CLICK {
            Err(anyhow!("element detached"))
        } else {
            Ok(selector == OPEN_POPUP)
        }
    }

    async fn scroll_to(&self, y: i64) -> anyhow::Result<()> {
        self.record(format!("scroll {}", y));
        Ok(())
    }
}
