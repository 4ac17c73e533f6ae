//! Saved-HTML rendering engine.
//!
//! Serves pre-rendered snapshots through the same page contract the
//! Chromium engine implements. Nothing executes: clicks never happen and
//! scrolling is a no-op.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use scraper::{ElementRef, Html, Node, Selector};

use super::{AcquireError, Fingerprint, PageView, RenderContext, RenderEngine};
use crate::sites::SiteCookie;

/// Elements whose text never renders.
const INVISIBLE_ELEMENTS: &[&str] = &["script", "style", "noscript", "template", "head"];

fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| anyhow!("invalid selector {:?}: {}", selector, e))
}

fn collect_visible_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                out.push_str(text);
                out.push(' ');
            }
            Node::Element(el) if INVISIBLE_ELEMENTS.contains(&el.name()) => {}
            Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(child) {
                    collect_visible_text(child, out);
                }
            }
            _ => {}
        }
    }
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// One HTML document at a known URL.
#[derive(Debug, Clone, Default)]
pub struct StaticPage {
    url: String,
    html: String,
}

impl StaticPage {
    pub fn new(url: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            html: html.into(),
        }
    }

    /// Load a saved page from disk, attributing it to `url`.
    pub fn from_file(url: impl Into<String>, path: &Path) -> Result<Self> {
        let html = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(Self::new(url, html))
    }

    pub fn html(&self) -> &str {
        &self.html
    }

    fn document(&self) -> Html {
        Html::parse_document(&self.html)
    }

    fn first_text(&self, selector: &str) -> Result<Option<String>> {
        let selector = parse_selector(selector)?;
        let document = self.document();
        Ok(document
            .select(&selector)
            .next()
            .map(|el| normalize_whitespace(&el.text().collect::<String>())))
    }

    fn first_attribute(&self, selector: &str, name: &str) -> Result<Option<String>> {
        let selector = parse_selector(selector)?;
        let document = self.document();
        Ok(document
            .select(&selector)
            .next()
            .and_then(|el| el.value().attr(name))
            .map(str::to_string))
    }

    fn all_text(&self, selector: &str) -> Result<Vec<String>> {
        let selector = parse_selector(selector)?;
        let document = self.document();
        Ok(document
            .select(&selector)
            .map(|el| el.text().collect::<String>())
            .collect())
    }

    fn visible_text(&self) -> Result<String> {
        let selector = parse_selector("body")?;
        let document = self.document();
        let mut out = String::new();
        if let Some(body) = document.select(&selector).next() {
            collect_visible_text(body, &mut out);
        }
        Ok(normalize_whitespace(&out))
    }
}

#[async_trait]
impl PageView for StaticPage {
    async fn url(&self) -> Result<String> {
        Ok(self.url.clone())
    }

    async fn title(&self) -> Result<String> {
        Ok(self.first_text("title")?.unwrap_or_default())
    }

    async fn body_text(&self) -> Result<String> {
        self.visible_text()
    }

    async fn select_text(&self, selector: &str) -> Result<Option<String>> {
        self.first_text(selector)
    }

    async fn select_attribute(&self, selector: &str, name: &str) -> Result<Option<String>> {
        self.first_attribute(selector, name)
    }

    async fn select_all_text(&self, selector: &str) -> Result<Vec<String>> {
        self.all_text(selector)
    }

    async fn click_if_visible(&self, selector: &str) -> Result<bool> {
        parse_selector(selector)?;
        Ok(false)
    }

    async fn scroll_to(&self, _y: i64) -> Result<()> {
        Ok(())
    }
}

fn snapshot_key(url: &str) -> String {
    url::Url::parse(url)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| url.to_string())
}

/// Engine over an in-memory set of URL -> HTML snapshots.
#[derive(Debug, Default)]
pub struct StaticEngine {
    pages: Arc<HashMap<String, String>>,
    active: Arc<AtomicUsize>,
}

impl StaticEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine serving exactly one page.
    pub fn single(page: StaticPage) -> Self {
        Self::new().with_page(page.url, page.html)
    }

    pub fn with_page(mut self, url: impl AsRef<str>, html: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.pages).insert(snapshot_key(url.as_ref()), html.into());
        self
    }
}

#[async_trait]
impl RenderEngine for StaticEngine {
    async fn new_context(
        &self,
        _fingerprint: &Fingerprint,
        cookies: &[SiteCookie],
    ) -> Result<Box<dyn RenderContext>, AcquireError> {
        self.active.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(StaticContext {
            pages: Arc::clone(&self.pages),
            page: StaticPage::default(),
            cookies: cookies.to_vec(),
            active: Arc::clone(&self.active),
        }))
    }

    fn active_contexts(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

/// Context handed out by [`StaticEngine`].
#[derive(Debug)]
pub struct StaticContext {
    pages: Arc<HashMap<String, String>>,
    page: StaticPage,
    cookies: Vec<SiteCookie>,
    active: Arc<AtomicUsize>,
}

impl StaticContext {
    /// Cookies the context was opened with.
    pub fn cookies(&self) -> &[SiteCookie] {
        &self.cookies
    }
}

#[async_trait]
impl RenderContext for StaticContext {
    async fn navigate(&mut self, url: &str, _timeout: Duration) -> Result<(), AcquireError> {
        let html = self
            .pages
            .get(&snapshot_key(url))
            .ok_or_else(|| AcquireError::Navigation(format!("no snapshot for {}", url)))?;
        self.page = StaticPage::new(url, html.clone());
        Ok(())
    }

    fn page(&self) -> &dyn PageView {
        &self.page
    }

    async fn close(self: Box<Self>) {}
}

impl Drop for StaticContext {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}
