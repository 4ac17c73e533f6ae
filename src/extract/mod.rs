//! Product field extraction from a rendered page.
//!
//! Each field is resolved by a [`Cascade`]: an ordered list of strategies
//! tried one at a time until one produces a value.
//!
//! - price: site selectors, then structured data, then a text scan
//! - name: site selectors, then structured data
//! - image: site selectors only

pub mod pattern;
pub mod structured;

pub use pattern::{first_plausible_price, scan_prices, PatternPrice, PriceBounds};
pub use structured::{extract_structured, StructuredName, StructuredPrice, StructuredProduct};

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::browser::PageView;
use crate::money::parse_price;
use crate::sites::SiteConfig;

/// One way of obtaining a value from a page.
#[async_trait]
pub trait Strategy<T: Send>: Send + Sync {
    /// Label used in logs.
    fn name(&self) -> &str;

    /// Try to produce a value. Page errors count as "nothing found".
    async fn attempt(&self, page: &dyn PageView) -> Option<T>;
}

/// Ordered strategies; the first success wins.
pub struct Cascade<T: Send> {
    strategies: Vec<Box<dyn Strategy<T>>>,
}

impl<T: Send> Default for Cascade<T> {
    fn default() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }
}

impl<T: Send> Cascade<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, strategy: impl Strategy<T> + 'static) -> Self {
        self.strategies.push(Box::new(strategy));
        self
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Run strategies in order, strictly one after another.
    pub async fn run(&self, page: &dyn PageView) -> Option<T> {
        for strategy in &self.strategies {
            if let Some(value) = strategy.attempt(page).await {
                debug!("{} succeeded", strategy.name());
                return Some(value);
            }
            debug!("{} found nothing", strategy.name());
        }
        None
    }
}

/// Where a price came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    Selector,
    StructuredData,
    TextPattern,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PriceCandidate {
    pub amount: Decimal,
    pub source: PriceSource,
    /// Currency declared alongside the price, if the source carries one.
    pub currency: Option<String>,
}

/// Price from the site's selectors, in order.
pub struct SelectorPrice {
    pub selectors: Vec<String>,
}

#[async_trait]
impl Strategy<PriceCandidate> for SelectorPrice {
    fn name(&self) -> &str {
        "selector price"
    }

    async fn attempt(&self, page: &dyn PageView) -> Option<PriceCandidate> {
        for selector in &self.selectors {
            let text = match page.select_text(selector).await {
                Ok(Some(text)) if !text.trim().is_empty() => text,
                Ok(_) => continue,
                Err(e) => {
                    debug!("Selector {:?} failed: {:#}", selector, e);
                    continue;
                }
            };
            // The first element with text decides; an unparseable or zero
            // price there hands over to the next strategy.
            return parse_price(&text)
                .filter(|amount| !amount.is_zero())
                .map(|amount| PriceCandidate {
                    amount,
                    source: PriceSource::Selector,
                    currency: None,
                });
        }
        None
    }
}

/// Product name from the site's selectors.
pub struct SelectorText {
    pub selectors: Vec<String>,
}

#[async_trait]
impl Strategy<String> for SelectorText {
    fn name(&self) -> &str {
        "selector text"
    }

    async fn attempt(&self, page: &dyn PageView) -> Option<String> {
        for selector in &self.selectors {
            match page.select_text(selector).await {
                Ok(Some(text)) if !text.trim().is_empty() => return Some(text.trim().to_string()),
                Ok(_) => {}
                Err(e) => debug!("Selector {:?} failed: {:#}", selector, e),
            }
        }
        None
    }
}

/// Resolve an image `src` against the page URL. Handles absolute,
/// protocol-relative (`//cdn...`) and path-relative sources.
pub fn absolutize(src: &str, page_url: &str) -> Option<String> {
    let src = src.trim();
    if src.is_empty() {
        return None;
    }
    match Url::parse(page_url) {
        Ok(base) => base.join(src).ok().map(String::from),
        Err(_) => Url::parse(src).ok().map(String::from),
    }
}

/// Image URL from the site's selectors (`src` attribute).
pub struct SelectorImage {
    pub selectors: Vec<String>,
}

#[async_trait]
impl Strategy<String> for SelectorImage {
    fn name(&self) -> &str {
        "selector image"
    }

    async fn attempt(&self, page: &dyn PageView) -> Option<String> {
        let page_url = page.url().await.unwrap_or_default();
        for selector in &self.selectors {
            match page.select_attribute(selector, "src").await {
                Ok(Some(src)) => {
                    if let Some(url) = absolutize(&src, &page_url) {
                        return Some(url);
                    }
                }
                Ok(None) => {}
                Err(e) => debug!("Selector {:?} failed: {:#}", selector, e),
            }
        }
        None
    }
}

pub fn price_cascade(site: &SiteConfig, bounds: PriceBounds) -> Cascade<PriceCandidate> {
    Cascade::new()
        .then(SelectorPrice {
            selectors: site.price_selectors.clone(),
        })
        .then(StructuredPrice)
        .then(PatternPrice { bounds })
}

pub fn name_cascade(site: &SiteConfig) -> Cascade<String> {
    Cascade::new()
        .then(SelectorText {
            selectors: site.name_selectors.clone(),
        })
        .then(StructuredName)
}

pub fn image_cascade(site: &SiteConfig) -> Cascade<String> {
    Cascade::new().then(SelectorImage {
        selectors: site.image_selectors.clone(),
    })
}

/// Everything the cascades found on one page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductExtraction {
    pub price: Option<PriceCandidate>,
    pub name: Option<String>,
    pub image_url: Option<String>,
}

/// Run the price, name and image cascades in sequence.
pub async fn extract_product(
    page: &dyn PageView,
    site: &SiteConfig,
    bounds: PriceBounds,
) -> ProductExtraction {
    let price = price_cascade(site, bounds).run(page).await;
    let name = name_cascade(site).run(page).await;
    let image_url = image_cascade(site).run(page).await;

    ProductExtraction {
        price,
        name,
        image_url,
    }
}
