//! Crawl orchestration: one URL in, one [`ExtractionOutcome`] out.
//!
//! Each crawl walks `Init -> Acquired -> BlockChecked -> Extracted -> Done`
//! on its own browsing context, opened from a shared [`RenderEngine`] and
//! closed on every exit path. No retries happen here.

mod outcome;

pub use outcome::{
    CrawlError, CrawlRequest, ExtractionOutcome, FailureKind, ProductSnapshot, NO_PRICE_REASON,
    TIMEOUT_REASON, UNKNOWN_PRODUCT,
};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use url::Url;

use crate::browser::{Fingerprint, PageView, RenderContext, RenderEngine};
use crate::detect::{detect_block, is_available};
use crate::extract::{extract_product, PriceBounds};
use crate::money::MoneyAmount;
use crate::sites::{domain_of, resolve_currency, SiteConfig, SiteRegistry};

/// Overlay close buttons tried before extraction.
pub const POPUP_SELECTORS: &[&str] = &[
    "[aria-label='Close']",
    ".modal-close",
    ".popup-close",
    "button.close",
    "[data-testid='close-button']",
    ".newsletter-close",
];

/// Timing and plausibility knobs for the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlSettings {
    /// Navigation budget when the request doesn't set one.
    pub request_timeout: Duration,
    /// Post-navigation wait when the site doesn't override it.
    pub settle: Duration,
    pub price_bounds: PriceBounds,
    /// Pause after each dismissed popup.
    pub popup_pause: Duration,
    /// Pause after a configured scroll nudge.
    pub scroll_pause: Duration,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(90),
            settle: Duration::from_millis(2000),
            price_bounds: PriceBounds::default(),
            popup_pause: Duration::from_millis(500),
            scroll_pause: Duration::from_millis(1000),
        }
    }
}

/// Extraction pipeline over a shared rendering engine.
///
/// Cheap to share behind an `Arc`; concurrent calls to [`Crawler::crawl`]
/// each get an independent browsing context.
pub struct Crawler {
    engine: Arc<dyn RenderEngine>,
    registry: Arc<SiteRegistry>,
    settings: CrawlSettings,
    fingerprint: Fingerprint,
}

/// A page that stops answering after navigation means the adapter went away.
fn page_lost(err: anyhow::Error) -> CrawlError {
    CrawlError::AdapterUnavailable(format!("page stopped responding: {:#}", err))
}

impl Crawler {
    pub fn new(
        engine: Arc<dyn RenderEngine>,
        registry: Arc<SiteRegistry>,
        settings: CrawlSettings,
    ) -> Self {
        Self {
            engine,
            registry,
            settings,
            fingerprint: Fingerprint::default(),
        }
    }

    pub fn with_fingerprint(mut self, fingerprint: Fingerprint) -> Self {
        self.fingerprint = fingerprint;
        self
    }

    pub fn settings(&self) -> &CrawlSettings {
        &self.settings
    }

    pub fn registry(&self) -> &SiteRegistry {
        &self.registry
    }

    /// Crawl one page. Never fails: every problem is reported as a
    /// `Blocked` or `Failed` outcome.
    pub async fn crawl(&self, request: CrawlRequest) -> ExtractionOutcome {
        info!("Crawling {}", request.url);
        match self.run(&request).await {
            Ok(product) => {
                info!(
                    "Crawl successful: {} -> {} ({:?})",
                    request.url, product.price, product.price_source
                );
                ExtractionOutcome::Success(product)
            }
            Err(e) => {
                warn!("Crawl of {} ended without a price: {}", request.url, e);
                e.into()
            }
        }
    }

    /// Crawl until `cancel` resolves. A cancelled crawl drops its
    /// context (which disposes it) and reports `Failed(Cancelled)`.
    pub async fn crawl_until<F>(&self, request: CrawlRequest, cancel: F) -> ExtractionOutcome
    where
        F: Future<Output = ()>,
    {
        let url = request.url.clone();
        tokio::select! {
            outcome = self.crawl(request) => outcome,
            _ = cancel => {
                warn!("Crawl of {} cancelled", url);
                CrawlError::Cancelled.into()
            }
        }
    }

    async fn run(&self, request: &CrawlRequest) -> Result<ProductSnapshot, CrawlError> {
        // Init
        let url = Url::parse(&request.url)
            .map_err(|e| CrawlError::NavigationError(format!("invalid URL {}: {}", request.url, e)))?;
        let domain = domain_of(&url);
        let site = self.registry.resolve(&domain);
        debug!("Using site config {:?} for {}", site.domain, domain);

        let mut context = self
            .engine
            .new_context(&self.fingerprint, &site.cookies)
            .await?;

        let result = self
            .drive(context.as_mut(), request, &url, &domain, site)
            .await;
        context.close().await;
        result
    }

    async fn drive(
        &self,
        context: &mut dyn RenderContext,
        request: &CrawlRequest,
        url: &Url,
        domain: &str,
        site: &SiteConfig,
    ) -> Result<ProductSnapshot, CrawlError> {
        // Init -> Acquired
        let timeout = request.timeout.unwrap_or(self.settings.request_timeout);
        context.navigate(url.as_str(), timeout).await?;
        let page = context.page();

        // Acquired -> BlockChecked
        let title = page.title().await.map_err(page_lost)?;
        let text = page.body_text().await.map_err(page_lost)?;
        if let Some(verdict) = detect_block(&title, &text) {
            warn!(
                "Bot detection triggered on {} (title {:?}, phrase {:?})",
                request.url, title, verdict.phrase
            );
            return Err(CrawlError::BotBlocked {
                domain: domain.to_string(),
                phrase: verdict.phrase.to_string(),
            });
        }

        // BlockChecked -> Extracted
        tokio::time::sleep(site.settle_time(self.settings.settle)).await;
        if let Some(offset) = site.scroll_offset {
            if let Err(e) = page.scroll_to(offset).await {
                debug!("Scroll failed: {:#}", e);
            }
            tokio::time::sleep(self.settings.scroll_pause).await;
        }
        self.dismiss_popups(page).await;

        let extraction = extract_product(page, site, self.settings.price_bounds).await;

        // Extracted -> Done
        let Some(price) = extraction.price else {
            // Strategies read a dead page as empty; only a live one lacks a price.
            page.url().await.map_err(page_lost)?;
            return Err(CrawlError::NoPriceFound);
        };
        let text = page.body_text().await.map_err(page_lost)?;
        let currency = resolve_currency(
            site.currency.as_deref(),
            self.registry.known_currency(domain),
            price.currency.as_deref(),
        );

        Ok(ProductSnapshot {
            url: request.url.clone(),
            domain: domain.to_string(),
            name: extraction
                .name
                .unwrap_or_else(|| UNKNOWN_PRODUCT.to_string()),
            price: MoneyAmount::new(price.amount, currency),
            image_url: extraction.image_url,
            is_available: is_available(&text),
            price_source: price.source,
        })
    }

    async fn dismiss_popups(&self, page: &dyn PageView) {
        for selector in POPUP_SELECTORS {
            match page.click_if_visible(selector).await {
                Ok(true) => {
                    debug!("Dismissed popup {}", selector);
                    tokio::time::sleep(self.settings.popup_pause).await;
                }
                Ok(false) => {}
                Err(e) => debug!("Popup check {} failed: {:#}", selector, e),
            }
        }
    }
}
