//! pricecrawl - price extraction for JavaScript-rendered storefronts.
//!
//! Given a product page URL, [`crawler::Crawler`] renders it on a shared
//! browser engine, checks for bot walls, and runs a fallback cascade
//! (site selectors, JSON-LD, text scan) to pull out an exact price, name,
//! image and stock status.

pub mod browser;
pub mod cli;
pub mod config;
pub mod crawler;
pub mod detect;
pub mod extract;
pub mod money;
pub mod sites;

pub use crawler::{CrawlRequest, Crawler, ExtractionOutcome};
pub use money::{parse_price, MoneyAmount};
pub use sites::{SiteConfig, SiteRegistry};
