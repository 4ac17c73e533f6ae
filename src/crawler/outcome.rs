//! Crawl inputs, outcomes, and the failure taxonomy.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::browser::AcquireError;
use crate::extract::PriceSource;
use crate::money::MoneyAmount;

/// Reason reported when navigation exceeds its budget.
pub const TIMEOUT_REASON: &str = "timeout";

/// Reason reported when no strategy produced a price.
pub const NO_PRICE_REASON: &str = "no price found";

/// Name reported when a price was found but no name was.
pub const UNKNOWN_PRODUCT: &str = "Unknown Product";

/// One page to crawl.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlRequest {
    pub url: String,
    /// Navigation budget; the crawler's configured timeout when unset.
    pub timeout: Option<Duration>,
}

impl CrawlRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Facts extracted from a product page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    pub url: String,
    pub domain: String,
    pub name: String,
    pub price: MoneyAmount,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub is_available: bool,
    pub price_source: PriceSource,
}

/// Classification of a failed crawl.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    NavigationTimeout,
    NavigationError,
    NoPriceFound,
    AdapterUnavailable,
    Cancelled,
}

/// Terminal result of one crawl. Exactly one variant, always.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExtractionOutcome {
    Success(ProductSnapshot),
    Blocked { reason: String },
    Failed { kind: FailureKind, reason: String },
}

impl ExtractionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    pub fn product(&self) -> Option<&ProductSnapshot> {
        match self {
            Self::Success(product) => Some(product),
            _ => None,
        }
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Failed { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Human-readable reason for a non-success outcome.
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Success(_) => None,
            Self::Blocked { reason } | Self::Failed { reason, .. } => Some(reason),
        }
    }
}

/// Everything that can end a crawl early.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CrawlError {
    #[error("timeout")]
    NavigationTimeout,
    #[error("{0}")]
    NavigationError(String),
    #[error("Access blocked by {domain} (page mentions \"{phrase}\")")]
    BotBlocked { domain: String, phrase: String },
    #[error("no price found")]
    NoPriceFound,
    #[error("{0}")]
    AdapterUnavailable(String),
    #[error("cancelled")]
    Cancelled,
}

impl CrawlError {
    pub fn kind(&self) -> Option<FailureKind> {
        match self {
            Self::NavigationTimeout => Some(FailureKind::NavigationTimeout),
            Self::NavigationError(_) => Some(FailureKind::NavigationError),
            Self::BotBlocked { .. } => None,
            Self::NoPriceFound => Some(FailureKind::NoPriceFound),
            Self::AdapterUnavailable(_) => Some(FailureKind::AdapterUnavailable),
            Self::Cancelled => Some(FailureKind::Cancelled),
        }
    }
}

impl From<AcquireError> for CrawlError {
    fn from(err: AcquireError) -> Self {
        match err {
            AcquireError::Timeout => Self::NavigationTimeout,
            AcquireError::Navigation(msg) => Self::NavigationError(msg),
            AcquireError::Unavailable(msg) => Self::AdapterUnavailable(msg),
        }
    }
}

impl From<CrawlError> for ExtractionOutcome {
    fn from(err: CrawlError) -> Self {
        let reason = err.to_string();
        match err.kind() {
            Some(kind) => Self::Failed { kind, reason },
            None => Self::Blocked { reason },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_timeout_reason() {
        let outcome = ExtractionOutcome::from(CrawlError::from(AcquireError::Timeout));
        assert_eq!(
            outcome,
            ExtractionOutcome::Failed {
                kind: FailureKind::NavigationTimeout,
                reason: "timeout".to_string(),
            }
        );
    }

    #[test]
    fn test_navigation_error_keeps_text() {
        let err = CrawlError::from(AcquireError::Navigation("net::ERR_NAME_NOT_RESOLVED".into()));
        let outcome = ExtractionOutcome::from(err);
        assert_eq!(outcome.failure_kind(), Some(FailureKind::NavigationError));
        assert_eq!(outcome.reason(), Some("net::ERR_NAME_NOT_RESOLVED"));
    }

    #[test]
    fn test_block_becomes_blocked_variant() {
        let outcome = ExtractionOutcome::from(CrawlError::BotBlocked {
            domain: "walmart.com".into(),
            phrase: "robot or human".into(),
        });
        assert!(outcome.is_blocked());
        assert!(outcome.reason().unwrap().contains("walmart.com"));
        assert_eq!(outcome.failure_kind(), None);
    }

    #[test]
    fn test_every_error_maps_to_one_variant() {
        let errors = [
            CrawlError::NavigationTimeout,
            CrawlError::NavigationError("x".into()),
            CrawlError::BotBlocked {
                domain: "d".into(),
                phrase: "captcha".into(),
            },
            CrawlError::NoPriceFound,
            CrawlError::AdapterUnavailable("gone".into()),
            CrawlError::Cancelled,
        ];
        for err in errors {
            let outcome = ExtractionOutcome::from(err);
            let populated = [outcome.is_success(), outcome.is_blocked(), outcome.is_failed()];
            assert_eq!(populated.iter().filter(|p| **p).count(), 1);
        }
    }

    #[test]
    fn test_no_price_reason() {
        let outcome = ExtractionOutcome::from(CrawlError::NoPriceFound);
        assert_eq!(outcome.reason(), Some("no price found"));
    }

    #[test]
    fn test_serialized_shape() {
        let outcome = ExtractionOutcome::Success(ProductSnapshot {
            url: "https://shop.example/p".into(),
            domain: "shop.example".into(),
            name: "Widget".into(),
            price: MoneyAmount::usd(Decimal::new(4999, 2)),
            image_url: None,
            is_available: true,
            price_source: PriceSource::StructuredData,
        });
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["price"]["currency"], "USD");
        assert_eq!(json["price_source"], "structured_data");
        assert!(json.get("image_url").is_none());

        let failed = serde_json::to_value(ExtractionOutcome::from(CrawlError::NoPriceFound)).unwrap();
        assert_eq!(failed["status"], "failed");
        assert_eq!(failed["kind"], "no_price_found");
    }

    #[test]
    fn test_request_builder() {
        let request = CrawlRequest::new("https://shop.example/p").with_timeout(Duration::from_secs(5));
        assert_eq!(request.timeout, Some(Duration::from_secs(5)));
    }
}
