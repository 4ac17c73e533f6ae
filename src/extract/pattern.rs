//! Last-resort price scan over visible page text.
//!
//! Only `$`-prefixed amounts are recognized; other currency symbols in
//! page text are not matched.

use std::str::FromStr;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{PriceCandidate, PriceSource, Strategy};
use crate::browser::PageView;
use crate::money::round_to_cents;

/// `$1,299.00`, `$1,299`, `$49.99`, `$49`.
static DOLLAR_AMOUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$(\d{1,3}(?:,\d{3})*(?:\.\d{2})?)").unwrap());

/// Plausible range for a price found by scanning text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBounds {
    #[serde(default = "default_min")]
    pub min: Decimal,
    #[serde(default = "default_max")]
    pub max: Decimal,
}

fn default_min() -> Decimal {
    Decimal::from(5)
}

fn default_max() -> Decimal {
    Decimal::from(100_000)
}

impl Default for PriceBounds {
    fn default() -> Self {
        Self {
            min: default_min(),
            max: default_max(),
        }
    }
}

impl PriceBounds {
    /// Inclusive on both ends.
    pub fn contains(&self, amount: Decimal) -> bool {
        amount >= self.min && amount <= self.max
    }
}

/// Every `$` amount in `text`, in order of appearance.
pub fn scan_prices(text: &str) -> Vec<Decimal> {
    DOLLAR_AMOUNT
        .captures_iter(text)
        .filter_map(|caps| {
            let digits = caps[1].replace(',', "");
            Decimal::from_str(&digits).ok()
        })
        .collect()
}

/// First amount in `text` that falls inside `bounds`.
pub fn first_plausible_price(text: &str, bounds: &PriceBounds) -> Option<Decimal> {
    scan_prices(text)
        .into_iter()
        .find(|amount| bounds.contains(*amount))
        .map(round_to_cents)
}

/// Scans the rendered body text for a dollar amount.
pub struct PatternPrice {
    pub bounds: PriceBounds,
}

#[async_trait]
impl Strategy<PriceCandidate> for PatternPrice {
    fn name(&self) -> &str {
        "text pattern"
    }

    async fn attempt(&self, page: &dyn PageView) -> Option<PriceCandidate> {
        let text = match page.body_text().await {
            Ok(text) => text,
            Err(e) => {
                debug!("Could not read body text: {:#}", e);
                return None;
            }
        };

        first_plausible_price(&text, &self.bounds).map(|amount| PriceCandidate {
            amount,
            source: PriceSource::TextPattern,
            currency: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cents(value: i64) -> Decimal {
        Decimal::new(value, 2)
    }

    #[test]
    fn test_scan_finds_all_amounts_in_order() {
        let found = scan_prices("Was $1,299.00, now $999 with $2.50 shipping");
        assert_eq!(
            found,
            vec![cents(129900), cents(99900), cents(250)]
        );
    }

    #[test]
    fn test_scan_requires_dollar_sign() {
        assert!(scan_prices("EUR 49,99 or 49.99").is_empty());
    }

    #[test]
    fn test_first_plausible_skips_out_of_bounds() {
        let bounds = PriceBounds::default();
        let text = "Free shipping over $0.99. Save $3. Price $1,234,567.00 or $249.99 today";
        assert_eq!(first_plausible_price(text, &bounds), Some(cents(24999)));
    }

    #[test]
    fn test_bounds_are_inclusive() {
        let bounds = PriceBounds::default();
        assert_eq!(first_plausible_price("$5", &bounds), Some(cents(500)));
        assert_eq!(
            first_plausible_price("$100,000.00", &bounds),
            Some(cents(10_000_000))
        );
        assert_eq!(first_plausible_price("$100,000.01", &bounds), None);
    }

    #[test]
    fn test_custom_bounds() {
        let bounds = PriceBounds {
            min: Decimal::from(1),
            max: Decimal::from(10),
        };
        assert_eq!(
            first_plausible_price("$2.50 then $25", &bounds),
            Some(cents(250))
        );
    }

    #[test]
    fn test_bounds_deserialize_with_defaults() {
        let bounds: PriceBounds = toml::from_str("min = 1").unwrap();
        assert_eq!(bounds.min, Decimal::from(1));
        assert_eq!(bounds.max, Decimal::from(100_000));
    }
}
