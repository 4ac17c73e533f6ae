//! Freeform price text to exact monetary amounts.
//!
//! Storefronts render prices in whatever shape their locale and template
//! produce: `$1,299.00`, `USD 49.99`, `1.234,56 €`. Everything here works in
//! `rust_decimal` so cents survive untouched; binary floats never appear.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Currency assumed when nothing on the page or in config says otherwise.
pub const DEFAULT_CURRENCY: &str = "USD";

/// A non-negative amount with exactly two fractional digits, tagged with an
/// ISO 4217 currency code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoneyAmount {
    pub amount: Decimal,
    pub currency: String,
}

impl MoneyAmount {
    pub fn new(amount: Decimal, currency: impl Into<String>) -> Self {
        Self {
            amount: round_to_cents(amount.abs()),
            currency: currency.into(),
        }
    }

    pub fn usd(amount: Decimal) -> Self {
        Self::new(amount, DEFAULT_CURRENCY)
    }
}

impl fmt::Display for MoneyAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount, self.currency)
    }
}

/// Round to two decimal places (half-to-even) and pin the scale at 2, so
/// `99` becomes `99.00`.
pub fn round_to_cents(value: Decimal) -> Decimal {
    let mut rounded = value.round_dp(2);
    rounded.rescale(2);
    rounded
}

/// Parse price text into an exact amount.
///
/// Returns `None` for text with no digits ("Free", "") or text that still
/// isn't a number after separator cleanup ("1.2.3").
pub fn parse_price(text: &str) -> Option<Decimal> {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
        .collect();

    if cleaned.is_empty() {
        return None;
    }

    let normalized = normalize_separators(&cleaned);
    let value = Decimal::from_str(&normalized).ok()?;
    Some(round_to_cents(value))
}

/// Decide which of `,` and `.` is the decimal separator and rewrite the
/// string so that only `.` remains, as the decimal point.
fn normalize_separators(cleaned: &str) -> String {
    let last_comma = cleaned.rfind(',');
    let last_period = cleaned.rfind('.');
    let two_digit_tail = |comma: usize| cleaned.len() - comma - 1 == 2;

    match (last_comma, last_period) {
        // "1.234,56": periods group thousands, the trailing comma marks cents.
        (Some(comma), Some(period)) if comma > period && two_digit_tail(comma) => {
            cleaned.replace('.', "").replace(',', ".")
        }
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        (Some(comma), None) if two_digit_tail(comma) => cleaned.replace(',', "."),
        (Some(_), None) => cleaned.replace(',', ""),
        _ => cleaned.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cents(value: i64) -> Decimal {
        Decimal::new(value, 2)
    }

    #[test]
    fn test_parse_us_formats() {
        assert_eq!(parse_price("$99.99"), Some(cents(9999)));
        assert_eq!(parse_price("$1,299.00"), Some(cents(129900)));
        assert_eq!(parse_price("USD 49.99"), Some(cents(4999)));
        assert_eq!(parse_price("99.99"), Some(cents(9999)));
        assert_eq!(parse_price("$0.00"), Some(cents(0)));
    }

    #[test]
    fn test_parse_whole_amount_gets_two_decimals() {
        let value = parse_price("$99").unwrap();
        assert_eq!(value, cents(9900));
        assert_eq!(value.to_string(), "99.00");
    }

    #[test]
    fn test_parse_without_digits() {
        assert_eq!(parse_price(""), None);
        assert_eq!(parse_price("Free"), None);
        assert_eq!(parse_price("$"), None);
    }

    #[test]
    fn test_comma_decimal_separator() {
        assert_eq!(parse_price("1.234,56"), Some(cents(123456)));
        assert_eq!(parse_price("49,99 €"), Some(cents(4999)));
    }

    #[test]
    fn test_comma_thousands_separator() {
        assert_eq!(parse_price("1,234"), Some(cents(123400)));
        assert_eq!(parse_price("$12,345,678"), Some(cents(1234567800)));
    }

    #[test]
    fn test_unparseable_after_cleanup() {
        assert_eq!(parse_price("1.2.3"), None);
        assert_eq!(parse_price("1,23,45"), None);
    }

    #[test]
    fn test_rounding_is_exact() {
        // 0.125 and 0.135 straddle a binary-float pitfall; half-to-even on
        // exact decimals gives 0.12 and 0.14.
        assert_eq!(parse_price("0.125"), Some(cents(12)));
        assert_eq!(parse_price("0.135"), Some(cents(14)));
        assert_eq!(parse_price("19.999"), Some(cents(2000)));
    }

    #[test]
    fn test_money_amount_display() {
        let money = MoneyAmount::usd(Decimal::new(5, 0));
        assert_eq!(money.to_string(), "5.00 USD");
        assert_eq!(MoneyAmount::new(cents(-150), "EUR").amount, cents(150));
    }
}
