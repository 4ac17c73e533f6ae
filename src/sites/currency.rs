//! Currency resolution for extracted prices.

use crate::money::DEFAULT_CURRENCY;

/// Three ASCII letters, the shape of an ISO 4217 code.
pub fn is_currency_code(code: &str) -> bool {
    code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic())
}

/// Pick the currency for a price.
///
/// Precedence: the site's fixed currency, then the known-domain table, then
/// a `priceCurrency` the page declared in structured data, then USD.
pub fn resolve_currency(
    fixed: Option<&str>,
    known: Option<&str>,
    declared: Option<&str>,
) -> String {
    fixed
        .or(known)
        .or(declared.filter(|code| is_currency_code(code)))
        .map(str::to_ascii_uppercase)
        .unwrap_or_else(|| DEFAULT_CURRENCY.to_string())
}
