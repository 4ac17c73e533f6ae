//! Out-of-stock detection from rendered page text.

/// Phrases that mean the product can't currently be bought.
pub const OUT_OF_STOCK_PHRASES: &[&str] = &[
    "out of stock",
    "sold out",
    "currently unavailable",
    "not available",
    "notify me when available",
];

/// First out-of-stock phrase found in `body_text`, case-insensitively.
pub fn out_of_stock_phrase(body_text: &str) -> Option<&'static str> {
    let text = body_text.to_lowercase();
    OUT_OF_STOCK_PHRASES
        .iter()
        .copied()
        .find(|phrase| text.contains(phrase))
}

/// A product is available unless the page says otherwise.
pub fn is_available(body_text: &str) -> bool {
    out_of_stock_phrase(body_text).is_none()
}
