//! JSON-LD product metadata.
//!
//! Blocks may hold a single object, an array of objects, or an `@graph`
//! container. Malformed blocks are skipped.

use std::str::FromStr;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::debug;

use super::{PriceCandidate, PriceSource, Strategy};
use crate::browser::PageView;
use crate::money::{parse_price, round_to_cents};

pub const JSON_LD_SELECTOR: &str = "script[type='application/ld+json']";

const PRODUCT_TYPE: &str = "Product";

/// What the page's structured data says about the product.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StructuredProduct {
    pub name: Option<String>,
    pub price: Option<Decimal>,
    /// `priceCurrency` of the offer the price came from.
    pub currency: Option<String>,
}

/// Parse raw block contents, dropping any that aren't valid JSON.
pub fn parse_blocks<S: AsRef<str>>(blocks: &[S]) -> Vec<Value> {
    blocks
        .iter()
        .filter_map(|block| match serde_json::from_str(block.as_ref().trim()) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!("Skipping malformed JSON-LD block: {}", e);
                None
            }
        })
        .collect()
}

fn is_product(value: &Value) -> bool {
    match value.get("@type") {
        Some(Value::String(s)) => s == PRODUCT_TYPE,
        Some(Value::Array(types)) => types.iter().any(|t| t == PRODUCT_TYPE),
        _ => false,
    }
}

fn collect_products<'a>(value: &'a Value, out: &mut Vec<&'a Value>) {
    match value {
        Value::Array(items) => items.iter().for_each(|item| collect_products(item, out)),
        Value::Object(obj) => {
            if is_product(value) {
                out.push(value);
            }
            if let Some(graph) = obj.get("@graph") {
                collect_products(graph, out);
            }
        }
        _ => {}
    }
}

/// Product nodes across all blocks, in document order.
pub fn find_products(values: &[Value]) -> Vec<&Value> {
    let mut products = Vec::new();
    for value in values {
        collect_products(value, &mut products);
    }
    products
}

fn decimal_from_json(value: &Value) -> Option<Decimal> {
    let amount = match value {
        Value::Number(n) => {
            let text = n.to_string();
            Decimal::from_str(&text)
                .or_else(|_| Decimal::from_scientific(&text))
                .ok()
                .map(round_to_cents)
        }
        Value::String(s) => parse_price(s),
        _ => None,
    }?;
    // A zero price is a placeholder, not an offer.
    (!amount.is_zero() && amount.is_sign_positive()).then_some(amount)
}

/// Price of a product node: the offer's `price`, else its `lowPrice`.
/// `offers` may be an object or an array, in which case the first offer
/// is used.
pub fn product_price(product: &Value) -> Option<(Decimal, Option<String>)> {
    let offer = match product.get("offers")? {
        Value::Array(offers) => offers.first()?,
        offer => offer,
    };

    let price = offer
        .get("price")
        .and_then(decimal_from_json)
        .or_else(|| offer.get("lowPrice").and_then(decimal_from_json))?;

    let currency = offer
        .get("priceCurrency")
        .and_then(Value::as_str)
        .map(|c| c.trim().to_string());

    Some((price, currency))
}

pub fn product_name(product: &Value) -> Option<String> {
    product
        .get("name")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

/// Read a [`StructuredProduct`] out of raw JSON-LD blocks.
///
/// Price, currency and name come from the first product node carrying a
/// usable price. The first named node supplies the name only when that
/// node has none, or when no node is priced.
pub fn extract_structured<S: AsRef<str>>(blocks: &[S]) -> StructuredProduct {
    let values = parse_blocks(blocks);
    let products = find_products(&values);
    let first_named = || products.iter().find_map(|p| product_name(p));

    match products
        .iter()
        .find_map(|p| product_price(p).map(|priced| (p, priced)))
    {
        Some((product, (price, currency))) => StructuredProduct {
            name: product_name(product).or_else(first_named),
            price: Some(price),
            currency,
        },
        None => StructuredProduct {
            name: first_named(),
            price: None,
            currency: None,
        },
    }
}

/// Read and interpret the page's JSON-LD blocks.
pub async fn read_structured(page: &dyn PageView) -> StructuredProduct {
    match page.select_all_text(JSON_LD_SELECTOR).await {
        Ok(blocks) => extract_structured(&blocks),
        Err(e) => {
            debug!("Could not read JSON-LD blocks: {:#}", e);
            StructuredProduct::default()
        }
    }
}

/// Price from the first product offer in structured data.
pub struct StructuredPrice;

#[async_trait]
impl Strategy<PriceCandidate> for StructuredPrice {
    fn name(&self) -> &str {
        "structured-data price"
    }

    async fn attempt(&self, page: &dyn PageView) -> Option<PriceCandidate> {
        let product = read_structured(page).await;
        product.price.map(|amount| PriceCandidate {
            amount,
            source: PriceSource::StructuredData,
            currency: product.currency,
        })
    }
}

/// Product name from structured data.
pub struct StructuredName;

#[async_trait]
impl Strategy<String> for StructuredName {
    fn name(&self) -> &str {
        "structured-data name"
    }

    async fn attempt(&self, page: &dyn PageView) -> Option<String> {
        read_structured(page).await.name
    }
}
