use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ShelfScanError;
use crate::taxonomy::Taxonomy;

// --- Category ---

/// A category label from the product taxonomy.
///
/// Invariant: `name` is always a member of the taxonomy vocabulary. Use
/// [`Category::resolve`] when constructing from untrusted input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Category {
    pub name: String,
}

impl Category {
    /// Validate `name` against the taxonomy and construct a Category.
    pub fn resolve(name: &str, taxonomy: &Taxonomy) -> Result<Self, ShelfScanError> {
        let name = name.trim();
        if !taxonomy.contains(name) {
            return Err(ShelfScanError::Taxonomy(format!(
                "'{name}' is not a member of the taxonomy vocabulary"
            )));
        }
        Ok(Self {
            name: name.to_string(),
        })
    }
}

// --- Price ---

/// First run of digits with embedded separators. Non-breaking and narrow
/// non-breaking spaces show up as group separators in scraped price text.
static AMOUNT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d[\d.,]*(?:[ \u{00a0}\u{202f}]\d[\d.,]*)*").unwrap());

/// Three-letter ISO currency code.
static CURRENCY_CODE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[A-Z]{3}").unwrap());

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Price {
    pub price: f64,
    pub currency: String,
    /// Original price when the product is on sale.
    pub compare_at_price: Option<f64>,
}

impl Price {
    /// Parse a price from heterogeneous string representations.
    ///
    /// Tolerates currency symbols, ISO codes, thousands separators, and
    /// non-breaking whitespace: the first numeric token is extracted rather
    /// than trusting upstream formatting. The currency is resolved from a
    /// three-letter code in either argument, falling back to symbol lookup.
    pub fn parse(
        price_text: &str,
        currency_text: &str,
        compare_at_text: Option<&str>,
    ) -> Result<Self, ShelfScanError> {
        let price = parse_amount(price_text).ok_or_else(|| {
            ShelfScanError::Validation(format!("no numeric price in '{price_text}'"))
        })?;
        let currency = resolve_currency(currency_text)
            .or_else(|| resolve_currency(price_text))
            .ok_or_else(|| {
                ShelfScanError::Validation(format!(
                    "no recognizable currency in '{currency_text}' or '{price_text}'"
                ))
            })?;
        let compare_at_price = compare_at_text.and_then(parse_amount).filter(|c| *c > price);
        Ok(Self {
            price,
            currency,
            compare_at_price,
        })
    }
}

/// Extract the first numeric token from `text` and normalize separators.
pub fn parse_amount(text: &str) -> Option<f64> {
    let token = AMOUNT_RE.find(text)?.as_str();
    let cleaned: String = token
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{00a0}' && *c != '\u{202f}')
        .collect();
    let cleaned = cleaned.trim_end_matches(['.', ',']);

    let last_dot = cleaned.rfind('.');
    let last_comma = cleaned.rfind(',');
    let normalized = match (last_dot, last_comma) {
        // Both separators present: the later one is the decimal point.
        (Some(d), Some(c)) => {
            let decimal = if d > c { '.' } else { ',' };
            let mut out = String::with_capacity(cleaned.len());
            for ch in cleaned.chars() {
                if ch == decimal {
                    out.push('.');
                } else if ch != '.' && ch != ',' {
                    out.push(ch);
                }
            }
            out
        }
        // Comma only: decimal when it leaves 1-2 trailing digits, else grouping.
        (None, Some(c)) => {
            let trailing = cleaned.len() - c - 1;
            if cleaned.matches(',').count() == 1 && (1..=2).contains(&trailing) {
                cleaned.replacen(',', ".", 1)
            } else {
                cleaned.replace(',', "")
            }
        }
        // Dot only: keep the last as decimal, treat the rest as grouping.
        (Some(_), None) => {
            if cleaned.matches('.').count() > 1 {
                let (head, tail) = cleaned.rsplit_once('.').unwrap();
                format!("{}.{}", head.replace('.', ""), tail)
            } else {
                cleaned.to_string()
            }
        }
        (None, None) => cleaned.to_string(),
    };

    normalized.parse().ok()
}

fn resolve_currency(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if let Some(code) = CURRENCY_CODE_RE.find(trimmed) {
        return Some(code.as_str().to_string());
    }
    for ch in trimmed.chars() {
        let code = match ch {
            '$' => "USD",
            '£' => "GBP",
            '€' => "EUR",
            '¥' => "JPY",
            '₹' => "INR",
            _ => continue,
        };
        return Some(code.to_string());
    }
    None
}

// --- Variants and offers ---

pub const MAX_VARIANTS: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Variant {
    /// Human-readable name, e.g. "Red / M".
    pub name: String,
    /// Dimension -> value, e.g. {"color": "Red", "size": "M"}.
    pub attributes: BTreeMap<String, String>,
    pub price: Option<Price>,
    pub availability: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Merchant {
    pub name: String,
    pub merchant_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Offer {
    pub merchant: Merchant,
    pub price: Price,
    pub availability: Option<String>,
    pub shipping: Option<String>,
    pub promo: Option<String>,
    pub source_url: Option<String>,
}

// --- Match decisions ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MatchEvidence {
    /// Which signal produced this evidence, e.g. "gtin_exact_match".
    pub signal: String,
    pub score: f64,
    pub matched: bool,
    pub details: BTreeMap<String, serde_json::Value>,
}

/// Why a product was or wasn't merged with its best candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MatchDecision {
    pub candidate_product_id: Option<String>,
    pub matched: bool,
    pub confidence: f64,
    pub threshold: f64,
    pub evidence: Vec<MatchEvidence>,
}

// --- Product ---

/// The canonical resolved product record.
///
/// `name` and `price` are required; `canonical_product_id` and
/// `match_decision` are assigned by the identity resolver during the batch
/// pass, after assembly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Product {
    pub name: String,
    pub brand: String,
    pub description: String,
    pub key_features: Vec<String>,
    pub price: Price,
    pub category: Category,
    pub image_urls: Vec<String>,
    pub colors: Vec<String>,
    pub variants: Vec<Variant>,
    pub offers: Vec<Offer>,
    #[serde(default)]
    pub canonical_product_id: Option<String>,
    #[serde(default)]
    pub match_decision: Option<MatchDecision>,
}
