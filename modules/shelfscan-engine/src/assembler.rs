//! Assembler: resolves an ExtractionContext into a validated Product.
//!
//! One structured-output call per product: the candidate bag plus the
//! pre-filtered category list go to the resolution service, which returns a
//! ProductDraft. The draft is validated against the schema and the taxonomy;
//! a validation failure is retried exactly once with the error appended to
//! the request. A second failure degrades to a partial record when the two
//! required fields (name, price) survive, and skips the record otherwise.
//! Unbounded retry is deliberately absent — it would mask systematic
//! request-construction defects.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::warn;

use ai_client::OpenAi;
use shelfscan_common::{
    Category, ExtractionContext, Merchant, Offer, Price, Product, ResolverConfig, ShelfScanError,
    Taxonomy, Variant, MAX_VARIANTS,
};

const SYSTEM_PROMPT: &str = r#"You are a product data assembler. You will be given structured signals extracted from a product page and a numbered list of plausible taxonomy categories.

Your job is to produce a single, coherent product draft.

Rules:
- name: choose the most accurate and complete title from title_candidates.
- description: choose or lightly combine the best description from description_candidates.
- brand: choose the most credible brand from brand_candidates. If brand_candidates is empty or unhelpful, infer the brand from other signals (description, title, page URL domain, or breadcrumbs). For a retailer's own private-label products, the retailer name is the brand.
- price: copy the best price string from price_candidates. Use currency_candidates for the currency code (e.g. "USD", "GBP"). If a sale price and an original price are both present, set compare_at_price to the higher value.
- category_index: the 1-based POSITION of the best category in the numbered candidate list. Return the number, never the category text.
- image_urls: use only URLs from image_url_candidates. Do NOT invent or modify URLs.
- key_features: a concise list of bullet-point features from key_feature_candidates or the description. Empty list is acceptable.
- colors: list ALL available color options from color_candidates and option groups. Include hex codes, colorway names, and swatch names. Exclude entries that are product titles or variant names. Deduplicate similar colors. Empty list only if no color signals exist.
- variants: if option groups are present (in option_groups or raw_attributes), build variant entries as the cartesian product over dimensions. Each variant needs a human-readable name (e.g. "Red / M") and an attributes map (e.g. {"color": "Red", "size": "M"}). Cap variants at 50. If no option groups exist, return an empty list.
- merchant: the selling merchant's name when the page makes it clear, otherwise null."#;

/// What the resolution service returns for one product.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProductDraft {
    pub name: String,
    pub description: String,
    pub brand: String,
    /// 1-based position in the numbered category candidate list. The index
    /// protocol removes the paraphrase-mismatch failure mode of free-text
    /// category strings.
    pub category_index: u32,
    pub price: String,
    pub currency: String,
    pub compare_at_price: Option<String>,
    pub merchant: Option<String>,
    pub key_features: Vec<String>,
    pub image_urls: Vec<String>,
    pub colors: Vec<String>,
    pub variants: Vec<DraftVariant>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DraftVariant {
    pub name: String,
    pub attributes: BTreeMap<String, String>,
    pub price: Option<String>,
    pub availability: Option<String>,
}

/// The seam between the assembler and the resolution service; stub this for
/// deterministic tests.
#[async_trait]
pub trait DraftResolver: Send + Sync {
    async fn resolve(&self, system_prompt: &str, user_prompt: &str) -> Result<ProductDraft>;
}

/// Resolver backed by an OpenAI-compatible structured-output endpoint.
///
/// A fresh client handle is constructed inside every call. Handles are never
/// cached across independently-scheduled tasks; a client pinned to one
/// concurrent scope is invalid when reused from another.
pub struct RemoteResolver {
    config: ResolverConfig,
}

impl RemoteResolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl DraftResolver for RemoteResolver {
    async fn resolve(&self, system_prompt: &str, user_prompt: &str) -> Result<ProductDraft> {
        let mut agent = OpenAi::new(&self.config.api_key, &self.config.model);
        if let Some(ref url) = self.config.base_url {
            agent = agent.with_base_url(url);
        }
        agent.extract(system_prompt, user_prompt).await
    }
}

pub struct Assembler<R> {
    resolver: R,
    taxonomy: Arc<Taxonomy>,
}

impl<R: DraftResolver> Assembler<R> {
    pub fn new(resolver: R, taxonomy: Arc<Taxonomy>) -> Self {
        Self { resolver, taxonomy }
    }

    /// Resolve the candidate bag and pre-filtered categories into one
    /// validated Product.
    pub async fn assemble(
        &self,
        context: &ExtractionContext,
        category_candidates: &[String],
    ) -> Result<Product, ShelfScanError> {
        let user_prompt = build_user_prompt(context, category_candidates, None);
        let draft = self
            .resolver
            .resolve(SYSTEM_PROMPT, &user_prompt)
            .await
            .map_err(|e| ShelfScanError::Resolution(e.to_string()))?;

        let first_error = match validate_draft(&draft, context, category_candidates, &self.taxonomy)
        {
            Ok(product) => return Ok(product),
            Err(error) => error,
        };

        warn!(error = %first_error, "Draft failed validation, retrying once with error context");
        let retry_prompt = build_user_prompt(context, category_candidates, Some(&first_error));
        let retry_draft = self
            .resolver
            .resolve(SYSTEM_PROMPT, &retry_prompt)
            .await
            .map_err(|e| ShelfScanError::Resolution(e.to_string()))?;

        match validate_draft(&retry_draft, context, category_candidates, &self.taxonomy) {
            Ok(product) => Ok(product),
            Err(second_error) => {
                warn!(error = %second_error, "Draft failed validation after retry");
                match salvage_partial(&retry_draft, category_candidates, &self.taxonomy) {
                    Some(product) => {
                        warn!(
                            name = %product.name,
                            "Degrading to partial record with empty derived collections"
                        );
                        Ok(product)
                    }
                    None => Err(ShelfScanError::Validation(format!(
                        "required fields missing after retry: {second_error}"
                    ))),
                }
            }
        }
    }
}

/// Serialize the context and number the category candidates. A prior
/// validation error, when present, is appended so the model can self-correct.
pub fn build_user_prompt(
    context: &ExtractionContext,
    category_candidates: &[String],
    validation_error: Option<&str>,
) -> String {
    let numbered = category_candidates
        .iter()
        .enumerate()
        .map(|(i, category)| format!("{}. {}", i + 1, category))
        .collect::<Vec<_>>()
        .join("\n");

    let signals =
        serde_json::to_string_pretty(context).unwrap_or_else(|_| "{}".to_string());

    let mut prompt = format!(
        "## Category candidates (return the number of exactly one)\n\n{numbered}\n\n## Extraction signals (JSON)\n\n{signals}\n"
    );

    if let Some(error) = validation_error {
        prompt.push_str(&format!(
            "\n## Validation error from previous attempt — fix this\n\n{error}\n"
        ));
    }

    prompt
}

/// Validate a draft against the schema and the taxonomy constraint.
pub(crate) fn validate_draft(
    draft: &ProductDraft,
    context: &ExtractionContext,
    category_candidates: &[String],
    taxonomy: &Taxonomy,
) -> Result<Product, String> {
    let name = draft.name.trim();
    if name.is_empty() {
        return Err("name is required and was empty".to_string());
    }

    let price = Price::parse(
        &draft.price,
        &draft.currency,
        draft.compare_at_price.as_deref(),
    )
    .map_err(|e| e.to_string())?;

    let category = resolve_category_index(draft.category_index, category_candidates, taxonomy)?;

    let image_urls = keep_known_images(&draft.image_urls, context);
    let variants = build_variants(&draft.variants, &price.currency);
    let offers = build_offer(draft, &price, context);

    Ok(Product {
        name: name.to_string(),
        brand: draft.brand.trim().to_string(),
        description: draft.description.trim().to_string(),
        key_features: draft.key_features.clone(),
        price,
        category,
        image_urls,
        colors: draft.colors.clone(),
        variants,
        offers,
        canonical_product_id: None,
        match_decision: None,
    })
}

/// Map the draft's 1-based index back to the taxonomy string.
fn resolve_category_index(
    index: u32,
    category_candidates: &[String],
    taxonomy: &Taxonomy,
) -> Result<Category, String> {
    if index == 0 || index as usize > category_candidates.len() {
        return Err(format!(
            "category_index {index} is outside the candidate list (1..={})",
            category_candidates.len()
        ));
    }
    let label = &category_candidates[index as usize - 1];
    Category::resolve(label, taxonomy).map_err(|e| e.to_string())
}

/// Unknown URLs are dropped, not fatal: the draft may only echo canonical
/// candidate URLs.
fn keep_known_images(draft_urls: &[String], context: &ExtractionContext) -> Vec<String> {
    let known: HashSet<&str> = context
        .image_url_candidates
        .iter()
        .map(|c| c.value.as_str())
        .collect();

    let mut kept = Vec::new();
    for url in draft_urls {
        let url = url.trim();
        if url.is_empty() {
            continue;
        }
        if !known.contains(url) {
            warn!(url, "Dropping image URL not among extracted candidates");
            continue;
        }
        if !kept.iter().any(|k: &String| k == url) {
            kept.push(url.to_string());
        }
    }
    kept
}

fn build_variants(draft_variants: &[DraftVariant], currency: &str) -> Vec<Variant> {
    let mut variants: Vec<Variant> = draft_variants
        .iter()
        .filter(|v| !v.name.trim().is_empty())
        .map(|v| Variant {
            name: v.name.trim().to_string(),
            attributes: v.attributes.clone(),
            price: v
                .price
                .as_deref()
                .and_then(|p| Price::parse(p, currency, None).ok()),
            availability: v.availability.clone(),
        })
        .collect();

    if variants.len() > MAX_VARIANTS {
        warn!(
            count = variants.len(),
            cap = MAX_VARIANTS,
            "Variant cap exceeded, truncating"
        );
        variants.truncate(MAX_VARIANTS);
    }
    variants
}

/// One offer for the source page, when the draft names a merchant.
fn build_offer(draft: &ProductDraft, price: &Price, context: &ExtractionContext) -> Vec<Offer> {
    let Some(merchant) = draft
        .merchant
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
    else {
        return Vec::new();
    };

    let availability = context
        .raw_attributes
        .get("dom_availability")
        .and_then(|v| v.as_str())
        .map(str::to_string);

    vec![Offer {
        merchant: Merchant {
            name: merchant.to_string(),
            merchant_id: None,
        },
        price: price.clone(),
        availability,
        shipping: None,
        promo: None,
        source_url: context.page_url.clone(),
    }]
}

/// After a failed retry: keep the record only if the two required fields
/// survive, with every derived collection empty.
fn salvage_partial(
    draft: &ProductDraft,
    category_candidates: &[String],
    taxonomy: &Taxonomy,
) -> Option<Product> {
    let name = draft.name.trim();
    if name.is_empty() {
        return None;
    }
    let price = Price::parse(
        &draft.price,
        &draft.currency,
        draft.compare_at_price.as_deref(),
    )
    .ok()?;

    let category = resolve_category_index(draft.category_index, category_candidates, taxonomy)
        .ok()
        .or_else(|| {
            category_candidates
                .iter()
                .find(|label| taxonomy.contains(label))
                .map(|label| Category {
                    name: label.clone(),
                })
        })?;

    Some(Product {
        name: name.to_string(),
        brand: draft.brand.trim().to_string(),
        description: draft.description.trim().to_string(),
        key_features: Vec::new(),
        price,
        category,
        image_urls: Vec::new(),
        colors: Vec::new(),
        variants: Vec::new(),
        offers: Vec::new(),
        canonical_product_id: None,
        match_decision: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use shelfscan_common::{CandidateField, SignalSource};

    fn taxonomy() -> Arc<Taxonomy> {
        Arc::new(Taxonomy::from_lines([
            "Apparel & Accessories > Shoes",
            "Hardware > Tools > Drills",
        ]))
    }

    fn draft() -> ProductDraft {
        ProductDraft {
            name: "Air Force 1 '07".to_string(),
            description: "A classic shoe.".to_string(),
            brand: "Nike".to_string(),
            category_index: 1,
            price: "129.00".to_string(),
            currency: "USD".to_string(),
            compare_at_price: None,
            merchant: None,
            key_features: vec![],
            image_urls: vec![],
            colors: vec![],
            variants: vec![],
        }
    }

    fn candidates() -> Vec<String> {
        vec!["Apparel & Accessories > Shoes".to_string()]
    }

    #[test]
    fn test_validate_resolves_category_by_index() {
        let product =
            validate_draft(&draft(), &ExtractionContext::new(None), &candidates(), &taxonomy())
                .unwrap();
        assert_eq!(product.category.name, "Apparel & Accessories > Shoes");
        assert_eq!(product.price.price, 129.0);
    }

    #[test]
    fn test_validate_rejects_out_of_range_index() {
        let mut bad = draft();
        bad.category_index = 5;
        let error =
            validate_draft(&bad, &ExtractionContext::new(None), &candidates(), &taxonomy())
                .unwrap_err();
        assert!(error.contains("category_index"));

        bad.category_index = 0;
        assert!(validate_draft(
            &bad,
            &ExtractionContext::new(None),
            &candidates(),
            &taxonomy()
        )
        .is_err());
    }

    #[test]
    fn test_validate_rejects_candidate_outside_taxonomy() {
        // Fallback candidates may name a segment the vocabulary doesn't hold.
        let error = validate_draft(
            &draft(),
            &ExtractionContext::new(None),
            &["Apparel & Accessories".to_string()],
            &taxonomy(),
        )
        .unwrap_err();
        assert!(error.contains("not a member"));
    }

    #[test]
    fn test_validate_drops_unknown_image_urls() {
        let mut ctx = ExtractionContext::new(None);
        ctx.add_candidates(
            CandidateField::ImageUrl,
            SignalSource::LinkedData,
            ["https://cdn.example.com/a.jpg".to_string()],
        );
        let mut d = draft();
        d.image_urls = vec![
            "https://cdn.example.com/a.jpg".to_string(),
            "https://cdn.example.com/invented.jpg".to_string(),
        ];

        let product = validate_draft(&d, &ctx, &candidates(), &taxonomy()).unwrap();
        assert_eq!(product.image_urls, vec!["https://cdn.example.com/a.jpg"]);
    }

    #[test]
    fn test_variant_cap_is_enforced() {
        let mut d = draft();
        d.variants = (0..60)
            .map(|i| DraftVariant {
                name: format!("Size {i}"),
                attributes: BTreeMap::from([("size".to_string(), i.to_string())]),
                price: None,
                availability: None,
            })
            .collect();

        let product =
            validate_draft(&d, &ExtractionContext::new(None), &candidates(), &taxonomy()).unwrap();
        assert_eq!(product.variants.len(), MAX_VARIANTS);
    }

    #[test]
    fn test_offer_built_when_merchant_known() {
        let mut ctx = ExtractionContext::new(Some("https://shop.example.com/p/1".to_string()));
        ctx.add_raw_attribute("dom_availability", serde_json::json!("InStock"));
        let mut d = draft();
        d.merchant = Some("Example Shop".to_string());

        let product = validate_draft(&d, &ctx, &candidates(), &taxonomy()).unwrap();
        assert_eq!(product.offers.len(), 1);
        let offer = &product.offers[0];
        assert_eq!(offer.merchant.name, "Example Shop");
        assert_eq!(offer.availability.as_deref(), Some("InStock"));
        assert_eq!(offer.source_url.as_deref(), Some("https://shop.example.com/p/1"));
    }

    // --- retry behavior ---

    struct FlakyResolver {
        calls: AtomicUsize,
        first: ProductDraft,
        second: ProductDraft,
    }

    #[async_trait]
    impl DraftResolver for FlakyResolver {
        async fn resolve(&self, _system: &str, user_prompt: &str) -> Result<ProductDraft> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call == 0 {
                Ok(self.first.clone())
            } else {
                // The retry prompt must carry the validation error.
                assert!(user_prompt.contains("Validation error from previous attempt"));
                Ok(self.second.clone())
            }
        }
    }

    #[tokio::test]
    async fn test_retries_exactly_once_on_validation_failure() {
        let mut invalid = draft();
        invalid.category_index = 99;
        let resolver = FlakyResolver {
            calls: AtomicUsize::new(0),
            first: invalid,
            second: draft(),
        };
        let assembler = Assembler::new(resolver, taxonomy());

        let product = assembler
            .assemble(&ExtractionContext::new(None), &candidates())
            .await
            .unwrap();
        assert_eq!(product.name, "Air Force 1 '07");
        assert_eq!(assembler.resolver.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_second_failure_degrades_to_partial_record() {
        // Invalid category both times, but name and price are present.
        let mut invalid = draft();
        invalid.category_index = 99;
        invalid.key_features = vec!["feature".to_string()];
        let resolver = FlakyResolver {
            calls: AtomicUsize::new(0),
            first: invalid.clone(),
            second: invalid,
        };
        let assembler = Assembler::new(resolver, taxonomy());

        let product = assembler
            .assemble(&ExtractionContext::new(None), &candidates())
            .await
            .unwrap();
        // Partial record: required fields kept, derived collections empty.
        assert_eq!(product.name, "Air Force 1 '07");
        assert!(product.key_features.is_empty());
        assert_eq!(product.category.name, "Apparel & Accessories > Shoes");
        assert_eq!(assembler.resolver.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_second_failure_without_required_fields_skips_record() {
        let mut invalid = draft();
        invalid.name = String::new();
        let resolver = FlakyResolver {
            calls: AtomicUsize::new(0),
            first: invalid.clone(),
            second: invalid,
        };
        let assembler = Assembler::new(resolver, taxonomy());

        let result = assembler
            .assemble(&ExtractionContext::new(None), &candidates())
            .await;
        assert!(matches!(result, Err(ShelfScanError::Validation(_))));
        assert_eq!(assembler.resolver.calls.load(Ordering::SeqCst), 2);
    }
}
