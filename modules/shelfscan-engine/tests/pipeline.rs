//! End-to-end pipeline tests with a deterministic stub resolver.
//!
//! The stub parses the serialized extraction context back out of the request
//! and assembles a draft from the first candidate per field, so the whole
//! pipeline (extraction, pre-filter, assembly, validation) runs without a
//! network and produces byte-stable output.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use shelfscan_common::{ExtractionContext, Taxonomy};
use shelfscan_engine::assembler::{DraftResolver, DraftVariant, ProductDraft};
use shelfscan_engine::{extract_page, Pipeline};

struct StubResolver;

fn parse_context(user_prompt: &str) -> ExtractionContext {
    let marker = "## Extraction signals (JSON)\n\n";
    let start = user_prompt.find(marker).expect("signals section") + marker.len();
    let json = user_prompt[start..]
        .split("\n## Validation")
        .next()
        .unwrap()
        .trim();
    serde_json::from_str(json).expect("context roundtrip")
}

fn first_value(candidates: &[shelfscan_common::Candidate]) -> Option<String> {
    candidates.first().map(|c| c.value.clone())
}

fn stub_variants(context: &ExtractionContext) -> Vec<DraftVariant> {
    // Prefer the structured passthrough, mirroring what the real resolver is
    // prompted to do.
    if let Some(raw) = context.raw_attributes.get("variants").and_then(|v| v.as_str()) {
        if let Ok(serde_json::Value::Array(items)) = serde_json::from_str(raw) {
            return items
                .iter()
                .filter_map(|item| item.as_object())
                .map(|object| {
                    let attributes: BTreeMap<String, String> = object
                        .iter()
                        .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                        .collect();
                    DraftVariant {
                        name: attributes
                            .values()
                            .cloned()
                            .collect::<Vec<_>>()
                            .join(" / "),
                        attributes,
                        price: None,
                        availability: None,
                    }
                })
                .collect();
        }
    }

    let Some(group) = context.option_groups.first() else {
        return Vec::new();
    };
    group
        .options
        .iter()
        .map(|option| DraftVariant {
            name: option.value.clone(),
            attributes: BTreeMap::from([(
                group.dimension.to_lowercase(),
                option.value.clone(),
            )]),
            price: None,
            availability: None,
        })
        .collect()
}

#[async_trait]
impl DraftResolver for StubResolver {
    async fn resolve(&self, _system_prompt: &str, user_prompt: &str) -> Result<ProductDraft> {
        let context = parse_context(user_prompt);
        let name =
            first_value(&context.title_candidates).unwrap_or_else(|| "Unknown Product".into());
        Ok(ProductDraft {
            description: first_value(&context.description_candidates).unwrap_or_else(|| name.clone()),
            brand: first_value(&context.brand_candidates).unwrap_or_default(),
            category_index: 1,
            price: first_value(&context.price_candidates).unwrap_or_default(),
            currency: first_value(&context.currency_candidates).unwrap_or_default(),
            compare_at_price: None,
            merchant: None,
            key_features: context
                .key_feature_candidates
                .iter()
                .map(|c| c.value.clone())
                .collect(),
            image_urls: context
                .image_url_candidates
                .iter()
                .map(|c| c.value.clone())
                .collect(),
            colors: context.color_candidates.iter().map(|c| c.value.clone()).collect(),
            variants: stub_variants(&context),
            name,
        })
    }
}

fn taxonomy() -> Arc<Taxonomy> {
    // Like the real vocabulary, top-level segments are themselves entries.
    Arc::new(Taxonomy::from_lines([
        "Apparel & Accessories",
        "Apparel & Accessories > Clothing",
        "Apparel & Accessories > Shoes",
        "Furniture",
        "Furniture > Lighting",
        "Furniture > Lighting > Floor Lamps",
        "Hardware",
        "Hardware > Power Tools",
        "Hardware > Power Tools > Cordless Drills",
    ]))
}

fn pipeline() -> Arc<Pipeline<StubResolver>> {
    Arc::new(Pipeline::new(taxonomy(), StubResolver))
}

#[tokio::test]
async fn test_structured_price_flows_to_product() {
    let html = r#"
        <html><head>
            <script type="application/ld+json">
            {
                "@type": "Product",
                "name": "Cordless Drill 20V",
                "brand": {"@type": "Brand", "name": "DeWalt"},
                "offers": {"price": "29.95", "priceCurrency": "USD"}
            }
            </script>
        </head><body></body></html>
    "#;

    let product = pipeline().run_page(html, None).await.unwrap();
    assert_eq!(product.price.price, 29.95);
    assert_eq!(product.price.currency, "USD");
    assert!(taxonomy().contains(&product.category.name));
}

#[tokio::test]
async fn test_dom_only_price_fills_pass1_gap() {
    let html = r#"
        <html><head>
            <meta property="og:title" content="Trail Running Shoes">
        </head><body>
            <div class="regularPrice">$99.00</div>
        </body></html>
    "#;

    // Pass 1 alone sees no price.
    let structured = shelfscan_extract::extract_structured_signals(html, None);
    assert!(structured.price_candidates.is_empty());

    // Pass 2 contributes the DOM price, and the record resolves from it.
    let context = extract_page(html, None);
    assert_eq!(context.price_candidates.len(), 1);

    let product = pipeline().run_page(html, None).await.unwrap();
    assert_eq!(product.price.price, 99.00);
    assert_eq!(product.price.currency, "USD");
}

#[tokio::test]
async fn test_script_state_variants_reach_product() {
    let sizes = [
        "6", "6.5", "7", "7.5", "8", "8.5", "9", "9.5", "10", "10.5", "11", "11.5", "12", "12.5",
    ];
    let variants_json = sizes
        .iter()
        .map(|s| format!(r#"{{"size": "{s}"}}"#))
        .collect::<Vec<_>>()
        .join(", ");
    let html = format!(
        r#"
        <html><head>
            <meta property="og:title" content="Wool Runner Shoes">
            <meta property="product:price:amount" content="110.00">
            <meta property="product:price:currency" content="USD">
            <script>var meta = {{"variants": [{variants_json}]}};</script>
        </head><body></body></html>
    "#
    );

    let product = pipeline().run_page(&html, None).await.unwrap();
    assert_eq!(product.variants.len(), sizes.len());
    let values: Vec<&str> = product
        .variants
        .iter()
        .map(|v| v.attributes.get("size").unwrap().as_str())
        .collect();
    assert_eq!(values, sizes);
}

#[tokio::test]
async fn test_variant_overflow_is_capped() {
    let variants_json = (0..60)
        .map(|i| format!(r#"{{"size": "{i}"}}"#))
        .collect::<Vec<_>>()
        .join(", ");
    let html = format!(
        r#"
        <html><head>
            <meta property="og:title" content="Big Matrix Shoes">
            <meta property="product:price:amount" content="50.00">
            <meta property="product:price:currency" content="USD">
            <script>var meta = {{"variants": [{variants_json}]}};</script>
        </head><body></body></html>
    "#
    );

    let product = pipeline().run_page(&html, None).await.unwrap();
    assert_eq!(product.variants.len(), 50);
}

#[tokio::test]
async fn test_pipeline_is_idempotent_on_identical_markup() {
    let html = r#"
        <html><head>
            <script type="application/ld+json">
            {
                "@type": "Product",
                "name": "Pilar Floor Lamp",
                "brand": "Article",
                "image": ["https://cdn.example.com/pilar.jpg?w=640"],
                "offers": {"price": "249.00", "priceCurrency": "USD"}
            }
            </script>
            <meta property="og:image" content="https://cdn.example.com/pilar.jpg?w=1280">
        </head><body>
            <button aria-label="Select color Walnut">Walnut</button>
            <button aria-label="Select color Oak">Oak</button>
        </body></html>
    "#;
    let url = Some("https://www.article.com/product/pilar-lamp");

    let context_a = extract_page(html, url);
    let context_b = extract_page(html, url);
    assert_eq!(context_a, context_b);
    assert_eq!(
        serde_json::to_string(&context_a).unwrap(),
        serde_json::to_string(&context_b).unwrap()
    );

    let pipeline = pipeline();
    let product_a = pipeline.run_page(html, url).await.unwrap();
    let product_b = pipeline.run_page(html, url).await.unwrap();
    assert_eq!(
        serde_json::to_string(&product_a).unwrap(),
        serde_json::to_string(&product_b).unwrap()
    );
}

#[tokio::test]
async fn test_image_candidates_are_deduplicated_in_record() {
    let html = r#"
        <html><head>
            <script type="application/ld+json">
            {"@type": "Product", "name": "Lamp", "image": "https://cdn.example.com/a.jpg?w=640",
             "offers": {"price": "10.00", "priceCurrency": "USD"}}
            </script>
            <meta property="og:image" content="https://cdn.example.com/a.jpg?w=1280">
        </head><body>
            <img src="https://cdn.example.com/a.jpg?q=90">
        </body></html>
    "#;

    let product = pipeline().run_page(html, None).await.unwrap();
    assert_eq!(product.image_urls, vec!["https://cdn.example.com/a.jpg"]);
}
