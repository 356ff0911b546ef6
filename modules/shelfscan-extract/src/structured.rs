use serde_json::Value;

use shelfscan_common::{CandidateField, ExtractionContext, SignalSource};

use crate::html_signals::{collect_signals, MetaSignal, ScriptSignal};
use crate::mapping::{
    collect_breadcrumb_hints, collect_candidates_from_node, iter_jsonld_nodes, MappingRules,
};
use crate::script_blob::iter_assigned_json_blobs;
use crate::urls::UrlNormalizer;

/// Pass 1: extract product signals from the markup's structured data sources.
///
/// Three sources are parsed unconditionally — linked data (`application/
/// ld+json`), meta tags, and script-embedded state objects. The result is a
/// bag of candidates, not resolved values. Pages with no client-side state
/// still usually carry linked data and meta tags, so output degrades to
/// sparse rather than empty.
pub fn extract_structured_signals(html_text: &str, page_url: Option<&str>) -> ExtractionContext {
    extract_with_rules(
        html_text,
        page_url,
        &MappingRules::default(),
        &UrlNormalizer::default(),
    )
}

pub fn extract_with_rules(
    html_text: &str,
    page_url: Option<&str>,
    rules: &MappingRules,
    normalizer: &UrlNormalizer,
) -> ExtractionContext {
    let mut context = ExtractionContext::new(page_url.map(str::to_string));
    let (scripts, meta_tags) = collect_signals(html_text);
    let image_transform = |raw: &str| normalizer.canonicalize(raw, page_url);

    extract_linked_data(&scripts, &mut context, rules, &image_transform);
    extract_meta_tags(&meta_tags, &mut context, rules, &image_transform);
    extract_script_blobs(&scripts, &mut context, rules, &image_transform);

    context
}

fn extract_linked_data(
    scripts: &[ScriptSignal],
    context: &mut ExtractionContext,
    rules: &MappingRules,
    image_transform: &dyn Fn(&str) -> String,
) {
    for script in scripts {
        if script.script_type.as_deref() != Some("application/ld+json") {
            continue;
        }
        let Ok(payload) = serde_json::from_str::<Value>(&script.body) else {
            continue;
        };
        for node in iter_jsonld_nodes(&payload) {
            collect_candidates_from_node(
                node,
                context,
                rules,
                SignalSource::LinkedData,
                image_transform,
            );
            collect_breadcrumb_hints(node, context);
        }
    }
}

fn extract_meta_tags(
    meta_tags: &[MetaSignal],
    context: &mut ExtractionContext,
    rules: &MappingRules,
    image_transform: &dyn Fn(&str) -> String,
) {
    for meta in meta_tags {
        let Some(field) = rules.meta_field(&meta.key) else {
            continue;
        };
        let value = if field == CandidateField::ImageUrl {
            image_transform(&meta.content)
        } else {
            meta.content.clone()
        };
        context.add_candidates(field, SignalSource::MetaTag, [value]);
    }
}

fn extract_script_blobs(
    scripts: &[ScriptSignal],
    context: &mut ExtractionContext,
    rules: &MappingRules,
    image_transform: &dyn Fn(&str) -> String,
) {
    for script in scripts {
        if script.script_type.as_deref() == Some("application/json") {
            if let Ok(payload) = serde_json::from_str::<Value>(&script.body) {
                collect_candidates_from_node(
                    &payload,
                    context,
                    rules,
                    SignalSource::ScriptBlob,
                    image_transform,
                );
            }
        }

        for blob in iter_assigned_json_blobs(&script.body) {
            collect_candidates_from_node(
                &blob,
                context,
                rules,
                SignalSource::ScriptBlob,
                image_transform,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const JSONLD_PAGE: &str = r#"
        <html><head>
            <script type="application/ld+json">
            {
                "@context": "https://schema.org",
                "@graph": [
                    {
                        "@type": "Product",
                        "name": "Cordless Drill 20V",
                        "brand": {"@type": "Brand", "name": "DeWalt"},
                        "image": ["https://cdn.example.com/drill.jpg?w=640"],
                        "offers": {
                            "@type": "Offer",
                            "price": "29.95",
                            "priceCurrency": "USD"
                        }
                    },
                    {
                        "@type": "BreadcrumbList",
                        "itemListElement": [
                            {"@type": "ListItem", "name": "Tools"},
                            {"@type": "ListItem", "name": "Power Tools"}
                        ]
                    }
                ]
            }
            </script>
            <meta property="og:title" content="Cordless Drill 20V | Example">
            <meta property="og:image" content="https://cdn.example.com/drill.jpg?w=1280">
        </head><body></body></html>
    "#;

    #[test]
    fn test_linked_data_price_and_currency() {
        let ctx = extract_structured_signals(JSONLD_PAGE, None);
        assert_eq!(
            ctx.values(CandidateField::Price).collect::<Vec<_>>(),
            vec!["29.95"]
        );
        assert_eq!(
            ctx.values(CandidateField::Currency).collect::<Vec<_>>(),
            vec!["USD"]
        );
    }

    #[test]
    fn test_breadcrumbs_become_category_hints() {
        let ctx = extract_structured_signals(JSONLD_PAGE, None);
        assert_eq!(
            ctx.values(CandidateField::CategoryHint).collect::<Vec<_>>(),
            vec!["Tools", "Power Tools"]
        );
    }

    #[test]
    fn test_meta_title_is_fallback_candidate() {
        let ctx = extract_structured_signals(JSONLD_PAGE, None);
        let titles: Vec<&str> = ctx.values(CandidateField::Title).collect();
        assert_eq!(titles[0], "Cordless Drill 20V");
        assert!(titles.contains(&"Cordless Drill 20V | Example"));
    }

    #[test]
    fn test_image_urls_canonicalized_and_deduplicated() {
        // Same image at two resize widths: one canonical candidate.
        let ctx = extract_structured_signals(JSONLD_PAGE, None);
        let images: Vec<&str> = ctx.values(CandidateField::ImageUrl).collect();
        assert_eq!(images, vec!["https://cdn.example.com/drill.jpg"]);
    }

    #[test]
    fn test_script_state_variants_passthrough() {
        let html = r#"
            <html><head><script>
            var meta = {"product": {"variants": [
                {"size": "7"}, {"size": "7.5"}, {"size": "8"}
            ]}};
            </script></head></html>
        "#;
        let ctx = extract_structured_signals(html, None);
        let raw = ctx.raw_attributes.get("variants").unwrap().as_str().unwrap();
        let parsed: Value = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_application_json_script_contributes_candidates() {
        let html = r#"
            <html><body><script type="application/json">
            {"productName": "Miller Trousers", "vendor": "A Day's March"}
            </script></body></html>
        "#;
        let ctx = extract_structured_signals(html, None);
        assert_eq!(
            ctx.values(CandidateField::Title).collect::<Vec<_>>(),
            vec!["Miller Trousers"]
        );
        assert_eq!(
            ctx.values(CandidateField::Brand).collect::<Vec<_>>(),
            vec!["A Day's March"]
        );
    }

    #[test]
    fn test_relative_images_resolved_against_page_url() {
        let html = r#"
            <html><head>
                <meta property="og:image" content="/images/shoe.jpg">
            </head></html>
        "#;
        let ctx = extract_structured_signals(html, Some("https://www.nike.com/t/air-force-1"));
        assert_eq!(
            ctx.values(CandidateField::ImageUrl).collect::<Vec<_>>(),
            vec!["https://www.nike.com/images/shoe.jpg"]
        );
    }

    #[test]
    fn test_empty_page_degrades_to_empty_context() {
        let ctx = extract_structured_signals("<html><body><p>404</p></body></html>", None);
        assert!(ctx.title_candidates.is_empty());
        assert!(ctx.raw_attributes.is_empty());
    }

    #[test]
    fn test_extraction_is_idempotent_on_identical_markup() {
        let a = extract_structured_signals(JSONLD_PAGE, Some("https://example.com/p/1"));
        let b = extract_structured_signals(JSONLD_PAGE, Some("https://example.com/p/1"));
        assert_eq!(a, b);
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }
}
