use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;

use shelfscan_common::{CandidateField, ExtractionContext, OptionGroup, OptionValue, SignalSource};

use crate::urls::UrlNormalizer;

/// Dimension names that indicate non-product selectors (geography pickers,
/// quantity steppers, carousels).
const NON_PRODUCT_DIMENSIONS: &[&str] =
    &["Thumbnail", "Country", "Quantity", "Qty", "State", "Language"];

/// A single value is not a choice.
const MIN_OPTION_VALUES: usize = 2;

/// URL substrings that mark non-product imagery.
const NON_PRODUCT_IMAGE_HINTS: &[&str] = &[
    "sprite",
    "icon",
    "logo",
    "pixel",
    "favicon",
    "badge",
    "placeholder",
    "loader",
    "spinner",
];

const SCHEMA_ORG_PREFIXES: &[&str] = &["https://schema.org/", "http://schema.org/"];

/// Pattern A: "<Dimension> Option: <Value>", e.g. "Size Option: Large".
static OPTION_LABEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(.+?)\s+Option:\s+(.+)$").unwrap());

/// Pattern B: "Select <dimension> <value>", e.g. "Select size 8.5".
static SELECT_LABEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^Select\s+(\w+)\s+(.+)$").unwrap());

/// Pass 2: enrich `context` with signals from the rendered-attribute surface
/// of the markup — price text, option/variant groupings, availability, and
/// gallery images that structured data missed.
///
/// Deterministic; no resolution happens here. Safe on any HTML including the
/// empty string.
pub fn extract_dom_signals(html: &str, context: &mut ExtractionContext, page_url: Option<&str>) {
    extract_dom_with_normalizer(html, context, page_url, &UrlNormalizer::default())
}

pub fn extract_dom_with_normalizer(
    html: &str,
    context: &mut ExtractionContext,
    page_url: Option<&str>,
    normalizer: &UrlNormalizer,
) {
    let document = Html::parse_document(html);

    collect_price_signals(&document, context);
    collect_option_groups(&document, context);
    collect_availability(&document, context);
    collect_images(&document, context, page_url, normalizer);
}

fn elements(document: &Html) -> impl Iterator<Item = ElementRef<'_>> {
    document.tree.nodes().filter_map(ElementRef::wrap)
}

fn collapsed_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

// ------------------------------------------------------------------
// Price
// ------------------------------------------------------------------

/// Machine-readable price attributes are preferred over rendered text:
/// `itemprop="price"` content, then `data-price`, then the text of elements
/// whose class mentions "price".
fn collect_price_signals(document: &Html, context: &mut ExtractionContext) {
    let mut texts: Vec<String> = Vec::new();

    for element in elements(document) {
        let value = element.value();
        let itemprop = value.attr("itemprop").unwrap_or("");

        let data_price = value.attr("data-price").map(str::trim).unwrap_or("");

        if itemprop.eq_ignore_ascii_case("price") {
            match value.attr("content").map(str::trim).filter(|c| !c.is_empty()) {
                Some(content) => texts.push(content.to_string()),
                None => texts.push(collapsed_text(element)),
            }
        } else if !data_price.is_empty() {
            texts.push(data_price.to_string());
        } else if value
            .attr("class")
            .is_some_and(|c| c.to_ascii_lowercase().contains("price"))
        {
            texts.push(collapsed_text(element));
        }
    }

    context.add_candidates(
        CandidateField::Price,
        SignalSource::Dom,
        texts.into_iter().filter(|t| !t.is_empty()),
    );
}

// ------------------------------------------------------------------
// Option groups
// ------------------------------------------------------------------

struct OptionSignal {
    dimension: String,
    value: String,
    available: bool,
}

/// Derive (dimension, value) pairs from accessible labels and native
/// selection controls, then group them per dimension.
fn collect_option_groups(document: &Html, context: &mut ExtractionContext) {
    let mut signals: Vec<OptionSignal> = Vec::new();

    collect_aria_label_options(document, &mut signals);
    collect_select_options(document, &mut signals);
    collect_input_group_options(document, &mut signals);
    collect_listbox_options(document, &mut signals);

    apply_option_groups(signals, context);
}

fn collect_aria_label_options(document: &Html, signals: &mut Vec<OptionSignal>) {
    for element in elements(document) {
        let Some(label) = element.value().attr("aria-label").map(str::trim) else {
            continue;
        };
        if label.is_empty() {
            continue;
        }

        let captures = OPTION_LABEL_RE
            .captures(label)
            .or_else(|| SELECT_LABEL_RE.captures(label));
        if let Some(captures) = captures {
            signals.push(OptionSignal {
                dimension: title_case(captures.get(1).unwrap().as_str().trim()),
                value: captures.get(2).unwrap().as_str().trim().to_string(),
                available: element.value().attr("disabled").is_none()
                    && element.value().attr("aria-disabled") != Some("true"),
            });
        }
    }
}

fn collect_select_options(document: &Html, signals: &mut Vec<OptionSignal>) {
    let select_selector = Selector::parse("select").unwrap();
    let option_selector = Selector::parse("option").unwrap();

    for select in document.select(&select_selector) {
        let Some(dimension) = control_dimension(select) else {
            continue;
        };
        for option in select.select(&option_selector) {
            let text = collapsed_text(option);
            let value = if text.is_empty() {
                option.value().attr("value").unwrap_or("").trim().to_string()
            } else {
                text
            };
            if value.is_empty() || is_placeholder_option(&value) {
                continue;
            }
            signals.push(OptionSignal {
                dimension: dimension.clone(),
                value,
                available: option.value().attr("disabled").is_none(),
            });
        }
    }
}

fn collect_input_group_options(document: &Html, signals: &mut Vec<OptionSignal>) {
    let input_selector = Selector::parse(r#"input[type="radio"], input[type="checkbox"]"#).unwrap();

    for input in document.select(&input_selector) {
        let value = input.value();
        let Some(name) = value.attr("name").map(str::trim).filter(|n| !n.is_empty()) else {
            continue;
        };
        let Some(option_value) = value.attr("value").map(str::trim).filter(|v| !v.is_empty())
        else {
            continue;
        };
        signals.push(OptionSignal {
            dimension: humanize_dimension(name),
            value: option_value.to_string(),
            available: value.attr("disabled").is_none(),
        });
    }
}

fn collect_listbox_options(document: &Html, signals: &mut Vec<OptionSignal>) {
    let listbox_selector = Selector::parse(r#"[role="listbox"]"#).unwrap();
    let option_selector = Selector::parse(r#"[role="option"]"#).unwrap();

    for listbox in document.select(&listbox_selector) {
        let Some(dimension) = control_dimension(listbox) else {
            continue;
        };
        for option in listbox.select(&option_selector) {
            let text = collapsed_text(option);
            if text.is_empty() {
                continue;
            }
            signals.push(OptionSignal {
                dimension: dimension.clone(),
                value: text,
                available: option.value().attr("aria-disabled") != Some("true"),
            });
        }
    }
}

/// Dimension name for a selection control, from aria-label, name, or id.
fn control_dimension(element: ElementRef<'_>) -> Option<String> {
    let value = element.value();
    value
        .attr("aria-label")
        .or_else(|| value.attr("name"))
        .or_else(|| value.attr("id"))
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(humanize_dimension)
}

fn is_placeholder_option(value: &str) -> bool {
    let lowered = value.to_ascii_lowercase();
    lowered.starts_with("select") || lowered.starts_with("choose") || lowered.starts_with("pick")
}

/// "shoe-size" / "shoe_size" -> "Shoe Size".
fn humanize_dimension(raw: &str) -> String {
    title_case(&raw.replace(['-', '_'], " "))
}

fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Group signals per dimension, dedupe values, drop non-product dimensions
/// and groups with fewer than MIN_OPTION_VALUES distinct values.
fn apply_option_groups(signals: Vec<OptionSignal>, context: &mut ExtractionContext) {
    let mut grouped: Vec<(String, Vec<OptionValue>)> = Vec::new();

    for signal in signals {
        if NON_PRODUCT_DIMENSIONS
            .iter()
            .any(|d| d.eq_ignore_ascii_case(&signal.dimension))
        {
            continue;
        }
        let entry = match grouped.iter().position(|(d, _)| *d == signal.dimension) {
            Some(index) => &mut grouped[index],
            None => {
                grouped.push((signal.dimension.clone(), Vec::new()));
                grouped.last_mut().unwrap()
            }
        };
        if entry.1.iter().any(|o| o.value == signal.value) {
            continue;
        }
        entry.1.push(OptionValue {
            value: signal.value,
            available: signal.available,
            price_delta: None,
        });
    }

    for (dimension, options) in grouped {
        if options.len() < MIN_OPTION_VALUES {
            continue;
        }
        context.add_option_group(OptionGroup { dimension, options });
    }
}

// ------------------------------------------------------------------
// Availability
// ------------------------------------------------------------------

/// First `itemprop="availability"` content value, with any schema.org URL
/// prefix stripped to the short token.
fn collect_availability(document: &Html, context: &mut ExtractionContext) {
    let selector = Selector::parse(r#"[itemprop="availability"]"#).unwrap();

    for element in document.select(&selector) {
        let Some(content) = element.value().attr("content").map(str::trim) else {
            continue;
        };
        if content.is_empty() {
            continue;
        }
        let mut token = content;
        for prefix in SCHEMA_ORG_PREFIXES {
            if let Some(stripped) = token.strip_prefix(prefix) {
                token = stripped;
                break;
            }
        }
        context.add_raw_attribute("dom_availability", Value::String(token.to_string()));
        return;
    }
}

// ------------------------------------------------------------------
// Images
// ------------------------------------------------------------------

/// Ranking ladder for the best source of an image element: zoom-hint
/// attribute, highest-resolution srcset entry, lazy-load source, plain src.
fn collect_images(
    document: &Html,
    context: &mut ExtractionContext,
    page_url: Option<&str>,
    normalizer: &UrlNormalizer,
) {
    let selector = Selector::parse("img, source").unwrap();

    for element in document.select(&selector) {
        let Some(raw) = image_source_ladder(element) else {
            continue;
        };
        if is_non_product_image(&raw, element) {
            continue;
        }
        let canonical = normalizer.canonicalize(&raw, page_url);
        context.add_candidates(CandidateField::ImageUrl, SignalSource::Dom, [canonical]);
    }
}

fn image_source_ladder(element: ElementRef<'_>) -> Option<String> {
    let value = element.value();

    for zoom_attr in ["data-zoom-image", "data-zoom"] {
        if let Some(zoom) = value.attr(zoom_attr).map(str::trim).filter(|v| !v.is_empty()) {
            return Some(zoom.to_string());
        }
    }

    if let Some(srcset) = value.attr("srcset") {
        if let Some(best) = best_srcset_entry(srcset) {
            return Some(best);
        }
    }

    for lazy_attr in ["data-src", "data-lazy-src"] {
        if let Some(lazy) = value.attr(lazy_attr).map(str::trim).filter(|v| !v.is_empty()) {
            return Some(lazy.to_string());
        }
    }

    value
        .attr("src")
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Pick the largest entry of a srcset: highest `w` descriptor, falling back
/// to highest pixel-density `x`, falling back to the last entry.
fn best_srcset_entry(srcset: &str) -> Option<String> {
    let mut best_width: Option<(u32, &str)> = None;
    let mut best_density: Option<(f32, &str)> = None;
    let mut last: Option<&str> = None;

    for entry in srcset.split(',') {
        let mut parts = entry.split_whitespace();
        let Some(url) = parts.next() else { continue };
        last = Some(url);

        match parts.next() {
            Some(descriptor) if descriptor.ends_with('w') => {
                if let Ok(width) = descriptor[..descriptor.len() - 1].parse::<u32>() {
                    if best_width.map_or(true, |(w, _)| width > w) {
                        best_width = Some((width, url));
                    }
                }
            }
            Some(descriptor) if descriptor.ends_with('x') => {
                if let Ok(density) = descriptor[..descriptor.len() - 1].parse::<f32>() {
                    if best_density.map_or(true, |(d, _)| density > d) {
                        best_density = Some((density, url));
                    }
                }
            }
            _ => {}
        }
    }

    best_width
        .map(|(_, url)| url)
        .or(best_density.map(|(_, url)| url))
        .or(last)
        .map(str::to_string)
}

/// Icons, sprites, tracking pixels, and tiny fixed-size images are not
/// product photography.
fn is_non_product_image(url: &str, element: ElementRef<'_>) -> bool {
    let lowered = url.to_ascii_lowercase();
    if NON_PRODUCT_IMAGE_HINTS.iter().any(|hint| lowered.contains(hint)) {
        return true;
    }

    let value = element.value();
    let width = value.attr("width").and_then(|w| w.trim().parse::<u32>().ok());
    let height = value.attr("height").and_then(|h| h.trim().parse::<u32>().ok());
    matches!((width, height), (Some(w), Some(h)) if w <= 32 && h <= 32)
}
