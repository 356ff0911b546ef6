use serde_json::Value;

use shelfscan_common::{CandidateField, ExtractionContext, OptionGroup, OptionValue, SignalSource};

/// Serialized passthrough values above this size are dropped rather than fed
/// to the resolution service.
const MAX_PASSTHROUGH_BYTES: usize = 100_000;

/// Declarative mapping from markup keys to candidate fields.
///
/// Adding support for a new recognized key is a change to these tables, not
/// new extraction code. Tables are ordered slices so candidate insertion
/// order is stable.
#[derive(Debug, Clone)]
pub struct MappingRules {
    pub json_key_to_field: Vec<(&'static str, CandidateField)>,
    /// Keys whose values are color strings; collected into a Color option
    /// group (and color candidates) rather than a generic field.
    pub color_keys: Vec<&'static str>,
    pub meta_key_to_field: Vec<(&'static str, CandidateField)>,
    /// Keys whose list/map values are serialized verbatim into the
    /// passthrough map — the allowlist is the enforcement point.
    pub structured_passthrough_keys: Vec<&'static str>,
}

impl Default for MappingRules {
    fn default() -> Self {
        use CandidateField::*;
        Self {
            json_key_to_field: vec![
                ("name", Title),
                ("title", Title),
                ("productName", Title),
                ("headline", Title),
                ("description", Description),
                ("shortDescription", Description),
                ("metaDescription", Description),
                ("subtitle", Description),
                ("brand", Brand),
                ("brandName", Brand),
                ("vendor", Brand),
                ("manufacturer", Brand),
                ("price", Price),
                ("salePrice", Price),
                ("currentPrice", Price),
                ("listPrice", Price),
                ("compareAtPrice", Price),
                ("priceCurrency", Currency),
                ("currency", Currency),
                ("currencyCode", Currency),
                ("image", ImageUrl),
                ("images", ImageUrl),
                ("imageUrl", ImageUrl),
                ("imageUrls", ImageUrl),
                ("primaryImage", ImageUrl),
                ("category", CategoryHint),
                ("productType", CategoryHint),
                ("breadcrumb", CategoryHint),
                ("positiveNotes", KeyFeature),
                ("keyFeatures", KeyFeature),
                ("features", KeyFeature),
                ("highlights", KeyFeature),
                ("benefits", KeyFeature),
            ],
            color_keys: vec![
                "color",
                "colour",
                "colors",
                "colourways",
                "colorDescription",
                "colorName",
                "hues",
                "swatchColors",
            ],
            meta_key_to_field: vec![
                ("og:title", Title),
                ("twitter:title", Title),
                ("title", Title),
                ("description", Description),
                ("og:description", Description),
                ("twitter:description", Description),
                ("og:image", ImageUrl),
                ("twitter:image", ImageUrl),
                ("image", ImageUrl),
                ("og:brand", Brand),
                ("brand", Brand),
                ("product:brand", Brand),
                ("product:price:amount", Price),
                ("og:price:amount", Price),
                ("price", Price),
                ("product:price:currency", Currency),
                ("og:price:currency", Currency),
                ("pricecurrency", Currency),
            ],
            structured_passthrough_keys: vec!["variants", "options", "option_groups"],
        }
    }
}

impl MappingRules {
    pub fn meta_field(&self, key: &str) -> Option<CandidateField> {
        self.meta_key_to_field
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, field)| *field)
    }

    fn is_extracted_key(&self, key: &str) -> bool {
        self.json_key_to_field.iter().any(|(k, _)| *k == key)
            || self.color_keys.iter().any(|k| *k == key)
    }
}

/// Map one structured node's known keys into candidate fields, colors into a
/// Color option group, allowlisted structured values into the passthrough
/// map, and leftover primitives into raw attributes.
pub fn collect_candidates_from_node(
    node: &Value,
    context: &mut ExtractionContext,
    rules: &MappingRules,
    source: SignalSource,
    image_transform: &dyn Fn(&str) -> String,
) {
    for (key, field) in &rules.json_key_to_field {
        let mut values = collect_values_for_key(node, key);
        if *field == CandidateField::ImageUrl {
            values = values.iter().map(|v| image_transform(v)).collect();
        }
        context.add_candidates(*field, source, values);
    }

    let mut color_values: Vec<String> = Vec::new();
    for key in &rules.color_keys {
        color_values.extend(
            collect_values_for_key(node, key)
                .into_iter()
                .map(|v| decode_color_value(&v)),
        );
    }
    if !color_values.is_empty() {
        context.add_candidates(CandidateField::Color, source, color_values.clone());
        emit_color_option_group(color_values, context);
    }

    for key in &rules.structured_passthrough_keys {
        if let Some(value) = find_structured_value(node, key) {
            if let Ok(serialized) = serde_json::to_string(value) {
                context.add_raw_attribute(*key, Value::String(serialized));
            }
        }
    }

    if let Value::Object(map) = node {
        for (key, value) in map {
            if should_skip_raw_attribute(key, value, rules) {
                continue;
            }
            context.add_raw_attribute(key.clone(), value.clone());
        }
    }
}

/// Deduplicate color values and emit a Color option group when 2+ remain.
fn emit_color_option_group(color_values: Vec<String>, context: &mut ExtractionContext) {
    let mut options: Vec<OptionValue> = Vec::new();
    for raw in color_values {
        let value = raw.trim();
        if !value.is_empty() && !options.iter().any(|o| o.value == value) {
            options.push(OptionValue::new(value));
        }
    }
    if options.len() >= 2 {
        context.add_option_group(OptionGroup {
            dimension: "Color".to_string(),
            options,
        });
    }
}

/// URL-decode color values (e.g. `Blizzard%2FDeep%20Navy` -> `Blizzard/Deep Navy`).
fn decode_color_value(value: &str) -> String {
    urlencoding::decode(value)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| value.to_string())
}

/// Recursively find the first list or map value for `target_key`. Oversized
/// values are treated as absent.
fn find_structured_value<'a>(node: &'a Value, target_key: &str) -> Option<&'a Value> {
    match node {
        Value::Object(map) => {
            if let Some(value) = map.get(target_key) {
                if (value.is_array() || value.is_object())
                    && serde_json::to_string(value).map_or(0, |s| s.len()) < MAX_PASSTHROUGH_BYTES
                {
                    return Some(value);
                }
            }
            map.values()
                .find_map(|v| find_structured_value(v, target_key))
        }
        Value::Array(items) => items
            .iter()
            .find_map(|item| find_structured_value(item, target_key)),
        _ => None,
    }
}

/// Skip linked-data metadata, keys already mapped into candidates, and
/// non-primitive values.
fn should_skip_raw_attribute(key: &str, value: &Value, rules: &MappingRules) -> bool {
    if key.starts_with('@') {
        return true;
    }
    if rules.is_extracted_key(key) {
        return true;
    }
    !(value.is_string() || value.is_number() || value.is_boolean())
}

/// Extract `itemListElement[].name` from a BreadcrumbList node as category
/// hints.
pub fn collect_breadcrumb_hints(node: &Value, context: &mut ExtractionContext) {
    let Value::Object(map) = node else { return };
    if map.get("@type").and_then(Value::as_str) != Some("BreadcrumbList") {
        return;
    }
    let Some(Value::Array(elements)) = map.get("itemListElement") else {
        return;
    };
    let names: Vec<String> = elements
        .iter()
        .filter_map(|element| element.get("name"))
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect();
    context.add_candidates(CandidateField::CategoryHint, SignalSource::LinkedData, names);
}

/// Flatten a linked-data payload into its constituent nodes, walking `@graph`
/// containers (nested ones included) and top-level arrays.
pub fn iter_jsonld_nodes(payload: &Value) -> Vec<&Value> {
    let mut nodes = Vec::new();
    collect_jsonld_nodes(payload, &mut nodes, 0);
    nodes
}

fn collect_jsonld_nodes<'a>(payload: &'a Value, out: &mut Vec<&'a Value>, depth: usize) {
    if depth > 8 {
        return;
    }
    match payload {
        Value::Object(map) => {
            if let Some(Value::Array(graph)) = map.get("@graph") {
                for node in graph {
                    if node.is_object() {
                        collect_jsonld_nodes(node, out, depth + 1);
                    }
                }
            } else {
                out.push(payload);
            }
        }
        Value::Array(items) => {
            for item in items {
                if item.is_object() {
                    collect_jsonld_nodes(item, out, depth + 1);
                }
            }
        }
        _ => {}
    }
}

/// Deep-collect scalar string values for `target_key` anywhere in `node`.
pub fn collect_values_for_key(node: &Value, target_key: &str) -> Vec<String> {
    let mut values = Vec::new();
    walk_for_key(node, target_key, &mut values);
    values
}

fn walk_for_key(node: &Value, target_key: &str, values: &mut Vec<String>) {
    match node {
        Value::Object(map) => {
            for (key, value) in map {
                if key == target_key {
                    flatten_scalar_strings(value, values);
                }
                walk_for_key(value, target_key, values);
            }
        }
        Value::Array(items) => {
            for item in items {
                walk_for_key(item, target_key, values);
            }
        }
        _ => {}
    }
}

/// Flatten a value to scalar strings; objects contribute their common
/// scalar-bearing members.
fn flatten_scalar_strings(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => out.push(s.clone()),
        Value::Number(n) => out.push(n.to_string()),
        Value::Object(map) => {
            for key in ["name", "value", "url", "text"] {
                if let Some(Value::String(s)) = map.get(key) {
                    out.push(s.clone());
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                flatten_scalar_strings(item, out);
            }
        }
        _ => {}
    }
}
