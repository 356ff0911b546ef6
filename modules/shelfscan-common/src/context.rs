use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Which markup surface a candidate value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    LinkedData,
    MetaTag,
    ScriptBlob,
    Dom,
}

/// An unresolved value extracted for a semantic field. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Candidate {
    pub value: String,
    pub source: SignalSource,
}

/// The candidate fields extractors are allowed to write into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateField {
    Title,
    Description,
    Brand,
    Price,
    Currency,
    ImageUrl,
    CategoryHint,
    KeyFeature,
    Color,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct OptionValue {
    pub value: String,
    #[serde(default = "default_available")]
    pub available: bool,
    #[serde(default)]
    pub price_delta: Option<f64>,
}

fn default_available() -> bool {
    true
}

impl OptionValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            available: true,
            price_delta: None,
        }
    }
}

/// A named selection dimension (e.g. Size, Color) with its enumerated values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct OptionGroup {
    pub dimension: String,
    pub options: Vec<OptionValue>,
}

/// Intermediate candidate bag produced by the deterministic extraction passes.
///
/// Both extraction passes write into the same context; merges are append-only
/// and deduplicated by value, preserving first-seen order. Nothing here is
/// resolved — the assembler consumes the whole bag. Image URL candidates must
/// be canonicalized by the writer before insertion, so write-time dedup is
/// dedup of canonical forms.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExtractionContext {
    pub page_url: Option<String>,

    // Core product signals
    #[serde(default)]
    pub title_candidates: Vec<Candidate>,
    #[serde(default)]
    pub description_candidates: Vec<Candidate>,
    #[serde(default)]
    pub brand_candidates: Vec<Candidate>,
    #[serde(default)]
    pub price_candidates: Vec<Candidate>,
    #[serde(default)]
    pub currency_candidates: Vec<Candidate>,
    #[serde(default)]
    pub image_url_candidates: Vec<Candidate>,

    // Secondary enrichment signals
    #[serde(default)]
    pub category_hint_candidates: Vec<Candidate>,
    #[serde(default)]
    pub key_feature_candidates: Vec<Candidate>,
    #[serde(default)]
    pub color_candidates: Vec<Candidate>,

    #[serde(default)]
    pub option_groups: Vec<OptionGroup>,

    /// Structured blobs that cannot be flattened to scalar candidates,
    /// serialized verbatim for the resolution service.
    #[serde(default)]
    pub raw_attributes: BTreeMap<String, serde_json::Value>,
}

impl ExtractionContext {
    pub fn new(page_url: Option<String>) -> Self {
        Self {
            page_url,
            ..Self::default()
        }
    }

    /// Append unique non-empty values into a candidate field, preserving
    /// insertion order. Values are trimmed; duplicates (by value, across
    /// sources) are dropped.
    pub fn add_candidates<I>(&mut self, field: CandidateField, source: SignalSource, values: I)
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let list = self.field_mut(field);
        for value in values {
            let value: String = value.into();
            let cleaned = value.trim();
            if cleaned.is_empty() || list.iter().any(|c| c.value == cleaned) {
                continue;
            }
            list.push(Candidate {
                value: cleaned.to_string(),
                source,
            });
        }
    }

    pub fn candidates(&self, field: CandidateField) -> &[Candidate] {
        match field {
            CandidateField::Title => &self.title_candidates,
            CandidateField::Description => &self.description_candidates,
            CandidateField::Brand => &self.brand_candidates,
            CandidateField::Price => &self.price_candidates,
            CandidateField::Currency => &self.currency_candidates,
            CandidateField::ImageUrl => &self.image_url_candidates,
            CandidateField::CategoryHint => &self.category_hint_candidates,
            CandidateField::KeyFeature => &self.key_feature_candidates,
            CandidateField::Color => &self.color_candidates,
        }
    }

    /// Candidate values for a field, in insertion order.
    pub fn values(&self, field: CandidateField) -> impl Iterator<Item = &str> {
        self.candidates(field).iter().map(|c| c.value.as_str())
    }

    pub fn add_option_group(&mut self, group: OptionGroup) {
        self.option_groups.push(group);
    }

    pub fn add_raw_attribute(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.raw_attributes.insert(key.into(), value);
    }

    fn field_mut(&mut self, field: CandidateField) -> &mut Vec<Candidate> {
        match field {
            CandidateField::Title => &mut self.title_candidates,
            CandidateField::Description => &mut self.description_candidates,
            CandidateField::Brand => &mut self.brand_candidates,
            CandidateField::Price => &mut self.price_candidates,
            CandidateField::Currency => &mut self.currency_candidates,
            CandidateField::ImageUrl => &mut self.image_url_candidates,
            CandidateField::CategoryHint => &mut self.category_hint_candidates,
            CandidateField::KeyFeature => &mut self.key_feature_candidates,
            CandidateField::Color => &mut self.color_candidates,
        }
    }
}
