//! Taxonomy pre-filter: fast keyword-based candidate selection.
//!
//! The ~5,600-entry category vocabulary cannot be sent to the resolution
//! service whole, so every category label is treated as a small document and
//! ranked with BM25 against a query built from the extraction context's most
//! informative candidates. BM25 over raw token overlap buys term saturation
//! (a repeated term has diminishing returns) and length normalization (short
//! labels are not penalized).
//!
//! Contract: the correct category is somewhere in the returned top-k, not
//! necessarily first — fine ranking is the assembler's job. With zero
//! vocabulary overlap the filter returns a broad spread of top-level taxonomy
//! segments so the resolver always receives a non-empty candidate list.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use shelfscan_common::{CandidateField, ExtractionContext};

pub const DEFAULT_TOP_K: usize = 20;

const BM25_K1: f64 = 1.5;
const BM25_B: f64 = 0.75;

/// Runs of lowercase letters and digits; punctuation and separators are word
/// boundaries.
static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[a-z0-9]+").unwrap());

/// Common English words that carry no signal for category matching.
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "at", "by", "for", "from", "in", "of", "on", "or", "the", "to", "with",
];

/// Pre-built BM25 index over a category vocabulary.
///
/// Built once per vocabulary and reused for every query; the vocabulary is
/// immutable for the process lifetime, so the index is safe to share across
/// concurrent calls.
#[derive(Debug, Clone)]
pub struct TaxonomyIndex {
    labels: Vec<String>,
    documents: Vec<Vec<String>>,
    doc_freq: HashMap<String, usize>,
    avg_doc_len: f64,
}

impl TaxonomyIndex {
    /// Build an index over category labels: cleaned, sorted, deduplicated.
    pub fn build<I>(labels: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let mut cleaned: Vec<String> = labels
            .into_iter()
            .map(|l| l.into().trim().to_string())
            .filter(|l| !l.is_empty())
            .collect();
        cleaned.sort();
        cleaned.dedup();

        let documents: Vec<Vec<String>> = cleaned.iter().map(|label| tokenize(label)).collect();

        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        for tokens in &documents {
            let mut seen: Vec<&String> = Vec::new();
            for token in tokens {
                if !seen.contains(&token) {
                    seen.push(token);
                    *doc_freq.entry(token.clone()).or_insert(0) += 1;
                }
            }
        }

        let total_len: usize = documents.iter().map(Vec::len).sum();
        let avg_doc_len = if documents.is_empty() {
            0.0
        } else {
            total_len as f64 / documents.len() as f64
        };

        Self {
            labels: cleaned,
            documents,
            doc_freq,
            avg_doc_len,
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Return up to `top_k` category labels most relevant to the context.
    pub fn select_candidates(&self, context: &ExtractionContext, top_k: usize) -> Vec<String> {
        if top_k == 0 || self.labels.is_empty() {
            return Vec::new();
        }

        let query_terms = build_query_terms(context);
        if query_terms.is_empty() {
            return self.fallback_candidates(top_k);
        }

        let scored = self.score(&query_terms);
        // Best match scored 0: zero vocabulary overlap with every label.
        if scored.first().map_or(true, |(score, _)| *score <= 0.0) {
            return self.fallback_candidates(top_k);
        }

        let limit = top_k.min(self.labels.len());
        scored
            .into_iter()
            .take(limit)
            .map(|(_, label)| label.to_string())
            .collect()
    }

    /// BM25 score for every label, sorted best-first (label tiebreak for
    /// determinism).
    fn score(&self, query_terms: &[String]) -> Vec<(f64, &str)> {
        let n = self.documents.len() as f64;
        let mut scored: Vec<(f64, &str)> = self
            .documents
            .iter()
            .zip(&self.labels)
            .map(|(tokens, label)| {
                let doc_len = tokens.len() as f64;
                let mut score = 0.0;
                for term in query_terms {
                    let tf = tokens.iter().filter(|t| *t == term).count() as f64;
                    if tf == 0.0 {
                        continue;
                    }
                    let df = *self.doc_freq.get(term).unwrap_or(&0) as f64;
                    let idf = (1.0 + (n - df + 0.5) / (df + 0.5)).ln();
                    let norm = 1.0 - BM25_B + BM25_B * doc_len / self.avg_doc_len.max(f64::MIN_POSITIVE);
                    score += idf * (tf * (BM25_K1 + 1.0)) / (tf + BM25_K1 * norm);
                }
                (score, label.as_str())
            })
            .collect();

        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.cmp(b.1))
        });
        scored
    }

    /// Broad coverage when scoring found nothing: one representative per
    /// top-level taxonomy segment first, then remaining full paths.
    fn fallback_candidates(&self, top_k: usize) -> Vec<String> {
        let mut ordered: Vec<String> = Vec::new();

        for label in &self.labels {
            let segment = label.split(" > ").next().unwrap_or(label);
            if ordered.iter().any(|o| o == segment) {
                continue;
            }
            ordered.push(segment.to_string());
            if ordered.len() >= top_k {
                return ordered;
            }
        }

        for label in &self.labels {
            if ordered.iter().any(|o| o == label) {
                continue;
            }
            ordered.push(label.clone());
            if ordered.len() >= top_k {
                break;
            }
        }

        ordered
    }
}

/// Flatten the most informative context fields into query tokens. Candidates
/// per field are capped so one noisy signal cannot drown out the others.
fn build_query_terms(context: &ExtractionContext) -> Vec<String> {
    let mut terms = Vec::new();
    for value in context.values(CandidateField::Title).take(3) {
        terms.extend(tokenize(value));
    }
    for value in context.values(CandidateField::Brand).take(2) {
        terms.extend(tokenize(value));
    }
    for value in context.values(CandidateField::CategoryHint).take(3) {
        terms.extend(tokenize(value));
    }
    terms
}

/// Lowercase, extract alphanumeric runs, drop stopwords and single-character
/// tokens.
pub fn tokenize(value: &str) -> Vec<String> {
    let lowered = value.to_lowercase();
    TOKEN_RE
        .find_iter(&lowered)
        .map(|m| m.as_str().to_string())
        .filter(|token| token.len() > 1 && !STOPWORDS.contains(&token.as_str()))
        .collect()
}
