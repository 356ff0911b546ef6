//! Cross-merchant identity resolution.
//!
//! Batch pass over the full set of assembled products:
//!   1. Evaluate every pair. Tier 1: a shared GTIN/UPC-shaped code is an
//!      automatic match with confidence floored at 0.95. Tier 2 (only when
//!      neither side shares a code): weighted title+brand similarity against
//!      a configurable threshold.
//!   2. Matched pairs form edges; connected components (union-find) define
//!      canonical clusters — transitive closure, so A~B and B~C cluster all
//!      three.
//!   3. Each cluster gets a stable canonical id: a hash of its sorted member
//!      ids, order-independent across reruns.
//!   4. Every product gets a match decision with confidence and evidence,
//!      never a bare boolean.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};

use shelfscan_common::{
    IdentityConfig, MatchDecision, MatchEvidence, Product, ShelfScanError,
};

/// Barcode-length digit runs (GTIN-8 through GTIN-14).
static GTIN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\d{8,14}\b").unwrap());

static NON_ALNUM_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9]+").unwrap());

/// A shared barcode is near-certain identity regardless of how the titles read.
const GTIN_CONFIDENCE_FLOOR: f64 = 0.95;

#[derive(Debug, Clone)]
struct PairwiseMatch {
    matched: bool,
    confidence: f64,
    evidence: Vec<MatchEvidence>,
}

/// Deduplicates products by GTIN and title+brand similarity, assigns
/// canonical ids and explainable match decisions.
pub struct IdentityResolver {
    config: IdentityConfig,
}

impl IdentityResolver {
    /// Validates the configuration; invalid thresholds are rejected here,
    /// at startup, not silently ignored later.
    pub fn new(config: IdentityConfig) -> Result<Self, ShelfScanError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Enrich every product in place with `canonical_product_id` and
    /// `match_decision`. Pairwise over the whole set — quadratic in corpus
    /// size, which is acceptable at this scale; larger corpora need a
    /// blocking/partitioning strategy first.
    pub fn assign_canonical(&self, products: &mut BTreeMap<String, Product>) {
        if products.is_empty() {
            return;
        }

        let ids: Vec<String> = products.keys().cloned().collect();
        let mut pairwise: HashMap<(usize, usize), PairwiseMatch> = HashMap::new();
        let mut union_find = UnionFind::new(ids.len());

        for i in 0..ids.len() {
            for j in (i + 1)..ids.len() {
                let result = self.evaluate_pair(&products[&ids[i]], &products[&ids[j]]);
                if result.matched {
                    union_find.union(i, j);
                }
                pairwise.insert((i, j), result);
            }
        }

        // Cluster members, keyed by component root.
        let mut components: BTreeMap<usize, Vec<&str>> = BTreeMap::new();
        for (index, id) in ids.iter().enumerate() {
            components
                .entry(union_find.find(index))
                .or_default()
                .push(id.as_str());
        }
        for members in components.values() {
            let canonical = canonical_id(members);
            for id in members {
                products.get_mut(*id).unwrap().canonical_product_id = Some(canonical.clone());
            }
        }

        for (index, id) in ids.iter().enumerate() {
            let decision = match self.best_candidate(index, &ids, &pairwise) {
                Some((best_index, best)) => MatchDecision {
                    candidate_product_id: Some(ids[best_index].clone()),
                    matched: best.matched,
                    confidence: best.confidence,
                    threshold: self.config.match_threshold,
                    evidence: best.evidence.clone(),
                },
                None => self.singleton_decision(),
            };
            products.get_mut(id).unwrap().match_decision = Some(decision);
        }
    }

    /// The other product with the highest match confidence; ties broken by id
    /// sort order for determinism.
    fn best_candidate<'a>(
        &self,
        index: usize,
        ids: &[String],
        pairwise: &'a HashMap<(usize, usize), PairwiseMatch>,
    ) -> Option<(usize, &'a PairwiseMatch)> {
        let mut best: Option<(usize, &PairwiseMatch)> = None;
        for other in 0..ids.len() {
            if other == index {
                continue;
            }
            let key = if index < other {
                (index, other)
            } else {
                (other, index)
            };
            let result = &pairwise[&key];
            let better = match best {
                None => true,
                Some((best_index, best_result)) => {
                    result.confidence > best_result.confidence
                        || (result.confidence == best_result.confidence
                            && ids[other] < ids[best_index])
                }
            };
            if better {
                best = Some((other, result));
            }
        }
        best
    }

    fn evaluate_pair(&self, left: &Product, right: &Product) -> PairwiseMatch {
        let shared_codes: Vec<String> = gtin_codes(left)
            .intersection(&gtin_codes(right))
            .cloned()
            .collect();

        let similarity = self.title_brand_similarity(left, right);

        let gtin_evidence = MatchEvidence {
            signal: "gtin_exact_match".to_string(),
            score: if shared_codes.is_empty() { 0.0 } else { 1.0 },
            matched: !shared_codes.is_empty(),
            details: BTreeMap::from([(
                "shared_codes".to_string(),
                serde_json::json!(shared_codes),
            )]),
        };
        let similarity_evidence = MatchEvidence {
            signal: "title_brand_similarity".to_string(),
            score: similarity,
            matched: similarity >= self.config.match_threshold,
            details: BTreeMap::from([
                ("left_brand".to_string(), serde_json::json!(left.brand)),
                ("right_brand".to_string(), serde_json::json!(right.brand)),
            ]),
        };
        let evidence = vec![gtin_evidence, similarity_evidence];

        if !shared_codes.is_empty() {
            // Tier 1: automatic match.
            return PairwiseMatch {
                matched: true,
                confidence: similarity.max(GTIN_CONFIDENCE_FLOOR),
                evidence,
            };
        }

        // Tier 2: probabilistic fallback.
        PairwiseMatch {
            matched: similarity >= self.config.match_threshold,
            confidence: similarity,
            evidence,
        }
    }

    fn singleton_decision(&self) -> MatchDecision {
        MatchDecision {
            candidate_product_id: None,
            matched: false,
            confidence: 0.0,
            threshold: self.config.match_threshold,
            evidence: vec![MatchEvidence {
                signal: "no_other_products".to_string(),
                score: 0.0,
                matched: false,
                details: BTreeMap::new(),
            }],
        }
    }

    /// Weighted similarity of normalized title and brand, scaled back to 0–1
    /// by the weight sum so custom weights keep threshold semantics.
    fn title_brand_similarity(&self, left: &Product, right: &Product) -> f64 {
        let title_score = strsim::sorensen_dice(
            &normalize_text(&left.name),
            &normalize_text(&right.name),
        );
        let brand_score = strsim::sorensen_dice(
            &normalize_text(&left.brand),
            &normalize_text(&right.brand),
        );
        let total = self.config.title_weight + self.config.brand_weight;
        (self.config.title_weight * title_score + self.config.brand_weight * brand_score) / total
    }
}

/// Lowercase and collapse non-alphanumeric runs to single spaces.
fn normalize_text(value: &str) -> String {
    let lowered = value.to_lowercase();
    NON_ALNUM_RE
        .replace_all(&lowered, " ")
        .trim()
        .to_string()
}

/// Barcode-shaped codes harvested from name, description, brand, key
/// features, and offer source URLs.
fn gtin_codes(product: &Product) -> BTreeSet<String> {
    let mut fields: Vec<&str> = vec![&product.name, &product.description, &product.brand];
    fields.extend(product.key_features.iter().map(String::as_str));
    for offer in &product.offers {
        if let Some(ref url) = offer.source_url {
            fields.push(url);
        }
    }

    let mut found = BTreeSet::new();
    for field in fields {
        for code in GTIN_RE.find_iter(field) {
            found.insert(code.as_str().to_string());
        }
    }
    found
}

/// `cp_` + 16 hex chars of SHA-256 over the sorted member ids. A pure
/// function of the member-id set: stable across reruns and input orderings.
fn canonical_id(member_ids: &[&str]) -> String {
    let mut sorted: Vec<&str> = member_ids.to_vec();
    sorted.sort_unstable();
    let key = sorted.join("||");
    let digest = Sha256::digest(key.as_bytes());
    format!("cp_{}", &hex::encode(digest)[..16])
}

/// Disjoint-set over product indices; matched pairs union, components are
/// clusters.
struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
        }
    }

    fn find(&mut self, mut node: usize) -> usize {
        while self.parent[node] != node {
            self.parent[node] = self.parent[self.parent[node]];
            node = self.parent[node];
        }
        node
    }

    fn union(&mut self, a: usize, b: usize) {
        let root_a = self.find(a);
        let root_b = self.find(b);
        if root_a != root_b {
            // Attach the larger index under the smaller for determinism.
            let (low, high) = if root_a < root_b {
                (root_a, root_b)
            } else {
                (root_b, root_a)
            };
            self.parent[high] = low;
        }
    }
}
