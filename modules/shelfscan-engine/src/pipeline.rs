use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tokio::task::JoinSet;
use tracing::{error, info};

use shelfscan_common::{ExtractionContext, Product, ShelfScanError, Taxonomy};
use shelfscan_extract::{extract_dom_signals, extract_structured_signals};

use crate::assembler::{Assembler, DraftResolver};
use crate::prefilter::{TaxonomyIndex, DEFAULT_TOP_K};

/// Content-derived product id: a hash of the canonical page URL, or the file
/// stem when no URL is known. Deterministic across runs.
pub fn product_id(filename: &str, url: Option<&str>) -> String {
    let stem = Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(filename);
    let key = url.unwrap_or(stem);
    let digest = Sha256::digest(key.as_bytes());
    hex::encode(digest)[..12].to_string()
}

/// Run both extraction passes over one page's markup. Pure and synchronous;
/// independent across pages.
pub fn extract_page(html: &str, page_url: Option<&str>) -> ExtractionContext {
    let mut context = extract_structured_signals(html, page_url);
    extract_dom_signals(html, &mut context, page_url);
    context
}

/// Per-page pipeline: extract, pre-filter the taxonomy, assemble.
///
/// The taxonomy index is built once at construction and shared read-only
/// across concurrent `run_page` calls.
pub struct Pipeline<R> {
    index: TaxonomyIndex,
    assembler: Assembler<R>,
}

impl<R: DraftResolver> Pipeline<R> {
    pub fn new(taxonomy: Arc<Taxonomy>, resolver: R) -> Self {
        let index = TaxonomyIndex::build(taxonomy.categories().iter().cloned());
        Self {
            index,
            assembler: Assembler::new(resolver, taxonomy),
        }
    }

    pub async fn run_page(
        &self,
        html: &str,
        page_url: Option<&str>,
    ) -> Result<Product, ShelfScanError> {
        let context = extract_page(html, page_url);
        let candidates = self.index.select_candidates(&context, DEFAULT_TOP_K);
        self.assembler.assemble(&context, &candidates).await
    }
}

/// One page of input markup for batch seeding.
pub struct PageInput {
    pub filename: String,
    pub url: Option<String>,
    pub html: String,
}

/// Seed a batch of pages concurrently. Each page's pipeline is independent:
/// a failure is logged and scoped to that record, never propagated to the
/// others, and results are keyed by product id so completion order is
/// irrelevant.
pub async fn seed_pages<R>(
    pipeline: Arc<Pipeline<R>>,
    pages: Vec<PageInput>,
) -> BTreeMap<String, Product>
where
    R: DraftResolver + Send + Sync + 'static,
{
    let mut tasks = JoinSet::new();
    for page in pages {
        let pipeline = Arc::clone(&pipeline);
        tasks.spawn(async move {
            let pid = product_id(&page.filename, page.url.as_deref());
            let result = pipeline.run_page(&page.html, page.url.as_deref()).await;
            (page.filename, pid, result)
        });
    }

    let mut seeded = BTreeMap::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((filename, pid, Ok(product))) => {
                info!(filename, pid, name = %product.name, "Seeded product");
                seeded.insert(pid, product);
            }
            Ok((filename, _, Err(error))) => {
                error!(filename, %error, "Failed to seed page");
            }
            Err(join_error) => {
                error!(%join_error, "Seeding task panicked");
            }
        }
    }
    seeded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_id_prefers_url_over_filename() {
        let by_url = product_id("nike.html", Some("https://www.nike.com/t/air-force-1"));
        let by_stem = product_id("nike.html", None);
        assert_ne!(by_url, by_stem);
        assert_eq!(by_url.len(), 12);
    }

    #[test]
    fn test_product_id_is_deterministic() {
        assert_eq!(
            product_id("page.html", Some("https://example.com/p/1")),
            product_id("page.html", Some("https://example.com/p/1")),
        );
        assert_eq!(product_id("llbean.html", None), product_id("llbean.html", None));
    }

    #[test]
    fn test_extract_page_runs_both_passes() {
        let html = r#"
            <html><head>
                <script type="application/ld+json">{"@type": "Product", "name": "Drill"}</script>
            </head><body>
                <div class="salePrice">$49.00</div>
            </body></html>
        "#;
        let context = extract_page(html, None);
        assert_eq!(context.title_candidates[0].value, "Drill");
        assert_eq!(context.price_candidates[0].value, "$49.00");
    }
}
