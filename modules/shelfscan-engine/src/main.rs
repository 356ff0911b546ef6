use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use shelfscan_common::{config, IdentityConfig, ResolverConfig, Taxonomy};
use shelfscan_engine::corpus;
use shelfscan_engine::pipeline::PageInput;
use shelfscan_engine::{seed_pages, IdentityResolver, Pipeline, RemoteResolver};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("shelfscan=info".parse()?))
        .init();

    info!("shelfscan seed starting...");

    let taxonomy = Arc::new(Taxonomy::load(config::taxonomy_path())?);
    info!(categories = taxonomy.len(), "Loaded taxonomy vocabulary");

    let resolver = RemoteResolver::new(ResolverConfig::from_env());
    let pipeline = Arc::new(Pipeline::new(taxonomy, resolver));

    let data_dir = config::data_dir();
    let mut pages = Vec::new();
    for page in corpus::PAGES {
        match std::fs::read_to_string(data_dir.join(page.filename)) {
            Ok(html) => pages.push(PageInput {
                filename: page.filename.to_string(),
                url: page.url.map(str::to_string),
                html,
            }),
            Err(error) => error!(filename = page.filename, %error, "Failed to read page"),
        }
    }

    info!(pages = pages.len(), "Seeding corpus...");
    let mut products = seed_pages(pipeline, pages).await;

    let identity = IdentityResolver::new(IdentityConfig::from_env()?)?;
    identity.assign_canonical(&mut products);

    let products_dir = config::products_dir();
    std::fs::create_dir_all(&products_dir)?;
    for (pid, product) in &products {
        let path = products_dir.join(format!("{pid}.json"));
        std::fs::write(&path, serde_json::to_string_pretty(product)?)?;
        info!(file = %path.display(), "Wrote product record");
    }

    info!(
        seeded = products.len(),
        total = corpus::PAGES.len(),
        "Seeding complete"
    );
    Ok(())
}
