pub mod assembler;
pub mod corpus;
pub mod identity;
pub mod pipeline;
pub mod prefilter;

pub use assembler::{Assembler, DraftResolver, ProductDraft, RemoteResolver};
pub use identity::IdentityResolver;
pub use pipeline::{extract_page, product_id, seed_pages, Pipeline};
pub use prefilter::{TaxonomyIndex, DEFAULT_TOP_K};
