pub mod config;
pub mod context;
pub mod error;
pub mod product;
pub mod taxonomy;

pub use config::{IdentityConfig, ResolverConfig};
pub use context::*;
pub use error::ShelfScanError;
pub use product::*;
pub use taxonomy::Taxonomy;
