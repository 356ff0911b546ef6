pub mod dom;
pub mod html_signals;
pub mod mapping;
pub mod script_blob;
pub mod structured;
pub mod urls;

pub use dom::extract_dom_signals;
pub use mapping::MappingRules;
pub use structured::extract_structured_signals;
pub use urls::UrlNormalizer;
