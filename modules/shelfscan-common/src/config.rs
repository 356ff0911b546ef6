use std::env;
use std::path::PathBuf;

use crate::error::ShelfScanError;

fn required_env(name: &str) -> String {
    env::var(name).unwrap_or_else(|_| panic!("{name} environment variable not set"))
}

fn env_f64(name: &str, default: f64) -> Result<f64, ShelfScanError> {
    match env::var(name) {
        Err(_) => Ok(default),
        Ok(raw) => raw
            .parse()
            .map_err(|_| ShelfScanError::Config(format!("{name} must be a number, got '{raw}'"))),
    }
}

/// Configuration for the external structured-output resolution service.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub api_key: String,
    pub model: String,
    /// Override for the chat-completions base URL (defaults to OpenRouter).
    pub base_url: Option<String>,
}

impl ResolverConfig {
    /// Load from environment variables. Panics with a clear message if the
    /// API key is missing.
    pub fn from_env() -> Self {
        Self {
            api_key: required_env("OPENROUTER_API_KEY"),
            model: env::var("SHELFSCAN_MODEL")
                .unwrap_or_else(|_| "google/gemini-2.0-flash-lite-001".to_string()),
            base_url: env::var("SHELFSCAN_RESOLVER_BASE_URL").ok(),
        }
    }
}

/// Thresholds and tier weights for identity resolution.
///
/// All values are overridable via SHELFSCAN_* env vars and validated at
/// startup; an invalid threshold is a configuration error, never silently
/// replaced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IdentityConfig {
    /// Minimum Tier 2 similarity score for a match edge.
    pub match_threshold: f64,
    pub title_weight: f64,
    pub brand_weight: f64,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            match_threshold: 0.62,
            title_weight: 0.75,
            brand_weight: 0.25,
        }
    }
}

impl IdentityConfig {
    pub fn from_env() -> Result<Self, ShelfScanError> {
        let defaults = Self::default();
        let config = Self {
            match_threshold: env_f64("SHELFSCAN_MATCH_THRESHOLD", defaults.match_threshold)?,
            title_weight: env_f64("SHELFSCAN_TITLE_WEIGHT", defaults.title_weight)?,
            brand_weight: env_f64("SHELFSCAN_BRAND_WEIGHT", defaults.brand_weight)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ShelfScanError> {
        if !(0.0..=1.0).contains(&self.match_threshold) {
            return Err(ShelfScanError::Config(format!(
                "match_threshold must be within [0, 1], got {}",
                self.match_threshold
            )));
        }
        if self.title_weight < 0.0 || self.brand_weight < 0.0 {
            return Err(ShelfScanError::Config(
                "tier weights must be non-negative".to_string(),
            ));
        }
        if self.title_weight + self.brand_weight <= 0.0 {
            return Err(ShelfScanError::Config(
                "tier weights must sum to a positive value".to_string(),
            ));
        }
        Ok(())
    }
}

/// Directory holding the raw HTML corpus.
pub fn data_dir() -> PathBuf {
    env::var("SHELFSCAN_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("data"))
}

/// Directory seeded product JSON records are written to.
pub fn products_dir() -> PathBuf {
    data_dir().join("products")
}

/// Path to the taxonomy vocabulary file.
pub fn taxonomy_path() -> PathBuf {
    env::var("SHELFSCAN_TAXONOMY_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| data_dir().join("taxonomy.txt"))
}
