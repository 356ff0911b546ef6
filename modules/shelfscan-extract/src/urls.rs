use std::collections::HashSet;

use url::Url;

/// Canonicalizes image URLs: resolves to absolute form against the page URL
/// and strips recognized resize/quality query parameters, so identical images
/// served at different sizes collapse to one URL.
#[derive(Debug, Clone)]
pub struct UrlNormalizer {
    resize_query_keys: HashSet<&'static str>,
}

impl Default for UrlNormalizer {
    fn default() -> Self {
        Self {
            resize_query_keys: HashSet::from([
                "w", "width", "h", "height", "q", "quality", "fit", "crop", "auto", "fm",
                "format", "ixlib", "_mzcb",
            ]),
        }
    }
}

impl UrlNormalizer {
    /// Canonicalize `value`. Protocol-relative URLs get https; relative URLs
    /// are resolved against `page_url` when known. Unresolvable input is
    /// returned trimmed rather than dropped.
    pub fn canonicalize(&self, value: &str, page_url: Option<&str>) -> String {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return String::new();
        }

        let absolute = if trimmed.starts_with("//") {
            format!("https:{trimmed}")
        } else {
            trimmed.to_string()
        };

        let mut url = match Url::parse(&absolute) {
            Ok(u) => u,
            Err(_) => {
                let Some(base) = page_url.and_then(|p| Url::parse(p).ok()) else {
                    return trimmed.to_string();
                };
                match base.join(&absolute) {
                    Ok(u) => u,
                    Err(_) => return trimmed.to_string(),
                }
            }
        };

        let filtered: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| !self.resize_query_keys.contains(k.as_ref()))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        url.set_fragment(None);
        if filtered.is_empty() {
            url.set_query(None);
        } else {
            let mut query = url::form_urlencoded::Serializer::new(String::new());
            for (k, v) in &filtered {
                query.append_pair(k, v);
            }
            url.set_query(Some(&query.finish()));
        }

        url.to_string()
    }
}
