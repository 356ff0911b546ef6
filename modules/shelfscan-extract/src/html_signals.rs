use scraper::{Html, Selector};

/// A `<script>` element: its type attribute and raw body text.
#[derive(Debug, Clone)]
pub struct ScriptSignal {
    pub script_type: Option<String>,
    pub body: String,
}

/// A `<meta>` tag keyed by `property`, `name`, or `itemprop`.
#[derive(Debug, Clone)]
pub struct MetaSignal {
    pub key: String,
    pub content: String,
}

/// Collect every script body and keyed meta tag from the markup, in document
/// order.
pub fn collect_signals(html_text: &str) -> (Vec<ScriptSignal>, Vec<MetaSignal>) {
    let document = Html::parse_document(html_text);
    let script_selector = Selector::parse("script").unwrap();
    let meta_selector = Selector::parse("meta").unwrap();

    let mut scripts = Vec::new();
    for element in document.select(&script_selector) {
        let script_type = element
            .value()
            .attr("type")
            .map(|t| t.trim().to_ascii_lowercase())
            .filter(|t| !t.is_empty());
        let body = element.text().collect::<String>().trim().to_string();
        scripts.push(ScriptSignal { script_type, body });
    }

    let mut meta_tags = Vec::new();
    for element in document.select(&meta_selector) {
        let value = element.value();
        let key = value
            .attr("property")
            .or_else(|| value.attr("name"))
            .or_else(|| value.attr("itemprop"))
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();
        let content = value.attr("content").unwrap_or("").trim();
        if !key.is_empty() && !content.is_empty() {
            meta_tags.push(MetaSignal {
                key,
                content: content.to_string(),
            });
        }
    }

    (scripts, meta_tags)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collects_scripts_with_type() {
        let html = r#"
            <html><head>
                <script type="application/ld+json">{"@type": "Product"}</script>
                <script>var x = 1;</script>
            </head></html>
        "#;
        let (scripts, _) = collect_signals(html);
        assert_eq!(scripts.len(), 2);
        assert_eq!(scripts[0].script_type.as_deref(), Some("application/ld+json"));
        assert!(scripts[0].body.contains("Product"));
        assert_eq!(scripts[1].script_type, None);
    }

    #[test]
    fn test_meta_key_precedence_and_lowercasing() {
        let html = r#"
            <html><head>
                <meta property="og:Title" content="Air Force 1">
                <meta name="description" content="A shoe.">
                <meta itemprop="brand" content="Nike">
                <meta name="empty" content="">
            </head></html>
        "#;
        let (_, meta) = collect_signals(html);
        let keys: Vec<&str> = meta.iter().map(|m| m.key.as_str()).collect();
        assert_eq!(keys, vec!["og:title", "description", "brand"]);
    }
}
