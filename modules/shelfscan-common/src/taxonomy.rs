use std::collections::HashSet;
use std::path::Path;

use crate::error::ShelfScanError;

/// The fixed category vocabulary a Product's category must belong to.
///
/// Loaded once per process and immutable afterwards. The source file is a
/// flat ordered list of category paths, one per line; blank lines and
/// `#`-prefixed lines are skipped.
#[derive(Debug, Clone)]
pub struct Taxonomy {
    categories: Vec<String>,
    lookup: HashSet<String>,
}

impl Taxonomy {
    pub fn from_lines<I>(lines: I) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut categories = Vec::new();
        let mut lookup = HashSet::new();
        for line in lines {
            let line = line.as_ref().trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if lookup.insert(line.to_string()) {
                categories.push(line.to_string());
            }
        }
        Self { categories, lookup }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ShelfScanError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            ShelfScanError::Taxonomy(format!("failed to read {}: {e}", path.display()))
        })?;
        let taxonomy = Self::from_lines(text.lines());
        if taxonomy.is_empty() {
            return Err(ShelfScanError::Taxonomy(format!(
                "{} contains no categories",
                path.display()
            )));
        }
        Ok(taxonomy)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup.contains(name)
    }

    /// All categories in file order.
    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_lines_skips_blanks_and_comments() {
        let taxonomy = Taxonomy::from_lines([
            "# Google product taxonomy",
            "",
            "Apparel & Accessories",
            "Apparel & Accessories > Shoes",
            "Apparel & Accessories > Shoes",
        ]);
        assert_eq!(taxonomy.len(), 2);
        assert!(taxonomy.contains("Apparel & Accessories > Shoes"));
        assert!(!taxonomy.contains("# Google product taxonomy"));
    }

    #[test]
    fn test_preserves_file_order() {
        let taxonomy = Taxonomy::from_lines(["B > A", "A > B"]);
        assert_eq!(taxonomy.categories(), &["B > A".to_string(), "A > B".to_string()]);
    }
}
