//! Theme directory, mapping table, and store domain types.
//!
//! Shopify themes have a fixed, flat set of top-level directories. Source
//! files live in a richer `src/` layout and are routed into those directories
//! through [`DIR_MAPPINGS`].

use std::fmt;
use std::sync::Arc;

use crate::error::BuildError;

/// Top-level directory of a built Shopify theme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ThemeDir {
    Layout,
    Sections,
    Snippets,
    Blocks,
    Assets,
}

impl ThemeDir {
    /// Every destination directory, in creation order
    pub const ALL: [ThemeDir; 5] = [
        ThemeDir::Layout,
        ThemeDir::Sections,
        ThemeDir::Snippets,
        ThemeDir::Blocks,
        ThemeDir::Assets,
    ];

    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            ThemeDir::Layout => "layout",
            ThemeDir::Sections => "sections",
            ThemeDir::Snippets => "snippets",
            ThemeDir::Blocks => "blocks",
            ThemeDir::Assets => "assets",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "layout" => Some(ThemeDir::Layout),
            "sections" => Some(ThemeDir::Sections),
            "snippets" => Some(ThemeDir::Snippets),
            "blocks" => Some(ThemeDir::Blocks),
            "assets" => Some(ThemeDir::Assets),
            _ => None,
        }
    }
}

impl fmt::Display for ThemeDir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source prefix (relative to `src/`, forward slashes) → destination.
/// Order matters: the first matching prefix wins.
pub const DIR_MAPPINGS: &[(&str, ThemeDir)] = &[
    ("liquid/layout", ThemeDir::Layout),
    ("liquid/sections", ThemeDir::Sections),
    ("liquid/snippets", ThemeDir::Snippets),
    ("liquid/blocks", ThemeDir::Blocks),
    ("styles/css", ThemeDir::Assets),
    ("styles", ThemeDir::Assets),
    ("fonts", ThemeDir::Assets),
    ("images", ThemeDir::Assets),
    ("scripts", ThemeDir::Assets),
];

/// Liquid files without a direct mapping are routed by the first of these
/// substrings found in their relative path.
pub const LIQUID_HINTS: &[(&str, ThemeDir)] = &[
    ("sections", ThemeDir::Sections),
    ("snippets", ThemeDir::Snippets),
    ("blocks", ThemeDir::Blocks),
    ("layout", ThemeDir::Layout),
];

/// Stores tried in order when `SHOPIFY_STORE` is not set
pub const DEFAULT_STORES: &[&str] = &[
    "curalife-commerce.myshopify.com",
    "curalife-commerce-sia.myshopify.com",
    "staging-curalife.myshopify.com",
];

/// Shopify store host name (e.g., "my-store.myshopify.com").
/// Newtype wrapper for type safety
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoreDomain(Arc<str>);

impl StoreDomain {
    /// Create a StoreDomain without validation
    pub fn new(s: &str) -> Self {
        Self(Arc::from(s))
    }

    /// Create a validated StoreDomain.
    /// Accepts bare host names; a leading `https://` and trailing `/` are stripped.
    pub fn validated(s: &str) -> Result<Self, BuildError> {
        let trimmed = s
            .trim()
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/');

        if Self::validate_host(trimmed) {
            Ok(Self(Arc::from(trimmed)))
        } else {
            Err(BuildError::InvalidStore(s.to_string()))
        }
    }

    #[inline]
    fn validate_host(s: &str) -> bool {
        !s.is_empty()
            && s.contains('.')
            && !s.starts_with('.')
            && !s.ends_with('.')
            && s
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'.')
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for `*.myshopify.com` hosts
    pub fn is_myshopify(&self) -> bool {
        self.0.ends_with(".myshopify.com")
    }
}

impl fmt::Display for StoreDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for StoreDomain {
    fn from(s: &str) -> Self {
        Self(Arc::from(s))
    }
}

/// Default store fallback sequence
pub fn default_store_sequence() -> Vec<StoreDomain> {
    DEFAULT_STORES.iter().map(|s| StoreDomain::new(s)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_theme_dir_as_str_parse_round() {
        for dir in ThemeDir::ALL {
            assert_eq!(ThemeDir::parse(dir.as_str()), Some(dir));
        }
        assert_eq!(ThemeDir::parse("templates"), None);
        assert_eq!(ThemeDir::parse(""), None);
    }

    #[test]
    fn test_theme_dir_display() {
        assert_eq!(format!("{}", ThemeDir::Snippets), "snippets");
    }

    #[test]
    fn test_mappings_specific_before_general() {
        let css = DIR_MAPPINGS
            .iter()
            .position(|(p, _)| *p == "styles/css")
            .unwrap();
        let styles = DIR_MAPPINGS
            .iter()
            .position(|(p, _)| *p == "styles")
            .unwrap();
        assert!(css < styles);
    }

    #[test]
    fn test_store_domain_validated() {
        let store = StoreDomain::validated("my-store.myshopify.com").unwrap();
        assert_eq!(store.as_str(), "my-store.myshopify.com");
        assert!(store.is_myshopify());
    }

    #[test]
    fn test_store_domain_strips_scheme() {
        let store = StoreDomain::validated("https://shop.example.com/").unwrap();
        assert_eq!(store.as_str(), "shop.example.com");
        assert!(!store.is_myshopify());
    }

    #[test]
    fn test_store_domain_invalid() {
        assert!(StoreDomain::validated("").is_err());
        assert!(StoreDomain::validated("localhost").is_err());
        assert!(StoreDomain::validated("bad host.com").is_err());
        assert!(StoreDomain::validated(".myshopify.com").is_err());
    }

    #[test]
    fn test_default_store_sequence_order() {
        let stores = default_store_sequence();
        assert_eq!(stores.len(), 3);
        assert_eq!(stores[0].as_str(), "curalife-commerce.myshopify.com");
        assert_eq!(stores[2].as_str(), "staging-curalife.myshopify.com");
    }
}
