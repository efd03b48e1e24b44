//! Attribution keys
//!
//! Evidence is linked to knowledge items by category and tag matching rather
//! than by a foreign key, since the item may not exist when the first piece
//! of evidence arrives. Keys are normalised (trimmed, lowercase, tags sorted
//! and deduplicated) so matching is stable across devices.

use serde::{Deserialize, Serialize};

/// Category and tags an item of evidence is filed under
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Attribution {
    pub category: String,
    pub tags: Vec<String>,
}

impl Attribution {
    /// Build a normalised key
    #[must_use]
    pub fn new<'a>(category: &str, tags: impl IntoIterator<Item = &'a str>) -> Self {
        let mut tags: Vec<String> = tags
            .into_iter()
            .map(normalize)
            .filter(|t| !t.is_empty())
            .collect();
        tags.sort();
        tags.dedup();
        Self {
            category: normalize(category),
            tags,
        }
    }

    /// Key with a category only
    #[inline]
    #[must_use]
    pub fn category(category: &str) -> Self {
        Self::new(category, std::iter::empty())
    }

    /// No category and no tags; matches nothing
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.category.is_empty() && self.tags.is_empty()
    }

    /// Same category, or at least one shared tag
    #[must_use]
    pub fn overlaps(&self, other: &Attribution) -> bool {
        if !self.category.is_empty() && self.category == other.category {
            return true;
        }
        self.tags.iter().any(|t| other.tags.binary_search(t).is_ok())
    }
}

fn normalize(raw: &str) -> String {
    raw.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalises_category_and_tags() {
        let key = Attribution::new("  Tile ", ["Grout", "grout", " thinset"]);
        assert_eq!(key.category, "tile");
        assert_eq!(key.tags, vec!["grout", "thinset"]);
    }

    #[test]
    fn overlap_by_category_or_tag() {
        let tile = Attribution::new("tile", ["grout"]);
        assert!(tile.overlaps(&Attribution::category("TILE")));
        assert!(tile.overlaps(&Attribution::new("paint", ["grout"])));
        assert!(!tile.overlaps(&Attribution::new("paint", ["primer"])));
    }

    #[test]
    fn empty_categories_never_match() {
        let a = Attribution::category("  ");
        assert!(a.is_empty());
        assert!(!a.overlaps(&Attribution::category("")));
    }
}
