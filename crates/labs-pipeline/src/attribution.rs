//! Attribution resolver
//!
//! Evidence does not carry a knowledge item id. Which items an observation or
//! experiment counts toward is decided here, late, from its [`Attribution`].
//! Both directions (evidence to items when capturing, items to evidence when
//! recomputing) go through the same [`AttributionResolver::attracts`] check
//! so they can never disagree.

use labs_model::{Attribution, KnowledgeItem, KnowledgeStatus};
use labs_store::KnowledgeStore;
use std::fmt::Debug;

/// Decides which knowledge items a piece of evidence counts toward
pub trait AttributionResolver: Send + Sync + Debug {
    /// `item` accepts evidence filed under `evidence`
    fn attracts(&self, item: &KnowledgeItem, evidence: &Attribution) -> bool;

    /// Items in `store` that accept `evidence`, oldest first
    fn resolve(&self, store: &KnowledgeStore, evidence: &Attribution) -> Vec<KnowledgeItem> {
        store.filter(|item| self.attracts(item, evidence))
    }
}

/// Match on category, or on any shared tag. Archived items attract nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct CategoryResolver;

impl AttributionResolver for CategoryResolver {
    fn attracts(&self, item: &KnowledgeItem, evidence: &Attribution) -> bool {
        item.attracts(evidence)
    }
}

/// Category only; tags are ignored
#[derive(Debug, Clone, Copy, Default)]
pub struct StrictCategoryResolver;

impl AttributionResolver for StrictCategoryResolver {
    fn attracts(&self, item: &KnowledgeItem, evidence: &Attribution) -> bool {
        item.status != KnowledgeStatus::Archived
            && !evidence.category.is_empty()
            && item.category == evidence.category
    }
}
