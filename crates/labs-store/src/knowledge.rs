//! Versioned knowledge item collection
//!
//! Every write goes through [`KnowledgeStore::compare_and_swap`]: the writer
//! states the version it read, and the write is rejected if anyone else got
//! there first. A successful write bumps the version by one.

use crate::error::StoreError;
use crate::table::Table;
use labs_model::{KnowledgeItem, KnowledgeItemId};

/// Knowledge items keyed by id
#[derive(Debug)]
pub struct KnowledgeStore {
    items: Table<KnowledgeItemId, KnowledgeItem>,
}

impl Default for KnowledgeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KnowledgeStore {
    /// Create an empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            items: Table::new("knowledge item"),
        }
    }

    /// Insert a brand-new item (version must be zero)
    pub fn insert(&self, item: KnowledgeItem) -> Result<(), StoreError> {
        debug_assert_eq!(item.version, 0);
        self.items.insert_new(item.id, item)
    }

    /// Clone of the item
    #[inline]
    #[must_use]
    pub fn get(&self, id: KnowledgeItemId) -> Option<KnowledgeItem> {
        self.items.get(&id)
    }

    /// Clone of the item, or `NotFound`
    pub fn require(&self, id: KnowledgeItemId) -> Result<KnowledgeItem, StoreError> {
        self.items.require(&id)
    }

    /// Write `next` if the stored version still equals `expected_version`.
    ///
    /// Returns the stored item with its new version.
    pub fn compare_and_swap(
        &self,
        expected_version: u64,
        mut next: KnowledgeItem,
    ) -> Result<KnowledgeItem, StoreError> {
        let id = next.id;
        self.items.update(&id, |current| {
            if current.version != expected_version {
                return Err(StoreError::VersionConflict {
                    id,
                    expected: expected_version,
                    found: current.version,
                });
            }
            next.version = expected_version + 1;
            *current = next;
            Ok(())
        })
    }

    /// Items matching `predicate`, oldest first
    pub fn filter(&self, predicate: impl Fn(&KnowledgeItem) -> bool) -> Vec<KnowledgeItem> {
        let mut items = self.items.filter(predicate);
        items.sort_by_key(|item| (item.created_at, item.id));
        items
    }

    /// Snapshot of every item, oldest first
    #[must_use]
    pub fn all(&self) -> Vec<KnowledgeItem> {
        let mut items = self.items.values();
        items.sort_by_key(|item| (item.created_at, item.id));
        items
    }

    /// Number of items
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// No items
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
