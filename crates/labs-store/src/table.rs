//! Keyed collection with per-entry atomic updates
//!
//! Thin wrapper over [`DashMap`]: an update closure runs while the entry's
//! shard lock is held, so a read-check-write on one entity is atomic.

use crate::error::StoreError;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fmt::Display;
use std::hash::Hash;

/// Keyed, concurrently accessible collection
#[derive(Debug)]
pub struct Table<K, V>
where
    K: Eq + Hash,
{
    entity: &'static str,
    rows: DashMap<K, V>,
}

impl<K, V> Table<K, V>
where
    K: Eq + Hash + Clone + Display,
    V: Clone,
{
    /// Create an empty table for the named entity
    #[inline]
    #[must_use]
    pub fn new(entity: &'static str) -> Self {
        Self {
            entity,
            rows: DashMap::new(),
        }
    }

    /// Insert a new row; fails if the key is taken
    pub fn insert_new(&self, key: K, value: V) -> Result<(), StoreError> {
        match self.rows.entry(key) {
            Entry::Occupied(occupied) => Err(StoreError::Duplicate {
                entity: self.entity,
                id: occupied.key().to_string(),
            }),
            Entry::Vacant(vacant) => {
                vacant.insert(value);
                Ok(())
            }
        }
    }

    /// Insert or replace a row
    pub fn upsert(&self, key: K, value: V) {
        self.rows.insert(key, value);
    }

    /// Clone of the row
    #[must_use]
    pub fn get(&self, key: &K) -> Option<V> {
        self.rows.get(key).map(|r| r.value().clone())
    }

    /// Clone of the row, or `NotFound`
    pub fn require(&self, key: &K) -> Result<V, StoreError> {
        self.get(key)
            .ok_or_else(|| StoreError::not_found(self.entity, key))
    }

    /// Run `f` against the row under its lock and return the updated row.
    ///
    /// If `f` fails the row is left exactly as it was.
    pub fn update<E, F>(&self, key: &K, f: F) -> Result<V, E>
    where
        E: From<StoreError>,
        F: FnOnce(&mut V) -> Result<(), E>,
    {
        let mut row = self
            .rows
            .get_mut(key)
            .ok_or_else(|| StoreError::not_found(self.entity, key))?;
        let mut draft = row.value().clone();
        f(&mut draft)?;
        *row.value_mut() = draft.clone();
        Ok(draft)
    }

    /// Get the row or create it with `init`, then apply `f` atomically
    pub fn upsert_with<E, I, F>(&self, key: K, init: I, f: F) -> Result<V, E>
    where
        I: FnOnce() -> V,
        F: FnOnce(&mut V) -> Result<(), E>,
    {
        let mut row = self.rows.entry(key).or_insert_with(init);
        let mut draft = row.value().clone();
        f(&mut draft)?;
        *row.value_mut() = draft.clone();
        Ok(draft)
    }

    /// Snapshot of rows matching `predicate`
    pub fn filter(&self, predicate: impl Fn(&V) -> bool) -> Vec<V> {
        self.rows
            .iter()
            .filter(|r| predicate(r.value()))
            .map(|r| r.value().clone())
            .collect()
    }

    /// Snapshot of every row
    #[must_use]
    pub fn values(&self) -> Vec<V> {
        self.filter(|_| true)
    }

    /// Row count
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// No rows
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
