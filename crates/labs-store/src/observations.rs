//! Append-only observation log
//!
//! Observations are never edited or deleted. Concurrent appends are safe;
//! readers get a snapshot.

use crate::error::StoreError;
use dashmap::DashMap;
use labs_model::{Observation, ObservationId, SopId};
use parking_lot::RwLock;

/// Append-only log of observations in capture order
#[derive(Debug, Default)]
pub struct ObservationLog {
    entries: RwLock<Vec<Observation>>,
    by_id: DashMap<ObservationId, usize>,
}

impl ObservationLog {
    /// Create an empty log
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an observation
    pub fn append(&self, observation: Observation) -> Result<(), StoreError> {
        let mut entries = self.entries.write();
        if self.by_id.contains_key(&observation.id) {
            return Err(StoreError::Duplicate {
                entity: "observation",
                id: observation.id.to_string(),
            });
        }
        self.by_id.insert(observation.id, entries.len());
        entries.push(observation);
        Ok(())
    }

    /// Look up by id
    #[must_use]
    pub fn get(&self, id: ObservationId) -> Option<Observation> {
        let idx = *self.by_id.get(&id)?;
        self.entries.read().get(idx).cloned()
    }

    /// Snapshot of observations matching `predicate`, in capture order
    pub fn filter(&self, predicate: impl Fn(&Observation) -> bool) -> Vec<Observation> {
        self.entries
            .read()
            .iter()
            .filter(|o| predicate(o))
            .cloned()
            .collect()
    }

    /// Some observation references `sop_id` at `step_order` or later
    #[must_use]
    pub fn references_step_at_or_after(&self, sop_id: &SopId, step_order: u32) -> bool {
        self.entries.read().iter().any(|o| {
            o.step
                .as_ref()
                .is_some_and(|s| &s.sop_id == sop_id && s.step_order >= step_order)
        })
    }

    /// Snapshot of every observation
    #[must_use]
    pub fn all(&self) -> Vec<Observation> {
        self.entries.read().clone()
    }

    /// Number of observations
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// No observations yet
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
