//! SOP catalog
//!
//! The procedure checklist is an external collaborator. The pipeline reads
//! step templates and SOP configuration through [`SopCatalog`], which answers
//! with an explicit [`Lookup`] instead of falling back to hard-coded defaults.
//! [`SopRegistry`] is the in-process implementation.

use crate::error::StoreError;
use crate::observations::ObservationLog;
use labs_model::{ScriptPhase, Sop, SopConfig, SopId, StepTemplate};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Two-tier lookup result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    /// Configuration exists
    Found(T),
    /// Nothing configured under that key
    NotFound,
}

impl<T> Lookup<T> {
    /// Convert to an `Option`
    #[inline]
    pub fn found(self) -> Option<T> {
        match self {
            Lookup::Found(value) => Some(value),
            Lookup::NotFound => None,
        }
    }

    /// Value was found
    #[inline]
    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }
}

impl<T> From<Option<T>> for Lookup<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Lookup::NotFound, Lookup::Found)
    }
}

/// Read access to procedure configuration
pub trait SopCatalog: Send + Sync {
    /// Full SOP definition
    fn sop(&self, sop_id: &SopId) -> Lookup<Sop>;

    /// SOP configuration only
    fn config(&self, sop_id: &SopId) -> Lookup<SopConfig> {
        match self.sop(sop_id) {
            Lookup::Found(sop) => Lookup::Found(sop.config),
            Lookup::NotFound => Lookup::NotFound,
        }
    }

    /// One step template
    fn step(&self, sop_id: &SopId, step_order: u32) -> Lookup<StepTemplate> {
        match self.sop(sop_id) {
            Lookup::Found(sop) => sop.step(step_order).cloned().into(),
            Lookup::NotFound => Lookup::NotFound,
        }
    }
}

/// In-process SOP catalog with step maintenance
#[derive(Debug, Default)]
pub struct SopRegistry {
    sops: RwLock<HashMap<SopId, Sop>>,
}

impl SopRegistry {
    /// Create an empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace an SOP
    ///
    /// # Errors
    /// - `InvalidProcedure` when steps are not numbered 1..=n or the review
    ///   threshold exceeds its question count
    pub fn register(&self, sop: Sop) -> Result<(), StoreError> {
        sop.validate().map_err(|source| StoreError::InvalidProcedure {
            sop_id: sop.id.clone(),
            source,
        })?;
        tracing::debug!(sop_id = %sop.id, steps = sop.steps().len(), "registered procedure");
        self.sops.write().insert(sop.id.clone(), sop);
        Ok(())
    }

    /// Append a step to an SOP, returning its order
    pub fn add_step(
        &self,
        sop_id: &SopId,
        title: impl Into<String>,
        generates_observation: bool,
        script_phase: Option<ScriptPhase>,
    ) -> Result<u32, StoreError> {
        let mut sops = self.sops.write();
        let sop = sops
            .get_mut(sop_id)
            .ok_or_else(|| StoreError::not_found("procedure", sop_id))?;
        Ok(sop.push_step(title, generates_observation, script_phase))
    }

    /// Delete a step.
    ///
    /// Removing a step renumbers the ones after it, so the removal is refused
    /// when any observation references this step or a later one.
    pub fn remove_step(
        &self,
        sop_id: &SopId,
        step_order: u32,
        observations: &ObservationLog,
    ) -> Result<StepTemplate, StoreError> {
        let mut sops = self.sops.write();
        let sop = sops
            .get_mut(sop_id)
            .ok_or_else(|| StoreError::not_found("procedure", sop_id))?;
        if sop.step(step_order).is_none() {
            return Err(StoreError::not_found(
                "step",
                format!("{sop_id}#{step_order}"),
            ));
        }
        if observations.references_step_at_or_after(sop_id, step_order) {
            return Err(StoreError::StepInUse {
                sop_id: sop_id.clone(),
                step_order,
            });
        }
        sop.remove_step(step_order)
            .ok_or_else(|| StoreError::not_found("step", format!("{sop_id}#{step_order}")))
    }

    /// Soft-invalidate a step; it stays in place but no longer triggers
    pub fn retire_step(&self, sop_id: &SopId, step_order: u32) -> Result<(), StoreError> {
        let mut sops = self.sops.write();
        let sop = sops
            .get_mut(sop_id)
            .ok_or_else(|| StoreError::not_found("procedure", sop_id))?;
        if sop.retire_step(step_order) {
            tracing::info!(%sop_id, step_order, "retired procedure step");
            Ok(())
        } else {
            Err(StoreError::not_found("step", format!("{sop_id}#{step_order}")))
        }
    }

    /// Ids of every registered SOP
    #[must_use]
    pub fn ids(&self) -> Vec<SopId> {
        let mut ids: Vec<SopId> = self.sops.read().keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl SopCatalog for SopRegistry {
    fn sop(&self, sop_id: &SopId) -> Lookup<Sop> {
        self.sops.read().get(sop_id).cloned().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use labs_model::{
        Attribution, CrewMemberId, Observation, ObservationId, ObservationSource, Outcome,
        ProjectId, SopError, StepRef,
    };

    fn registry() -> SopRegistry {
        let registry = SopRegistry::new();
        registry
            .register(
                Sop::new(SopId::new("paint"), "Interior repaint", "paint")
                    .with_step("Mask trim", false, Some(ScriptPhase::Shield))
                    .with_step("Prime patches", true, Some(ScriptPhase::Ready))
                    .with_step("Cut in", true, Some(ScriptPhase::Install)),
            )
            .unwrap();
        registry
    }

    fn observed_at(step_order: u32) -> Observation {
        Observation {
            id: ObservationId::new(),
            step: Some(StepRef {
                sop_id: SopId::new("paint"),
                step_order,
            }),
            crew_member_id: CrewMemberId::new("crew"),
            project_id: ProjectId::new("p"),
            outcome: Outcome::Confirmed,
            note: None,
            photo_ref: None,
            captured_at: Utc::now(),
            attribution: Attribution::category("paint"),
            supervisor: None,
            source: ObservationSource::Checklist,
        }
    }

    #[test]
    fn lookup_reports_missing_configuration() {
        let registry = registry();
        assert!(registry.step(&SopId::new("paint"), 2).is_found());
        assert_eq!(registry.step(&SopId::new("paint"), 9), Lookup::NotFound);
        assert_eq!(registry.sop(&SopId::new("roofing")), Lookup::NotFound);
    }

    #[test]
    fn referenced_steps_cannot_be_removed() {
        let registry = registry();
        let log = ObservationLog::new();
        log.append(observed_at(3)).unwrap();

        let err = registry
            .remove_step(&SopId::new("paint"), 2, &log)
            .unwrap_err();
        assert!(matches!(err, StoreError::StepInUse { step_order: 2, .. }));

        registry.retire_step(&SopId::new("paint"), 2).unwrap();
        let step = registry.step(&SopId::new("paint"), 2).found().unwrap();
        assert!(step.retired);
    }

    #[test]
    fn unreferenced_steps_are_removed_densely() {
        let registry = registry();
        let log = ObservationLog::new();
        registry.remove_step(&SopId::new("paint"), 1, &log).unwrap();
        let sop = registry.sop(&SopId::new("paint")).found().unwrap();
        assert!(sop.is_densely_ordered());
        assert_eq!(sop.steps().len(), 2);
    }

    #[test]
    fn unpassable_reviews_are_refused() {
        let registry = registry();
        let sop = Sop::new(SopId::new("roofing"), "Shingle roof", "roofing").with_config(
            SopConfig {
                review_question_count: 4,
                review_pass_threshold: 5,
                ..SopConfig::default()
            },
        );
        let err = registry.register(sop).unwrap_err();
        assert!(matches!(
            err,
            StoreError::InvalidProcedure {
                source: SopError::PassThreshold { threshold: 5, questions: 4 },
                ..
            }
        ));
        assert_eq!(registry.sop(&SopId::new("roofing")), Lookup::NotFound);
    }
}
