//! Trigger evaluator
//!
//! Decides what checking a procedure step should do. Evaluation reads the
//! current SOP configuration, training records and evidence badges, and
//! never writes: nothing is persisted until the draft is confirmed.

use crate::attribution::AttributionResolver;
use crate::badges;
use crate::training::TrainingGate;
use chrono::{DateTime, Utc};
use labs_model::{
    Attribution, CrewMemberId, KnowledgeStatus, ObservationMode, Outcome, ProjectId, SopId,
};
use labs_store::{KnowledgeStore, Lookup, SopCatalog};
use serde::{Deserialize, Serialize};

/// A crew member ticked a checklist step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckEvent {
    pub sop_id: SopId,
    pub step_order: u32,
    pub crew_member_id: CrewMemberId,
    pub project_id: ProjectId,
    pub timestamp: DateTime<Utc>,
}

impl CheckEvent {
    /// Event stamped now
    #[inline]
    #[must_use]
    pub fn new(
        sop_id: SopId,
        step_order: u32,
        crew_member_id: CrewMemberId,
        project_id: ProjectId,
    ) -> Self {
        Self {
            sop_id,
            step_order,
            crew_member_id,
            project_id,
            timestamp: Utc::now(),
        }
    }

    /// With explicit timestamp
    #[inline]
    #[must_use]
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// When a note has to accompany the observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteRequirement {
    Optional,
    UnlessConfirmed,
    Always,
}

/// Fields the confirmation must supply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredFields {
    pub note: NoteRequirement,
    pub photo: bool,
    /// A supervisor other than the crew member must co-sign
    pub supervisor: bool,
}

impl RequiredFields {
    /// Requirements for an observation mode
    #[must_use]
    pub fn for_mode(mode: ObservationMode, requires_cosign: bool) -> Self {
        let (note, photo) = match mode {
            ObservationMode::Minimal => (NoteRequirement::Optional, false),
            ObservationMode::Standard => (NoteRequirement::UnlessConfirmed, false),
            ObservationMode::Detailed => (NoteRequirement::Always, true),
        };
        Self {
            note,
            photo,
            supervisor: requires_cosign,
        }
    }

    /// A note is needed for `outcome`
    #[inline]
    #[must_use]
    pub fn needs_note(&self, outcome: Outcome) -> bool {
        match self.note {
            NoteRequirement::Optional => false,
            NoteRequirement::UnlessConfirmed => outcome != Outcome::Confirmed,
            NoteRequirement::Always => true,
        }
    }
}

/// Unsaved observation produced by a check event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationDraft {
    pub sop_id: SopId,
    pub step_order: u32,
    pub step_title: String,
    /// Title of the SOP; names a knowledge item created from this evidence
    pub sop_title: String,
    pub crew_member_id: CrewMemberId,
    pub project_id: ProjectId,
    pub mode: ObservationMode,
    pub attribution: Attribution,
    pub suggested_outcome: Outcome,
    pub required: RequiredFields,
    pub requires_cosign: bool,
    pub checked_at: DateTime<Utc>,
}

/// Why a check produced nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoActionReason {
    /// Step does not generate observations
    NotObserved,
    /// Step has been retired
    StepRetired,
    /// SOP or step is not in the catalog
    ConfigurationMissing,
}

/// Outcome of evaluating a check event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "decision", content = "draft")]
pub enum TriggerDecision {
    NoAction(NoActionReason),
    /// One tap confirms; the draft is pre-filled as confirmed
    ImmediateConfirm(ObservationDraft),
    /// The crew member fills in the required fields first
    DeferredSubmission(ObservationDraft),
}

impl TriggerDecision {
    /// Draft, unless no action
    #[must_use]
    pub fn draft(&self) -> Option<&ObservationDraft> {
        match self {
            TriggerDecision::NoAction(_) => None,
            TriggerDecision::ImmediateConfirm(draft) | TriggerDecision::DeferredSubmission(draft) => {
                Some(draft)
            }
        }
    }

    /// Take the draft, unless no action
    #[must_use]
    pub fn into_draft(self) -> Option<ObservationDraft> {
        match self {
            TriggerDecision::NoAction(_) => None,
            TriggerDecision::ImmediateConfirm(draft) | TriggerDecision::DeferredSubmission(draft) => {
                Some(draft)
            }
        }
    }

    /// Decision requires nothing of the crew member
    #[inline]
    #[must_use]
    pub fn is_no_action(&self) -> bool {
        matches!(self, TriggerDecision::NoAction(_))
    }
}

/// Read-only evaluator over the current configuration
#[derive(Clone, Copy)]
pub struct TriggerEvaluator<'a> {
    catalog: &'a dyn SopCatalog,
    gate: &'a TrainingGate,
    knowledge: &'a KnowledgeStore,
    resolver: &'a dyn AttributionResolver,
}

impl<'a> TriggerEvaluator<'a> {
    /// Build an evaluator
    #[must_use]
    pub fn new(
        catalog: &'a dyn SopCatalog,
        gate: &'a TrainingGate,
        knowledge: &'a KnowledgeStore,
        resolver: &'a dyn AttributionResolver,
    ) -> Self {
        Self {
            catalog,
            gate,
            knowledge,
            resolver,
        }
    }

    /// Decide what a check event does. Missing configuration degrades to
    /// no action.
    #[must_use]
    pub fn evaluate(&self, event: &CheckEvent) -> TriggerDecision {
        let sop = match self.catalog.sop(&event.sop_id) {
            Lookup::Found(sop) => sop,
            Lookup::NotFound => {
                tracing::debug!(sop_id = %event.sop_id, "check on unknown procedure");
                return TriggerDecision::NoAction(NoActionReason::ConfigurationMissing);
            }
        };
        let Some(step) = sop.step(event.step_order) else {
            tracing::debug!(
                sop_id = %event.sop_id,
                step_order = event.step_order,
                "check on unknown step"
            );
            return TriggerDecision::NoAction(NoActionReason::ConfigurationMissing);
        };
        if step.retired {
            return TriggerDecision::NoAction(NoActionReason::StepRetired);
        }
        if !step.generates_observation {
            return TriggerDecision::NoAction(NoActionReason::NotObserved);
        }

        let attribution = sop.attribution();
        let requires_cosign = self.requires_cosign(&event.crew_member_id, &event.sop_id, &attribution);
        let mode = sop.config.default_observation_mode;
        let draft = ObservationDraft {
            sop_id: event.sop_id.clone(),
            step_order: step.order,
            step_title: step.title.clone(),
            sop_title: sop.title.clone(),
            crew_member_id: event.crew_member_id.clone(),
            project_id: event.project_id.clone(),
            mode,
            attribution,
            suggested_outcome: Outcome::Confirmed,
            required: RequiredFields::for_mode(mode, requires_cosign),
            requires_cosign,
            checked_at: event.timestamp,
        };
        match mode {
            ObservationMode::Minimal => TriggerDecision::ImmediateConfirm(draft),
            ObservationMode::Standard | ObservationMode::Detailed => {
                TriggerDecision::DeferredSubmission(draft)
            }
        }
    }

    /// Co-sign is waived only for certified crew on steps whose evidence is
    /// not under challenge
    #[must_use]
    pub fn requires_cosign(
        &self,
        crew_member_id: &CrewMemberId,
        sop_id: &SopId,
        attribution: &Attribution,
    ) -> bool {
        if !self.gate.is_certified(crew_member_id, sop_id) {
            return true;
        }
        badges::best_item(self.resolver, self.knowledge, attribution)
            .is_some_and(|item| item.status == KnowledgeStatus::Challenged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribution::CategoryResolver;
    use chrono::Utc;
    use labs_model::{KnowledgeItem, KnowledgeItemId, KnowledgeSeed, KnowledgeType, Sop};
    use labs_store::{LabsStore, SopRegistry};
    use std::sync::Arc;

    struct Fixture {
        store: Arc<LabsStore>,
        registry: Arc<SopRegistry>,
        gate: TrainingGate,
    }

    impl Fixture {
        fn new(mode: ObservationMode) -> Self {
            let registry = Arc::new(SopRegistry::new());
            registry
                .register(
                    Sop::new(SopId::new("tile"), "Tile floor", "tile")
                        .with_mode(mode)
                        .with_step("Layout", false, None)
                        .with_step("Set tile", true, None)
                        .with_step("Old grout", true, None),
                )
                .unwrap();
            registry.retire_step(&SopId::new("tile"), 3).unwrap();
            let store = Arc::new(LabsStore::new());
            let gate = TrainingGate::new(Arc::clone(&store), Arc::clone(&registry) as Arc<dyn SopCatalog>);
            Self {
                store,
                registry,
                gate,
            }
        }

        fn evaluate(&self, sop: &str, step: u32) -> TriggerDecision {
            TriggerEvaluator::new(
                self.registry.as_ref(),
                &self.gate,
                &self.store.knowledge,
                &CategoryResolver,
            )
            .evaluate(&CheckEvent::new(
                SopId::new(sop),
                step,
                CrewMemberId::new("ana"),
                ProjectId::new("p1"),
            ))
        }

        fn certify(&self) {
            let (crew, sop) = (CrewMemberId::new("ana"), SopId::new("tile"));
            self.gate.record_review_score(&crew, &sop, 10).unwrap();
            for _ in 0..3 {
                self.gate.record_supervised_completion(&crew, &sop).unwrap();
            }
        }
    }

    #[test]
    fn minimal_mode_confirms_immediately() {
        let fixture = Fixture::new(ObservationMode::Minimal);
        let decision = fixture.evaluate("tile", 2);
        let TriggerDecision::ImmediateConfirm(draft) = decision else {
            panic!("expected immediate confirm, got {decision:?}");
        };
        assert_eq!(draft.suggested_outcome, Outcome::Confirmed);
        assert_eq!(draft.attribution, Attribution::category("tile"));
        assert!(draft.requires_cosign);
    }

    #[test]
    fn detailed_mode_defers_with_required_fields() {
        let fixture = Fixture::new(ObservationMode::Detailed);
        let draft = match fixture.evaluate("tile", 2) {
            TriggerDecision::DeferredSubmission(draft) => draft,
            other => panic!("expected deferred submission, got {other:?}"),
        };
        assert!(draft.required.photo);
        assert!(draft.required.needs_note(Outcome::Confirmed));
        assert!(fixture.store.observations.is_empty());
    }

    #[test]
    fn silent_retired_and_unknown_steps_do_nothing() {
        let fixture = Fixture::new(ObservationMode::Minimal);
        assert_eq!(
            fixture.evaluate("tile", 1),
            TriggerDecision::NoAction(NoActionReason::NotObserved)
        );
        assert_eq!(
            fixture.evaluate("tile", 3),
            TriggerDecision::NoAction(NoActionReason::StepRetired)
        );
        assert_eq!(
            fixture.evaluate("tile", 9),
            TriggerDecision::NoAction(NoActionReason::ConfigurationMissing)
        );
        assert_eq!(
            fixture.evaluate("roof", 1),
            TriggerDecision::NoAction(NoActionReason::ConfigurationMissing)
        );
    }

    #[test]
    fn certified_crew_skip_cosign_unless_evidence_is_challenged() {
        let fixture = Fixture::new(ObservationMode::Minimal);
        fixture.certify();
        assert!(!fixture.evaluate("tile", 2).draft().unwrap().requires_cosign);

        let mut challenged = KnowledgeItem::draft(
            KnowledgeItemId::new(),
            KnowledgeSeed::for_attribution(
                "Tile floor",
                KnowledgeType::Procedure,
                &Attribution::category("tile"),
            ),
            Utc::now(),
        );
        challenged.status = KnowledgeStatus::Challenged;
        fixture.store.knowledge.insert(challenged).unwrap();
        assert!(fixture.evaluate("tile", 2).draft().unwrap().requires_cosign);
    }
}
