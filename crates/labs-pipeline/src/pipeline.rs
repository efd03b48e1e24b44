//! Pipeline façade
//!
//! [`LabsPipeline`] is the single entry point for field capture, triage,
//! experiments, training and ballots. Every write follows the same path:
//! 1. validate the request against current state
//! 2. describe the write as a [`JournalEvent`]
//! 3. apply the event to the store and append it to the journal
//! 4. recompute the knowledge items whose evidence changed
//!
//! Replay runs steps 3 and 4 over a journal, so the live and replayed stores
//! are built by the same code. Operations return the entity as stored after the
//! write.

use crate::aggregator::Aggregator;
use crate::attribution::{AttributionResolver, CategoryResolver};
use crate::badges::{self, StepBadge};
use crate::capture::{self, ConfirmRequest, Confirmation};
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::training::TrainingGate;
use crate::trigger::{CheckEvent, ObservationDraft, TriggerDecision, TriggerEvaluator};
use crate::worker::{RecomputeHandle, RecomputeWorker, WorkerStats};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use labs_model::{
    Attribution, CrewMemberId, KnowledgeItem, KnowledgeItemId, KnowledgeSeed, KnowledgeStatus,
    Observation, ObservationId, SopId, TrainingRecord, TrainingStatus,
};
use labs_store::{JournalEvent, LabsStore, Lookup, SopCatalog};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Counts across the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineSummary {
    pub observations: usize,
    pub submissions: usize,
    pub experiments: usize,
    pub training_records: usize,
    pub ballots: usize,
    pub journal_entries: usize,
    pub knowledge_by_status: IndexMap<KnowledgeStatus, usize>,
}

/// The knowledge pipeline
pub struct LabsPipeline {
    pub(crate) config: PipelineConfig,
    pub(crate) store: Arc<LabsStore>,
    pub(crate) catalog: Arc<dyn SopCatalog>,
    pub(crate) resolver: Arc<dyn AttributionResolver>,
    pub(crate) aggregator: Arc<Aggregator>,
    pub(crate) gate: TrainingGate,
    /// Serialises resolve-or-create so one category never gets two new items
    pub(crate) attribution_lock: Mutex<()>,
    pub(crate) triage_lock: Mutex<()>,
    /// Keeps journal order equal to apply order
    pub(crate) commit_lock: Mutex<()>,
}

impl std::fmt::Debug for LabsPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LabsPipeline")
            .field("config", &self.config)
            .field("resolver", &self.resolver)
            .finish_non_exhaustive()
    }
}

impl LabsPipeline {
    /// Pipeline over an empty store with category attribution
    pub fn new(config: PipelineConfig, catalog: Arc<dyn SopCatalog>) -> Result<Self, PipelineError> {
        Self::open(
            config,
            catalog,
            Arc::new(LabsStore::new()),
            Arc::new(CategoryResolver),
        )
    }

    /// Pipeline over an existing store with a chosen resolver
    pub fn open(
        config: PipelineConfig,
        catalog: Arc<dyn SopCatalog>,
        store: Arc<LabsStore>,
        resolver: Arc<dyn AttributionResolver>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        let aggregator = Arc::new(Aggregator::new(
            Arc::clone(&store),
            Arc::clone(&resolver),
            config.scoring,
        ));
        let gate = TrainingGate::new(Arc::clone(&store), Arc::clone(&catalog));
        Ok(Self {
            config,
            store,
            catalog,
            resolver,
            aggregator,
            gate,
            attribution_lock: Mutex::new(()),
            triage_lock: Mutex::new(()),
            commit_lock: Mutex::new(()),
        })
    }

    /// Configuration in force
    #[inline]
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Underlying store
    #[inline]
    #[must_use]
    pub fn store(&self) -> &Arc<LabsStore> {
        &self.store
    }

    /// Confidence aggregator
    #[inline]
    #[must_use]
    pub fn aggregator(&self) -> &Arc<Aggregator> {
        &self.aggregator
    }

    /// Training gate
    #[inline]
    #[must_use]
    pub fn gate(&self) -> &TrainingGate {
        &self.gate
    }

    // ---- capture ----

    /// Decide what checking a step does
    #[must_use]
    pub fn evaluate(&self, event: &CheckEvent) -> TriggerDecision {
        let decision = TriggerEvaluator::new(
            self.catalog.as_ref(),
            &self.gate,
            &self.store.knowledge,
            self.resolver.as_ref(),
        )
        .evaluate(event);
        tracing::debug!(
            sop_id = %event.sop_id,
            step_order = event.step_order,
            crew_member_id = %event.crew_member_id,
            ?decision,
            "evaluated check event"
        );
        decision
    }

    /// Validate and store an observation, then update the knowledge it feeds.
    ///
    /// # Errors
    /// - `Validation` when a required note, photo or co-signer is missing
    /// - `ConfigurationMissing` when the step no longer exists
    /// - `ConcurrencyConflict` when another writer kept winning the knowledge
    ///   item; the observation is stored and the item catches up on its next
    ///   recompute
    pub fn confirm(
        &self,
        draft: &ObservationDraft,
        request: ConfirmRequest,
    ) -> Result<Confirmation, PipelineError> {
        capture::validate(draft, &request)?;
        if let Lookup::NotFound = self.catalog.step(&draft.sop_id, draft.step_order) {
            tracing::debug!(sop_id = %draft.sop_id, step_order = draft.step_order, "confirm on missing step");
            return Err(PipelineError::configuration_missing(format!(
                "step {} of procedure {} no longer exists; this observation can't be attributed",
                draft.step_order, draft.sop_id
            )));
        }
        // captured when the step was checked, which may be long before an
        // offline device confirms it
        let observation =
            capture::observation_from(draft, request, ObservationId::new(), draft.checked_at);
        let knowledge_items = self.record_observation(observation.clone(), &draft.sop_title)?;
        tracing::info!(
            observation_id = %observation.id,
            sop_id = %draft.sop_id,
            step_order = draft.step_order,
            outcome = %observation.outcome,
            items = knowledge_items.len(),
            "observation confirmed"
        );
        Ok(Confirmation {
            observation,
            knowledge_items,
        })
    }

    /// Append an observation and make sure some knowledge item collects it
    pub(crate) fn record_observation(
        &self,
        observation: Observation,
        title: &str,
    ) -> Result<Vec<KnowledgeItem>, PipelineError> {
        let attribution = observation.attribution.clone();
        self.commit(JournalEvent::ObservationRecorded { observation })?;
        self.ensure_knowledge_item(&attribution, || {
            KnowledgeSeed::for_attribution(title, self.config.default_knowledge_type, &attribution)
        })?;
        Ok(self.resolver.resolve(&self.store.knowledge, &attribution))
    }

    /// Id of the oldest item attracting `attribution`, creating one if none
    /// does. `None` only when the attribution is empty.
    pub(crate) fn ensure_knowledge_item(
        &self,
        attribution: &Attribution,
        seed: impl FnOnce() -> KnowledgeSeed,
    ) -> Result<Option<KnowledgeItemId>, PipelineError> {
        if attribution.is_empty() {
            tracing::debug!("evidence without category or tags attracts no knowledge item");
            return Ok(None);
        }
        let _guard = self.attribution_lock.lock();
        if let Some(existing) = self.resolver.resolve(&self.store.knowledge, attribution).first() {
            return Ok(Some(existing.id));
        }
        let id = KnowledgeItemId::new();
        self.commit(JournalEvent::KnowledgeItemCreated { id, seed: seed() })?;
        Ok(Some(id))
    }

    // ---- knowledge ----

    /// Knowledge item by id
    #[must_use]
    pub fn knowledge_item(&self, id: KnowledgeItemId) -> Option<KnowledgeItem> {
        self.store.knowledge.get(id)
    }

    /// Every knowledge item, oldest first
    #[must_use]
    pub fn knowledge_items(&self) -> Vec<KnowledgeItem> {
        self.store.knowledge.all()
    }

    /// Recompute one item from the authoritative evidence
    pub fn recompute(&self, id: KnowledgeItemId) -> Result<KnowledgeItem, PipelineError> {
        self.aggregator.recompute(id)
    }

    /// Recompute every item
    pub fn recompute_all(&self) -> Result<Vec<KnowledgeItem>, PipelineError> {
        self.aggregator.recompute_all()
    }

    /// Archive an item; it stops collecting evidence
    pub fn archive_knowledge(&self, id: KnowledgeItemId) -> Result<KnowledgeItem, PipelineError> {
        self.commit(JournalEvent::KnowledgeItemArchived { id })?;
        Ok(self.store.knowledge.require(id)?)
    }

    /// Start a background worker for deferred recomputes
    #[must_use]
    pub fn spawn_recompute_worker(&self) -> (RecomputeHandle, JoinHandle<WorkerStats>) {
        RecomputeWorker::spawn(
            Arc::clone(&self.aggregator),
            self.config.recompute_queue_depth,
        )
    }

    /// Badges for the observation-generating steps of an SOP
    #[must_use]
    pub fn evidence_badges(&self, sop_id: &SopId) -> Vec<StepBadge> {
        badges::evidence_badges(
            self.catalog.as_ref(),
            self.resolver.as_ref(),
            &self.store.knowledge,
            sop_id,
        )
    }

    // ---- training ----

    /// Count a supervised completion
    pub fn record_supervised_completion(
        &self,
        crew_member_id: &CrewMemberId,
        sop_id: &SopId,
    ) -> Result<TrainingRecord, PipelineError> {
        self.commit(JournalEvent::SupervisedCompletionRecorded {
            crew_member_id: crew_member_id.clone(),
            sop_id: sop_id.clone(),
        })?;
        self.require_training(crew_member_id, sop_id)
    }

    /// Record a review score
    pub fn record_review_score(
        &self,
        crew_member_id: &CrewMemberId,
        sop_id: &SopId,
        score: u32,
    ) -> Result<TrainingRecord, PipelineError> {
        self.commit(JournalEvent::ReviewScoreRecorded {
            crew_member_id: crew_member_id.clone(),
            sop_id: sop_id.clone(),
            score,
        })?;
        self.require_training(crew_member_id, sop_id)
    }

    /// Withdraw a certification
    pub fn revoke_certification(
        &self,
        crew_member_id: &CrewMemberId,
        sop_id: &SopId,
    ) -> Result<TrainingRecord, PipelineError> {
        self.commit(JournalEvent::TrainingRevoked {
            crew_member_id: crew_member_id.clone(),
            sop_id: sop_id.clone(),
        })?;
        self.require_training(crew_member_id, sop_id)
    }

    /// Current training status
    #[must_use]
    pub fn training_status(&self, crew_member_id: &CrewMemberId, sop_id: &SopId) -> TrainingStatus {
        self.gate.status(crew_member_id, sop_id)
    }

    /// Training record, if any
    #[must_use]
    pub fn training_record(
        &self,
        crew_member_id: &CrewMemberId,
        sop_id: &SopId,
    ) -> Option<TrainingRecord> {
        self.gate.record(crew_member_id, sop_id)
    }

    fn require_training(
        &self,
        crew_member_id: &CrewMemberId,
        sop_id: &SopId,
    ) -> Result<TrainingRecord, PipelineError> {
        self.gate
            .record(crew_member_id, sop_id)
            .ok_or_else(|| PipelineError::NotFound {
                entity: "training record",
                id: format!("{crew_member_id}@{sop_id}"),
            })
    }

    // ---- events ----

    /// Counts across the store
    #[must_use]
    pub fn summary(&self) -> PipelineSummary {
        let mut knowledge_by_status: IndexMap<KnowledgeStatus, usize> =
            KnowledgeStatus::ALL.iter().map(|&s| (s, 0)).collect();
        for item in self.store.knowledge.all() {
            *knowledge_by_status.entry(item.status).or_default() += 1;
        }
        PipelineSummary {
            observations: self.store.observations.len(),
            submissions: self.store.submissions.len(),
            experiments: self.store.experiments.len(),
            training_records: self.store.training.len(),
            ballots: self.store.ballots.len(),
            journal_entries: self.store.journal.len(),
            knowledge_by_status,
        }
    }

    /// Apply an event now and journal it
    pub(crate) fn commit(&self, event: JournalEvent) -> Result<(), PipelineError> {
        self.commit_at(event, Utc::now())
    }

    /// Apply an event, journal it, then recompute the knowledge it feeds.
    ///
    /// All three run under the commit lock, so the journal holds events in
    /// the order their effects reached the store. A recompute that keeps
    /// losing to another writer is returned as `ConcurrencyConflict`; the
    /// event itself is stored and journaled by then.
    pub(crate) fn commit_at(
        &self,
        event: JournalEvent,
        at: DateTime<Utc>,
    ) -> Result<(), PipelineError> {
        let _guard = self.commit_lock.lock();
        self.apply(&event, at)?;
        let dependents = self.dependents(&event);
        self.store.journal.append_at(event, at)?;
        for id in dependents {
            self.aggregator.recompute(id).map_err(|err| {
                tracing::warn!(knowledge_item_id = %id, "Recompute after commit failed: {}", err);
                err
            })?;
        }
        Ok(())
    }

    /// Knowledge items whose evidence `event` changed
    fn dependents(&self, event: &JournalEvent) -> Vec<KnowledgeItemId> {
        match event {
            JournalEvent::ObservationRecorded { observation } => self
                .resolver
                .resolve(&self.store.knowledge, &observation.attribution)
                .into_iter()
                .map(|item| item.id)
                .collect(),
            JournalEvent::ExperimentCompleted {
                knowledge_item_id: Some(id),
                ..
            } => vec![*id],
            _ => Vec::new(),
        }
    }

    /// Apply one event to the store.
    ///
    /// Performs the state checks every write needs, so a replayed journal
    /// is held to the same rules as live traffic.
    pub(crate) fn apply(&self, event: &JournalEvent, at: DateTime<Utc>) -> Result<(), PipelineError> {
        match event {
            JournalEvent::ObservationRecorded { observation } => {
                self.store.observations.append(observation.clone())?;
                metrics::counter!("labs_observations_total").increment(1);
                Ok(())
            }
            JournalEvent::KnowledgeItemCreated { id, seed } => {
                self.aggregator.create(*id, seed.clone(), at).map(|_| ())
            }
            JournalEvent::KnowledgeReviewTriggered { id } => {
                self.aggregator.trigger_review(*id).map(|_| ())
            }
            JournalEvent::KnowledgeItemArchived { id } => self.aggregator.archive(*id).map(|_| ()),
            JournalEvent::SubmissionFiled { submission } => self.apply_submission_filed(submission),
            JournalEvent::SubmissionReviewed { submission } => {
                self.apply_submission_reviewed(submission)
            }
            JournalEvent::ExperimentCreated { experiment } => {
                self.apply_experiment_created(experiment)
            }
            JournalEvent::ExperimentActivated { id, activation } => {
                self.apply_experiment_activated(*id, activation)
            }
            JournalEvent::ExperimentResultRecorded { id, result } => {
                self.apply_result_recorded(*id, result)
            }
            JournalEvent::ExperimentCompleted {
                id,
                verdict,
                knowledge_item_id,
            } => self.apply_experiment_completed(*id, *verdict, *knowledge_item_id),
            JournalEvent::ExperimentTerminated { id, reason } => {
                self.apply_experiment_terminated(*id, reason)
            }
            JournalEvent::SupervisedCompletionRecorded {
                crew_member_id,
                sop_id,
            } => self
                .gate
                .record_supervised_completion_at(crew_member_id, sop_id, at)
                .map(|_| ()),
            JournalEvent::ReviewScoreRecorded {
                crew_member_id,
                sop_id,
                score,
            } => self
                .gate
                .record_review_score_at(crew_member_id, sop_id, *score, at)
                .map(|_| ()),
            JournalEvent::TrainingRevoked {
                crew_member_id,
                sop_id,
            } => self.gate.revoke_at(crew_member_id, sop_id, at).map(|_| ()),
            JournalEvent::BallotOpened { ballot } => self.apply_ballot_opened(ballot),
            JournalEvent::VoteCast {
                ballot_id,
                voter,
                experiment_id,
            } => self.apply_vote(*ballot_id, voter, *experiment_id),
            JournalEvent::BallotClosed { ballot_id, winner } => {
                self.apply_ballot_closed(*ballot_id, *winner)
            }
        }
    }
}

