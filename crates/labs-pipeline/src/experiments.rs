//! Experiment lifecycle
//!
//! `draft -> active -> completed`, with `terminated` reachable from draft or
//! active. Completion fixes the verdict and, unless it is inconclusive,
//! files the experiment against one knowledge item as evidence.

use crate::error::{ensure_transition, PipelineError};
use crate::pipeline::LabsPipeline;
use chrono::Utc;
use labs_model::{
    Activation, BallotStatus, Experiment, ExperimentId, ExperimentOrigin, ExperimentProposal,
    ExperimentResult, ExperimentStatus, HypothesisKind, KnowledgeItem, KnowledgeItemId,
    KnowledgeSeed, KnowledgeType, Verdict,
};
use labs_store::JournalEvent;

/// Result of completing an experiment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExperimentOutcome {
    /// Experiment as stored
    pub experiment: Experiment,
    /// Item the result was filed against; none when inconclusive
    pub knowledge_item: Option<KnowledgeItem>,
}

impl ExperimentOutcome {
    /// Verdict reached
    #[inline]
    #[must_use]
    pub fn verdict(&self) -> Option<Verdict> {
        self.experiment.verdict
    }
}

/// Knowledge type an experiment's finding is filed as
fn knowledge_type_for(kind: HypothesisKind) -> KnowledgeType {
    match kind {
        HypothesisKind::Product => KnowledgeType::Product,
        HypothesisKind::Technique => KnowledgeType::Technique,
        HypothesisKind::Tool => KnowledgeType::ToolMethod,
        HypothesisKind::System => KnowledgeType::Combination,
        HypothesisKind::Durability => KnowledgeType::Material,
    }
}

impl LabsPipeline {
    /// Create a draft experiment
    pub fn create_experiment(
        &self,
        proposal: ExperimentProposal,
    ) -> Result<Experiment, PipelineError> {
        if proposal.title.trim().is_empty() {
            return Err(PipelineError::validation("title", "an experiment needs a title"));
        }
        if proposal.category.trim().is_empty() && proposal.match_criteria.is_empty() {
            return Err(PipelineError::validation(
                "category",
                "an experiment needs a category or match criteria to file its result",
            ));
        }
        let experiment = Experiment::draft(
            ExperimentId::new(),
            proposal,
            ExperimentOrigin::Direct,
            Utc::now(),
        );
        let id = experiment.id;
        self.commit(JournalEvent::ExperimentCreated { experiment })?;
        tracing::info!(experiment_id = %id, "experiment created");
        Ok(self.store.experiments.require(&id)?)
    }

    /// Start a draft experiment
    ///
    /// Ballot activation is accepted only from the closed ballot the
    /// experiment won.
    pub fn activate_experiment(
        &self,
        id: ExperimentId,
        activation: Activation,
    ) -> Result<Experiment, PipelineError> {
        if let Activation::Ballot(ballot_id) = activation {
            let ballot = self.store.ballots.require(&ballot_id)?;
            if ballot.status != BallotStatus::Closed || ballot.winner != Some(id) {
                return Err(PipelineError::validation(
                    "activation",
                    format!("experiment {id} did not win ballot {ballot_id}"),
                ));
            }
        }
        self.commit(JournalEvent::ExperimentActivated { id, activation })?;
        tracing::info!(experiment_id = %id, "experiment activated");
        Ok(self.store.experiments.require(&id)?)
    }

    /// Record one result on an active experiment
    pub fn record_result(
        &self,
        id: ExperimentId,
        result: ExperimentResult,
    ) -> Result<Experiment, PipelineError> {
        self.commit(JournalEvent::ExperimentResultRecorded { id, result })?;
        Ok(self.store.experiments.require(&id)?)
    }

    /// Close an active experiment and file its finding
    ///
    /// # Errors
    /// - `StateConflict` if the experiment is not active or has no results
    pub fn complete_experiment(&self, id: ExperimentId) -> Result<ExperimentOutcome, PipelineError> {
        let experiment = self.store.experiments.require(&id)?;
        ensure_transition(id, experiment.status, ExperimentStatus::Completed, "complete")?;
        if experiment.results.is_empty() {
            return Err(PipelineError::state_conflict(
                "experiment",
                id,
                "active with no recorded results",
                "complete",
            ));
        }
        let verdict = Verdict::from_results(&experiment.results);
        let knowledge_item_id = if verdict.produces_knowledge() {
            let attribution = experiment.attribution();
            self.ensure_knowledge_item(&attribution, || {
                KnowledgeSeed::for_attribution(
                    experiment.title.clone(),
                    knowledge_type_for(experiment.kind),
                    &attribution,
                )
            })?
        } else {
            None
        };
        self.commit(JournalEvent::ExperimentCompleted {
            id,
            verdict,
            knowledge_item_id,
        })?;
        tracing::info!(experiment_id = %id, ?verdict, "experiment completed");

        let experiment = self.store.experiments.require(&id)?;
        let knowledge_item = knowledge_item_id
            .map(|item_id| self.store.knowledge.require(item_id))
            .transpose()?;
        Ok(ExperimentOutcome {
            experiment,
            knowledge_item,
        })
    }

    /// Stop an experiment without a verdict
    pub fn terminate_experiment(
        &self,
        id: ExperimentId,
        reason: impl Into<String>,
    ) -> Result<Experiment, PipelineError> {
        let reason = reason.into();
        if reason.trim().is_empty() {
            return Err(PipelineError::validation(
                "reason",
                "say why the experiment is being stopped",
            ));
        }
        self.commit(JournalEvent::ExperimentTerminated { id, reason })?;
        tracing::info!(experiment_id = %id, "experiment terminated");
        Ok(self.store.experiments.require(&id)?)
    }

    /// Experiment by id
    #[must_use]
    pub fn experiment(&self, id: ExperimentId) -> Option<Experiment> {
        self.store.experiments.get(&id)
    }

    /// Draft experiments that may go on a ballot, oldest first
    #[must_use]
    pub fn eligible_candidates(&self) -> Vec<Experiment> {
        let mut drafts = self
            .store
            .experiments
            .filter(|e| e.status == ExperimentStatus::Draft);
        drafts.sort_by_key(|e| (e.created_at, e.id));
        drafts
    }

    pub(crate) fn apply_experiment_created(
        &self,
        experiment: &Experiment,
    ) -> Result<(), PipelineError> {
        self.store
            .experiments
            .insert_new(experiment.id, experiment.clone())?;
        Ok(())
    }

    pub(crate) fn apply_experiment_activated(
        &self,
        id: ExperimentId,
        activation: &Activation,
    ) -> Result<(), PipelineError> {
        self.store.experiments.update(&id, |experiment| {
            ensure_transition(id, experiment.status, ExperimentStatus::Active, "activate")?;
            experiment.status = ExperimentStatus::Active;
            experiment.activation = Some(activation.clone());
            Ok::<(), PipelineError>(())
        })?;
        Ok(())
    }

    pub(crate) fn apply_result_recorded(
        &self,
        id: ExperimentId,
        result: &ExperimentResult,
    ) -> Result<(), PipelineError> {
        self.store.experiments.update(&id, |experiment| {
            if experiment.status != ExperimentStatus::Active {
                return Err(PipelineError::state_conflict(
                    "experiment",
                    id,
                    experiment.status,
                    "record a result",
                ));
            }
            experiment.results.push(result.clone());
            Ok(())
        })?;
        Ok(())
    }

    pub(crate) fn apply_experiment_completed(
        &self,
        id: ExperimentId,
        verdict: Verdict,
        knowledge_item_id: Option<KnowledgeItemId>,
    ) -> Result<(), PipelineError> {
        if let Some(item_id) = knowledge_item_id {
            self.store.knowledge.require(item_id)?;
        }
        self.store.experiments.update(&id, |experiment| {
            ensure_transition(id, experiment.status, ExperimentStatus::Completed, "complete")?;
            if experiment.results.is_empty() {
                return Err(PipelineError::state_conflict(
                    "experiment",
                    id,
                    "active with no recorded results",
                    "complete",
                ));
            }
            experiment.status = ExperimentStatus::Completed;
            experiment.verdict = Some(verdict);
            experiment.knowledge_item_id = knowledge_item_id;
            Ok(())
        })?;
        Ok(())
    }

    pub(crate) fn apply_experiment_terminated(
        &self,
        id: ExperimentId,
        reason: &str,
    ) -> Result<(), PipelineError> {
        self.store.experiments.update(&id, |experiment| {
            ensure_transition(id, experiment.status, ExperimentStatus::Terminated, "terminate")?;
            experiment.status = ExperimentStatus::Terminated;
            experiment.terminated_reason = Some(reason.to_string());
            Ok::<(), PipelineError>(())
        })?;
        Ok(())
    }
}
