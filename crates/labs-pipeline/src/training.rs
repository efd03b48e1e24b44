//! Training and certification gate
//!
//! Tracks competency per (crew member, SOP). A crew member becomes review
//! ready after the SOP's required number of supervised completions and
//! certified once a passing review score is also on record; the two facts
//! may arrive in either order. Status only rises on its own. Revocation is
//! the one explicit way back to `in_progress`.

use crate::error::{ensure_transition, PipelineError};
use chrono::{DateTime, Utc};
use labs_model::{CrewMemberId, SopConfig, SopId, TrainingRecord, TrainingStatus};
use labs_store::{LabsStore, Lookup, SopCatalog, TrainingKey};
use std::sync::Arc;

/// Certification gate over the training records table
pub struct TrainingGate {
    store: Arc<LabsStore>,
    catalog: Arc<dyn SopCatalog>,
}

impl std::fmt::Debug for TrainingGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrainingGate")
            .field("records", &self.store.training.len())
            .finish_non_exhaustive()
    }
}

impl TrainingGate {
    /// Create a gate
    #[must_use]
    pub fn new(store: Arc<LabsStore>, catalog: Arc<dyn SopCatalog>) -> Self {
        Self { store, catalog }
    }

    /// Count one supervised completion
    pub fn record_supervised_completion(
        &self,
        crew_member_id: &CrewMemberId,
        sop_id: &SopId,
    ) -> Result<TrainingRecord, PipelineError> {
        self.record_supervised_completion_at(crew_member_id, sop_id, Utc::now())
    }

    /// Record a review score; the best score so far is kept
    ///
    /// # Errors
    /// - `Validation` if the score exceeds the SOP's question count
    /// - `ConfigurationMissing` if the SOP is unknown
    pub fn record_review_score(
        &self,
        crew_member_id: &CrewMemberId,
        sop_id: &SopId,
        score: u32,
    ) -> Result<TrainingRecord, PipelineError> {
        self.record_review_score_at(crew_member_id, sop_id, score, Utc::now())
    }

    /// Current status; no record means `in_progress`
    #[must_use]
    pub fn status(&self, crew_member_id: &CrewMemberId, sop_id: &SopId) -> TrainingStatus {
        self.record(crew_member_id, sop_id)
            .map_or(TrainingStatus::InProgress, |r| r.status)
    }

    /// Full record, if any
    #[must_use]
    pub fn record(&self, crew_member_id: &CrewMemberId, sop_id: &SopId) -> Option<TrainingRecord> {
        self.store
            .training
            .get(&TrainingKey::new(crew_member_id, sop_id))
    }

    /// Crew member is certified for the SOP
    #[inline]
    #[must_use]
    pub fn is_certified(&self, crew_member_id: &CrewMemberId, sop_id: &SopId) -> bool {
        self.status(crew_member_id, sop_id) == TrainingStatus::Certified
    }

    /// Withdraw certification and start over
    pub fn revoke(
        &self,
        crew_member_id: &CrewMemberId,
        sop_id: &SopId,
    ) -> Result<TrainingRecord, PipelineError> {
        self.revoke_at(crew_member_id, sop_id, Utc::now())
    }

    pub(crate) fn record_supervised_completion_at(
        &self,
        crew_member_id: &CrewMemberId,
        sop_id: &SopId,
        at: DateTime<Utc>,
    ) -> Result<TrainingRecord, PipelineError> {
        let config = self.config(sop_id)?;
        let key = TrainingKey::new(crew_member_id, sop_id);
        self.store.training.upsert_with(
            key.clone(),
            || TrainingRecord::new(crew_member_id.clone(), sop_id.clone(), at),
            |record| {
                record.supervised_completion_count =
                    record.supervised_completion_count.saturating_add(1);
                promote(&key, record, &config, at)
            },
        )
    }

    pub(crate) fn record_review_score_at(
        &self,
        crew_member_id: &CrewMemberId,
        sop_id: &SopId,
        score: u32,
        at: DateTime<Utc>,
    ) -> Result<TrainingRecord, PipelineError> {
        let config = self.config(sop_id)?;
        if score > config.review_question_count {
            return Err(PipelineError::validation(
                "score",
                format!(
                    "{score} exceeds the {} review questions for procedure {sop_id}",
                    config.review_question_count
                ),
            ));
        }
        let key = TrainingKey::new(crew_member_id, sop_id);
        self.store.training.upsert_with(
            key.clone(),
            || TrainingRecord::new(crew_member_id.clone(), sop_id.clone(), at),
            |record| {
                record.best_review_score = Some(record.best_review_score.map_or(score, |b| b.max(score)));
                promote(&key, record, &config, at)
            },
        )
    }

    pub(crate) fn revoke_at(
        &self,
        crew_member_id: &CrewMemberId,
        sop_id: &SopId,
        at: DateTime<Utc>,
    ) -> Result<TrainingRecord, PipelineError> {
        let key = TrainingKey::new(crew_member_id, sop_id);
        let record = self.store.training.update(&key, |record| {
            record.status = TrainingStatus::InProgress;
            record.supervised_completion_count = 0;
            record.best_review_score = None;
            record.certified_at = None;
            record.revocations = record.revocations.saturating_add(1);
            record.updated_at = at;
            Ok::<(), PipelineError>(())
        })?;
        tracing::info!(training = %key, revocations = record.revocations, "certification revoked");
        Ok(record)
    }

    fn config(&self, sop_id: &SopId) -> Result<SopConfig, PipelineError> {
        match self.catalog.config(sop_id) {
            Lookup::Found(config) => Ok(config),
            Lookup::NotFound => {
                tracing::debug!(%sop_id, "no configuration for procedure");
                Err(PipelineError::configuration_missing(format!(
                    "procedure {sop_id} has no training configuration"
                )))
            }
        }
    }
}

fn promote(
    key: &TrainingKey,
    record: &mut TrainingRecord,
    config: &SopConfig,
    at: DateTime<Utc>,
) -> Result<(), PipelineError> {
    let earned = record.earned_status(config);
    if earned > record.status {
        ensure_transition(key, record.status, earned, "certify")?;
        tracing::info!(training = %key, from = %record.status, to = %earned, "training status advanced");
        record.status = earned;
        if earned == TrainingStatus::Certified {
            record.certified_at = Some(at);
            metrics::counter!("labs_certifications_total").increment(1);
        }
    }
    record.updated_at = at;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use labs_model::Sop;
    use labs_store::SopRegistry;

    fn gate() -> TrainingGate {
        let registry = SopRegistry::new();
        registry.register(Sop::new(SopId::new("tile"), "Tile floor", "tile")).unwrap();
        TrainingGate::new(Arc::new(LabsStore::new()), Arc::new(registry))
    }

    fn ids() -> (CrewMemberId, SopId) {
        (CrewMemberId::new("ana"), SopId::new("tile"))
    }

    #[test]
    fn completions_then_score_certify() {
        let gate = gate();
        let (crew, sop) = ids();
        for _ in 0..2 {
            gate.record_supervised_completion(&crew, &sop).unwrap();
        }
        assert_eq!(gate.status(&crew, &sop), TrainingStatus::InProgress);
        let record = gate.record_supervised_completion(&crew, &sop).unwrap();
        assert_eq!(record.status, TrainingStatus::ReviewReady);

        let record = gate.record_review_score(&crew, &sop, 8).unwrap();
        assert_eq!(record.status, TrainingStatus::Certified);
        assert!(record.certified_at.is_some());
    }

    #[test]
    fn score_then_completions_certify() {
        let gate = gate();
        let (crew, sop) = ids();
        gate.record_review_score(&crew, &sop, 9).unwrap();
        assert_eq!(gate.status(&crew, &sop), TrainingStatus::InProgress);
        for _ in 0..3 {
            gate.record_supervised_completion(&crew, &sop).unwrap();
        }
        assert!(gate.is_certified(&crew, &sop));
    }

    #[test]
    fn best_score_is_kept() {
        let gate = gate();
        let (crew, sop) = ids();
        gate.record_review_score(&crew, &sop, 9).unwrap();
        let record = gate.record_review_score(&crew, &sop, 4).unwrap();
        assert_eq!(record.best_review_score, Some(9));
    }

    #[test]
    fn score_above_question_count_is_rejected() {
        let gate = gate();
        let (crew, sop) = ids();
        let err = gate.record_review_score(&crew, &sop, 11).unwrap_err();
        assert!(matches!(err, PipelineError::Validation { field: "score", .. }));
        assert!(gate.record(&crew, &sop).is_none());
    }

    #[test]
    fn unknown_procedure_is_configuration_missing() {
        let gate = gate();
        let err = gate
            .record_supervised_completion(&CrewMemberId::new("ana"), &SopId::new("roof"))
            .unwrap_err();
        assert!(err.is_field_blocking());
    }

    #[test]
    fn revoke_starts_over() {
        let gate = gate();
        let (crew, sop) = ids();
        gate.record_review_score(&crew, &sop, 10).unwrap();
        for _ in 0..3 {
            gate.record_supervised_completion(&crew, &sop).unwrap();
        }
        let record = gate.revoke(&crew, &sop).unwrap();
        assert_eq!(record.status, TrainingStatus::InProgress);
        assert_eq!(record.supervised_completion_count, 0);
        assert_eq!(record.best_review_score, None);
        assert_eq!(record.revocations, 1);

        assert!(gate.revoke(&crew, &SopId::new("paint")).is_err());
    }
}
