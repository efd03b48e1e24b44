//! Confidence aggregator
//!
//! Owns every write to knowledge items:
//! - recompute counts, score and status from the authoritative evidence
//! - flip items toward review on request
//! - archive items explicitly
//!
//! Writes to one item serialize on a per-item lock and are committed with a
//! version compare-and-swap. A lost race is retried once from a fresh read;
//! a second loss is returned to the caller as `ConcurrencyConflict`.

use crate::attribution::AttributionResolver;
use crate::config::ScoringPolicy;
use crate::error::{ensure_transition, PipelineError};
use crate::scoring;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use labs_model::{
    validate_path, EvidenceTally, KnowledgeItem, KnowledgeItemId, KnowledgeSeed, KnowledgeStatus,
};
use labs_store::LabsStore;
use parking_lot::Mutex;
use std::sync::Arc;

/// Fresh evaluation of one item's evidence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assessment {
    /// Evidence counts
    pub tally: EvidenceTally,
    /// Confidence score
    pub score: u8,
    /// Statuses the item moves through, in order
    pub path: Vec<KnowledgeStatus>,
    /// Review hold still in force after this evidence
    pub review_hold: Option<u32>,
}

/// Serialised writer for knowledge items
#[derive(Debug)]
pub struct Aggregator {
    store: Arc<LabsStore>,
    resolver: Arc<dyn AttributionResolver>,
    policy: ScoringPolicy,
    locks: DashMap<KnowledgeItemId, Arc<Mutex<()>>>,
}

impl Aggregator {
    /// Create an aggregator over `store`
    #[must_use]
    pub fn new(
        store: Arc<LabsStore>,
        resolver: Arc<dyn AttributionResolver>,
        policy: ScoringPolicy,
    ) -> Self {
        Self {
            store,
            resolver,
            policy,
            locks: DashMap::new(),
        }
    }

    /// Scoring policy in force
    #[inline]
    #[must_use]
    pub fn policy(&self) -> &ScoringPolicy {
        &self.policy
    }

    /// Evaluate `item` against the current evidence without writing
    #[must_use]
    pub fn assess(&self, item: &KnowledgeItem) -> Assessment {
        let tally = self.current_tally(item);
        let score = scoring::confidence_score(tally.positive_units, tally.total_units, self.policy.z);
        let review_hold = item
            .review_hold
            .filter(|&hold| tally.sample_size() <= hold);
        let path = if item.status == KnowledgeStatus::Archived {
            Vec::new()
        } else {
            scoring::status_path(item.status, &tally, score, review_hold.is_some(), &self.policy)
        };
        Assessment {
            tally,
            score,
            path,
            review_hold,
        }
    }

    /// Insert a new draft item, already scored against the current evidence.
    ///
    /// The item lands in one insert, so a failure leaves nothing behind.
    pub fn create(
        &self,
        id: KnowledgeItemId,
        seed: KnowledgeSeed,
        created_at: DateTime<Utc>,
    ) -> Result<KnowledgeItem, PipelineError> {
        let draft = KnowledgeItem::draft(id, seed, created_at);
        let item = self.rescore(&draft)?.unwrap_or(draft);
        self.store.knowledge.insert(item.clone())?;
        tracing::info!(
            knowledge_item_id = %id,
            title = %item.title,
            status = %item.status,
            score = item.confidence_score,
            "created knowledge item"
        );
        Ok(item)
    }

    /// Recompute counts, score and status from the authoritative evidence.
    ///
    /// Idempotent: with no new evidence nothing is written and the version
    /// does not move. Archived items are returned untouched.
    pub fn recompute(&self, id: KnowledgeItemId) -> Result<KnowledgeItem, PipelineError> {
        metrics::counter!("labs_recomputes_total").increment(1);
        let (before, after) = self.write(id, |current| {
            if current.status == KnowledgeStatus::Archived {
                return Ok(None);
            }
            self.rescore(current)
        })?;
        if before != after.status {
            tracing::info!(
                knowledge_item_id = %id,
                from = %before,
                to = %after.status,
                score = after.confidence_score,
                "knowledge item status changed"
            );
        }
        Ok(after)
    }

    /// `current` with fresh counts, score and status; `None` when unchanged
    fn rescore(&self, current: &KnowledgeItem) -> Result<Option<KnowledgeItem>, PipelineError> {
        let assessment = self.assess(current);
        let status = assessment.path.last().copied().unwrap_or(current.status);
        if assessment.tally == current.evidence
            && assessment.score == current.confidence_score
            && status == current.status
            && assessment.review_hold == current.review_hold
        {
            return Ok(None);
        }
        validate_path(current.status, &assessment.path).map_err(|_| {
            PipelineError::state_conflict("knowledge item", current.id, current.status, "recompute")
        })?;
        let mut next = current.clone();
        next.evidence = assessment.tally;
        next.confidence_score = assessment.score;
        next.status = status;
        next.review_hold = assessment.review_hold;
        Ok(Some(next))
    }

    /// Recompute every item, oldest first
    pub fn recompute_all(&self) -> Result<Vec<KnowledgeItem>, PipelineError> {
        let ids: Vec<KnowledgeItemId> = self.store.knowledge.all().iter().map(|i| i.id).collect();
        tracing::debug!("Recomputing {} knowledge items", ids.len());
        ids.into_iter().map(|id| self.recompute(id)).collect()
    }

    /// Move an item toward review without touching its score.
    ///
    /// Draft goes under review and published becomes challenged; items
    /// already under review or challenged keep their status. Either way
    /// promotion is held until new evidence arrives.
    pub fn trigger_review(&self, id: KnowledgeItemId) -> Result<KnowledgeItem, PipelineError> {
        let (before, after) = self.write(id, |current| {
            let target = match current.status {
                KnowledgeStatus::Draft => KnowledgeStatus::UnderReview,
                KnowledgeStatus::Published => KnowledgeStatus::Challenged,
                KnowledgeStatus::UnderReview | KnowledgeStatus::Challenged => current.status,
                KnowledgeStatus::Archived => {
                    return Err(PipelineError::state_conflict(
                        "knowledge item",
                        id,
                        current.status,
                        "trigger review",
                    ))
                }
            };
            if target != current.status {
                ensure_transition(id, current.status, target, "trigger review")?;
            }
            let hold = self.current_tally(current).sample_size();
            if target == current.status && current.review_hold == Some(hold) {
                return Ok(None);
            }
            let mut next = current.clone();
            next.status = target;
            next.review_hold = Some(hold);
            Ok(Some(next))
        })?;
        tracing::info!(
            knowledge_item_id = %id,
            from = %before,
            to = %after.status,
            "review triggered"
        );
        Ok(after)
    }

    /// Retire an item; it stops attracting evidence and is never recomputed
    pub fn archive(&self, id: KnowledgeItemId) -> Result<KnowledgeItem, PipelineError> {
        let (before, after) = self.write(id, |current| {
            ensure_transition(id, current.status, KnowledgeStatus::Archived, "archive")?;
            let mut next = current.clone();
            next.status = KnowledgeStatus::Archived;
            next.review_hold = None;
            Ok(Some(next))
        })?;
        self.locks.remove(&id);
        tracing::info!(knowledge_item_id = %id, from = %before, "archived knowledge item");
        Ok(after)
    }

    fn current_tally(&self, item: &KnowledgeItem) -> EvidenceTally {
        let observations = self
            .store
            .observations
            .filter(|o| self.resolver.attracts(item, &o.attribution));
        let experiments = self
            .store
            .experiments
            .filter(|e| e.knowledge_item_id == Some(item.id) && e.counts_as_evidence());
        scoring::tally(&observations, &experiments, &self.policy)
    }

    fn lock_for(&self, id: KnowledgeItemId) -> Arc<Mutex<()>> {
        self.locks.entry(id).or_default().clone()
    }

    /// Run `plan` under the item lock and commit its result.
    ///
    /// `plan` returns `None` when there is nothing to write. Returns the
    /// status before the write and the stored item after it.
    fn write<F>(
        &self,
        id: KnowledgeItemId,
        plan: F,
    ) -> Result<(KnowledgeStatus, KnowledgeItem), PipelineError>
    where
        F: Fn(&KnowledgeItem) -> Result<Option<KnowledgeItem>, PipelineError>,
    {
        // archived is terminal, so no writer can race on it
        let current = self.store.knowledge.require(id)?;
        if current.status == KnowledgeStatus::Archived && plan(&current)?.is_none() {
            return Ok((current.status, current));
        }
        let lock = self.lock_for(id);
        let _guard = lock.lock();
        match self.try_write(id, &plan) {
            Err(err @ PipelineError::ConcurrencyConflict { .. }) => {
                metrics::counter!("labs_recompute_conflicts_total").increment(1);
                tracing::warn!("Retrying knowledge item write after conflict: {}", err);
                self.try_write(id, &plan)
            }
            other => other,
        }
    }

    fn try_write<F>(
        &self,
        id: KnowledgeItemId,
        plan: &F,
    ) -> Result<(KnowledgeStatus, KnowledgeItem), PipelineError>
    where
        F: Fn(&KnowledgeItem) -> Result<Option<KnowledgeItem>, PipelineError>,
    {
        let current = self.store.knowledge.require(id)?;
        let before = current.status;
        match plan(&current)? {
            None => Ok((before, current)),
            Some(mut next) => {
                next.updated_at = Utc::now();
                let written = self.store.knowledge.compare_and_swap(current.version, next)?;
                Ok((before, written))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribution::CategoryResolver;
    use labs_model::{
        Attribution, CrewMemberId, KnowledgeType, Observation, ObservationId, ObservationSource,
        Outcome, ProjectId,
    };

    fn aggregator() -> (Arc<LabsStore>, Aggregator) {
        let store = Arc::new(LabsStore::new());
        let aggregator = Aggregator::new(
            Arc::clone(&store),
            Arc::new(CategoryResolver),
            ScoringPolicy::default(),
        );
        (store, aggregator)
    }

    fn observe(store: &LabsStore, category: &str, outcome: Outcome) {
        store
            .observations
            .append(Observation {
                id: ObservationId::new(),
                step: None,
                crew_member_id: CrewMemberId::new("crew"),
                project_id: ProjectId::new("p1"),
                outcome,
                note: None,
                photo_ref: None,
                captured_at: Utc::now(),
                attribution: Attribution::category(category),
                supervisor: None,
                source: ObservationSource::Checklist,
            })
            .unwrap();
    }

    fn create(aggregator: &Aggregator, category: &str) -> KnowledgeItem {
        aggregator
            .create(
                KnowledgeItemId::new(),
                KnowledgeSeed::for_attribution(
                    "Tile setting",
                    KnowledgeType::Procedure,
                    &Attribution::category(category),
                ),
                Utc::now(),
            )
            .unwrap()
    }

    #[test]
    fn counts_come_from_the_log() {
        let (store, aggregator) = aggregator();
        observe(&store, "tile", Outcome::Confirmed);
        observe(&store, "tile", Outcome::Deviated);
        observe(&store, "paint", Outcome::Confirmed);

        let item = create(&aggregator, "tile");
        assert_eq!(item.observation_count(), 2);
        assert_eq!(item.evidence.positive_units, 1);
        assert_eq!(item.confidence_score, scoring::confidence_score(1, 2, 1.96));
    }

    #[test]
    fn recompute_without_new_evidence_does_not_write() {
        let (store, aggregator) = aggregator();
        observe(&store, "tile", Outcome::Confirmed);
        let first = create(&aggregator, "tile");
        let second = aggregator.recompute(first.id).unwrap();
        assert_eq!(first.version, second.version);
        assert_eq!(first, second);
    }

    #[test]
    fn archived_items_are_left_alone() {
        let (store, aggregator) = aggregator();
        let item = create(&aggregator, "tile");
        let archived = aggregator.archive(item.id).unwrap();
        observe(&store, "tile", Outcome::Confirmed);

        let after = aggregator.recompute(item.id).unwrap();
        assert_eq!(after, archived);
        assert!(aggregator.archive(item.id).is_err());
        assert!(aggregator.trigger_review(item.id).is_err());
        assert!(!aggregator.locks.contains_key(&item.id));
    }

    #[test]
    fn created_items_land_scored_in_one_write() {
        let (store, aggregator) = aggregator();
        for _ in 0..9 {
            observe(&store, "tile", Outcome::Confirmed);
        }
        let item = create(&aggregator, "tile");
        assert_eq!(item.version, 0);
        assert_eq!(item.status, KnowledgeStatus::Published);
        assert_eq!(store.knowledge.get(item.id), Some(item.clone()));

        let err = aggregator
            .create(
                item.id,
                KnowledgeSeed::for_attribution(
                    "Duplicate",
                    KnowledgeType::Procedure,
                    &Attribution::category("paint"),
                ),
                Utc::now(),
            )
            .unwrap_err();
        assert!(!err.is_retryable(), "{err}");
        assert_eq!(store.knowledge.len(), 1);
        assert_eq!(store.knowledge.get(item.id), Some(item));
    }

    #[test]
    fn review_hold_waits_for_new_evidence() {
        let (store, aggregator) = aggregator();
        let item = create(&aggregator, "tile");
        for _ in 0..9 {
            observe(&store, "tile", Outcome::Confirmed);
        }
        let held = aggregator.trigger_review(item.id).unwrap();
        assert_eq!(held.status, KnowledgeStatus::UnderReview);
        assert_eq!(held.review_hold, Some(9));

        let still_held = aggregator.recompute(item.id).unwrap();
        assert_eq!(still_held.confidence_score, 70);
        assert_eq!(still_held.status, KnowledgeStatus::UnderReview);

        observe(&store, "tile", Outcome::Confirmed);
        let released = aggregator.recompute(item.id).unwrap();
        assert_eq!(released.status, KnowledgeStatus::Published);
        assert_eq!(released.review_hold, None);
    }

    #[test]
    fn review_of_published_item_challenges_it() {
        let (store, aggregator) = aggregator();
        for _ in 0..9 {
            observe(&store, "tile", Outcome::Confirmed);
        }
        let item = create(&aggregator, "tile");
        assert_eq!(item.status, KnowledgeStatus::Published);

        let challenged = aggregator.trigger_review(item.id).unwrap();
        assert_eq!(challenged.status, KnowledgeStatus::Challenged);
        assert_eq!(challenged.confidence_score, item.confidence_score);
    }

    #[test]
    fn negative_evidence_challenges_published_items() {
        let (store, aggregator) = aggregator();
        for _ in 0..9 {
            observe(&store, "tile", Outcome::Confirmed);
        }
        let item = create(&aggregator, "tile");
        assert_eq!(item.status, KnowledgeStatus::Published);

        for _ in 0..3 {
            observe(&store, "tile", Outcome::Flagged);
        }
        let after = aggregator.recompute(item.id).unwrap();
        assert!(after.confidence_score < 60);
        assert_eq!(after.status, KnowledgeStatus::Challenged);
    }

    #[test]
    fn competing_writers_do_not_lose_updates() {
        let (store, first) = aggregator();
        let second = Aggregator::new(
            Arc::clone(&store),
            Arc::new(CategoryResolver),
            ScoringPolicy::default(),
        );
        let item = create(&first, "tile");

        std::thread::scope(|scope| {
            for writer in [&first, &second] {
                let store = &store;
                scope.spawn(move || {
                    for _ in 0..20 {
                        observe(store, "tile", Outcome::Confirmed);
                        match writer.recompute(item.id) {
                            Ok(_) => {}
                            Err(err) => assert!(err.is_retryable(), "{err}"),
                        }
                    }
                });
            }
        });

        let settled = first.recompute(item.id).unwrap();
        assert_eq!(settled.observation_count(), 40);
    }
}
