//! Confidence aggregation, knowledge status and the training gate

use labs_model::{KnowledgeStatus, Outcome, TrainingStatus};
use labs_pipeline::{PipelineConfig, PipelineError, ScoringPolicy};
use labs_test_utils::*;
use pretty_assertions::assert_eq;

#[test]
fn status_follows_the_evidence() {
    let pipeline = pipeline();
    let mut seen = Vec::new();
    for n in 0..9 {
        let confirmation = observe(&pipeline, TILE, 2, &crew(&format!("crew-{n}")), Outcome::Confirmed);
        let item = &confirmation.knowledge_items[0];
        seen.push((item.observation_count(), item.confidence_score, item.status));
    }

    assert_eq!(seen[0], (1, 20, KnowledgeStatus::Draft));
    assert_eq!(seen[3], (4, 51, KnowledgeStatus::Draft));
    assert_eq!(seen[4], (5, 56, KnowledgeStatus::UnderReview));
    assert_eq!(seen[7], (8, 67, KnowledgeStatus::UnderReview));
    assert_eq!(seen[8], (9, 70, KnowledgeStatus::Published));
}

#[test]
fn challenged_items_recover_with_enough_support() {
    let pipeline = pipeline();
    observe_many(&pipeline, TILE, 2, Outcome::Confirmed, 9);
    observe(&pipeline, TILE, 3, &crew("ben"), Outcome::Flagged);
    let item = pipeline.knowledge_items().remove(0);
    assert_eq!(item.status, KnowledgeStatus::Challenged);
    assert_eq!(item.confidence_score, 59);

    for n in 0..10 {
        observe(&pipeline, TILE, 2, &crew(&format!("late-{n}")), Outcome::Confirmed);
    }
    let item = pipeline.knowledge_item(item.id).unwrap();
    assert_eq!(item.observation_count(), 20);
    assert_eq!(item.status, KnowledgeStatus::Published);
    assert!(item.confidence_score >= 70);
}

#[test]
fn recompute_without_new_evidence_writes_nothing() {
    let pipeline = pipeline();
    observe_many(&pipeline, TILE, 2, Outcome::Confirmed, 6);
    let before = pipeline.knowledge_items().remove(0);

    let first = pipeline.recompute(before.id).unwrap();
    let second = pipeline.recompute(before.id).unwrap();
    assert_eq!(first, before);
    assert_eq!(second, before);
    assert_eq!(pipeline.recompute_all().unwrap(), vec![before]);
}

#[test]
fn archived_items_stop_collecting_evidence() {
    let pipeline = pipeline();
    observe_many(&pipeline, TILE, 2, Outcome::Confirmed, 3);
    let old = pipeline.knowledge_items().remove(0);

    let archived = pipeline.archive_knowledge(old.id).unwrap();
    assert_eq!(archived.status, KnowledgeStatus::Archived);
    let err = pipeline.archive_knowledge(old.id).unwrap_err();
    assert!(matches!(err, PipelineError::StateConflict { .. }));

    let confirmation = observe(&pipeline, TILE, 2, &crew("ana"), Outcome::Confirmed);
    assert_eq!(confirmation.knowledge_items.len(), 1);
    let fresh = &confirmation.knowledge_items[0];
    assert_ne!(fresh.id, old.id);
    // the category's earlier evidence is attributed to the replacement
    assert_eq!(fresh.observation_count(), 4);
    assert_eq!(fresh.status, KnowledgeStatus::Draft);

    let untouched = pipeline.recompute(old.id).unwrap();
    assert_eq!(untouched, archived);
    assert_eq!(pipeline.summary().knowledge_by_status[&KnowledgeStatus::Archived], 1);
    assert_eq!(pipeline.summary().knowledge_by_status[&KnowledgeStatus::Draft], 1);
}

#[test]
fn stricter_policy_delays_publication() {
    let policy = ScoringPolicy {
        publication_threshold: 75,
        challenge_threshold: 65,
        ..ScoringPolicy::default()
    };
    let pipeline = pipeline_with(PipelineConfig::new().with_scoring(policy));
    observe_many(&pipeline, TILE, 2, Outcome::Confirmed, 11);
    let item = pipeline.knowledge_items().remove(0);
    assert_eq!(item.status, KnowledgeStatus::UnderReview);

    observe(&pipeline, TILE, 2, &crew("ana"), Outcome::Confirmed);
    let item = pipeline.knowledge_item(item.id).unwrap();
    assert_eq!(item.confidence_score, 75);
    assert_eq!(item.status, KnowledgeStatus::Published);
}

#[test]
fn invalid_policy_is_rejected_up_front() {
    let policy = ScoringPolicy {
        challenge_threshold: 80,
        ..ScoringPolicy::default()
    };
    let err = labs_pipeline::LabsPipeline::new(
        PipelineConfig::new().with_scoring(policy),
        registry(),
    )
    .unwrap_err();
    assert!(matches!(err, PipelineError::Config(_)));
}

#[test]
fn certification_needs_both_facts_in_either_order() {
    let pipeline = pipeline();
    let tile = sop(TILE);

    let ana = crew("ana");
    for _ in 0..2 {
        pipeline.record_supervised_completion(&ana, &tile).unwrap();
    }
    assert_eq!(pipeline.training_status(&ana, &tile), TrainingStatus::InProgress);
    let record = pipeline.record_supervised_completion(&ana, &tile).unwrap();
    assert_eq!(record.status, TrainingStatus::ReviewReady);
    let record = pipeline.record_review_score(&ana, &tile, 7).unwrap();
    assert_eq!(record.status, TrainingStatus::ReviewReady);
    let record = pipeline.record_review_score(&ana, &tile, 9).unwrap();
    assert_eq!(record.status, TrainingStatus::Certified);
    assert!(record.certified_at.is_some());

    let ben = crew("ben");
    let record = pipeline.record_review_score(&ben, &tile, 10).unwrap();
    assert_eq!(record.status, TrainingStatus::InProgress);
    for _ in 0..3 {
        pipeline.record_supervised_completion(&ben, &tile).unwrap();
    }
    assert_eq!(pipeline.training_status(&ben, &tile), TrainingStatus::Certified);
}

#[test]
fn best_review_score_is_kept() {
    let pipeline = pipeline();
    let ana = crew("ana");
    let tile = sop(TILE);
    pipeline.record_review_score(&ana, &tile, 9).unwrap();
    let record = pipeline.record_review_score(&ana, &tile, 4).unwrap();
    assert_eq!(record.best_review_score, Some(9));
}

#[test]
fn review_scores_are_checked_against_the_procedure() {
    let pipeline = pipeline();
    let ana = crew("ana");

    let err = pipeline
        .record_review_score(&ana, &sop(MEMBRANE), 6)
        .unwrap_err();
    assert!(matches!(err, PipelineError::Validation { field: "score", .. }));
    assert!(pipeline.training_record(&ana, &sop(MEMBRANE)).is_none());

    let err = pipeline
        .record_supervised_completion(&ana, &sop("unknown"))
        .unwrap_err();
    assert!(matches!(err, PipelineError::ConfigurationMissing { .. }));
    assert!(pipeline.store().journal.is_empty());
}

#[test]
fn revocation_restarts_training() {
    let pipeline = pipeline();
    let ana = crew("ana");
    let tile = sop(TILE);
    certify(&pipeline, &ana, &tile);
    assert!(!check(&pipeline, TILE, 2, &ana).requires_cosign);

    let record = pipeline.revoke_certification(&ana, &tile).unwrap();
    assert_eq!(record.status, TrainingStatus::InProgress);
    assert_eq!(record.supervised_completion_count, 0);
    assert_eq!(record.revocations, 1);
    assert!(check(&pipeline, TILE, 2, &ana).requires_cosign);

    let err = pipeline.revoke_certification(&crew("nobody"), &tile).unwrap_err();
    assert!(matches!(err, PipelineError::NotFound { .. }));
}
