//! Confidence scoring
//!
//! Pure functions: evidence in, score and status out. The aggregator owns the
//! reads and writes around them.
//!
//! The score is the lower bound of the 95% Wilson interval on the share of
//! positive evidence units, floored to a whole percent. An observation is one
//! unit; a completed experiment is [`ScoringPolicy::experiment_weight`] units.
//! The bound rises with more positive evidence and with a larger sample at the
//! same rate, so a single confirmation can never publish an item.

use crate::config::ScoringPolicy;
use labs_model::{EvidenceTally, Experiment, KnowledgeStatus, Observation, Verdict};

/// Sum the evidence attributed to one item
#[must_use]
pub fn tally(
    observations: &[Observation],
    experiments: &[Experiment],
    policy: &ScoringPolicy,
) -> EvidenceTally {
    let mut tally = EvidenceTally::default();
    for observation in observations {
        tally.observation_count = tally.observation_count.saturating_add(1);
        tally.total_units = tally.total_units.saturating_add(1);
        if observation.outcome.is_positive() {
            tally.positive_units = tally.positive_units.saturating_add(1);
        }
    }
    for experiment in experiments.iter().filter(|e| e.counts_as_evidence()) {
        tally.experiment_count = tally.experiment_count.saturating_add(1);
        tally.total_units = tally.total_units.saturating_add(policy.experiment_weight);
        if experiment.verdict == Some(Verdict::Supported) {
            tally.positive_units = tally.positive_units.saturating_add(policy.experiment_weight);
        }
    }
    tally
}

/// Wilson lower bound of `positive / total`, as a whole percent
#[must_use]
pub fn confidence_score(positive: u32, total: u32, z: f64) -> u8 {
    if total == 0 {
        return 0;
    }
    let n = f64::from(total);
    let p = f64::from(positive.min(total)) / n;
    let z2 = z * z;
    let centre = p + z2 / (2.0 * n);
    let margin = z * (p * (1.0 - p) / n + z2 / (4.0 * n * n)).sqrt();
    let lower = (centre - margin) / (1.0 + z2 / n);
    // Nudge past representation error so exact percentages are not lost
    let percent = (lower * 100.0 + 1e-9).floor().clamp(0.0, 100.0);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let score = percent as u8;
    score
}

/// Item holds enough evidence, at a high enough score, to be published
#[must_use]
pub fn publishable(tally: &EvidenceTally, score: u8, policy: &ScoringPolicy) -> bool {
    score >= policy.publication_threshold
        && tally.observation_count >= policy.min_published_observations
        && tally.sample_size() >= policy.min_review_evidence
}

/// Statuses an item moves through given fresh evidence, in order.
///
/// Empty when nothing changes. Archived items never move; `held` suppresses
/// promotion while a manually triggered review is waiting for new evidence.
#[must_use]
pub fn status_path(
    current: KnowledgeStatus,
    tally: &EvidenceTally,
    score: u8,
    held: bool,
    policy: &ScoringPolicy,
) -> Vec<KnowledgeStatus> {
    let mut path = Vec::new();
    let mut status = current;

    if status == KnowledgeStatus::Draft && !held && tally.sample_size() >= policy.min_review_evidence
    {
        status = KnowledgeStatus::UnderReview;
        path.push(status);
    }
    if status == KnowledgeStatus::UnderReview && !held && publishable(tally, score, policy) {
        status = KnowledgeStatus::Published;
        path.push(status);
    }
    match status {
        KnowledgeStatus::Published if score < policy.challenge_threshold => {
            path.push(KnowledgeStatus::Challenged);
        }
        KnowledgeStatus::Challenged if !held && publishable(tally, score, policy) => {
            path.push(KnowledgeStatus::Published);
        }
        _ => {}
    }
    path
}
