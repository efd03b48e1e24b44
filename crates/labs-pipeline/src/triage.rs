//! Submission triage
//!
//! Crew file free-form reports; an admin reviews each one exactly once and
//! picks what it becomes. The review runs `submitted -> reviewed -> outcome`
//! as a single write, with both steps kept in the submission's history.

use crate::error::{ensure_transition, PipelineError};
use crate::pipeline::LabsPipeline;
use chrono::Utc;
use labs_model::{
    Attribution, CrewMemberId, Experiment, ExperimentId, ExperimentOrigin, ExperimentProposal,
    KnowledgeItemId, KnowledgeStatus, Observation, ObservationId, ObservationSource, Outcome,
    Resolution, ReviewDecision, StatusChange, Submission, SubmissionId, SubmissionReport,
    SubmissionStatus,
};
use labs_store::JournalEvent;

const MAX_TITLE_CHARS: usize = 80;

impl LabsPipeline {
    /// File a report for triage
    ///
    /// # Errors
    /// - `Validation` for an empty category or description
    /// - `NotFound` when the report names a knowledge item that does not exist
    pub fn submit(&self, report: SubmissionReport) -> Result<Submission, PipelineError> {
        if report.category.trim().is_empty() {
            return Err(PipelineError::validation(
                "category",
                "pick a work category so the report can be attributed",
            ));
        }
        if report.description.trim().is_empty() {
            return Err(PipelineError::validation(
                "description",
                "describe what was seen before submitting",
            ));
        }
        if let Some(id) = report.knowledge_item_id {
            self.store.knowledge.require(id)?;
        }
        let submission = Submission::from_report(SubmissionId::new(), report, Utc::now());
        let id = submission.id;
        self.commit(JournalEvent::SubmissionFiled { submission })?;
        tracing::info!(submission_id = %id, "submission filed");
        Ok(self.store.submissions.require(&id)?)
    }

    /// Review a submitted report
    ///
    /// # Errors
    /// - `StateConflict` carrying the current status if it was already reviewed
    pub fn review(
        &self,
        id: SubmissionId,
        decision: ReviewDecision,
        reviewer: &CrewMemberId,
    ) -> Result<Submission, PipelineError> {
        let _guard = self.triage_lock.lock();
        let submission = self.store.submissions.require(&id)?;
        if submission.status != SubmissionStatus::Submitted {
            return Err(PipelineError::state_conflict(
                "submission",
                id,
                submission.status,
                "review",
            ));
        }
        let target = decision.target_status();
        ensure_transition(id, SubmissionStatus::Submitted, SubmissionStatus::Reviewed, "review")?;
        ensure_transition(id, SubmissionStatus::Reviewed, target, "review")?;

        let resolution = match decision {
            ReviewDecision::LogAsObservation => {
                let observation = Observation {
                    id: ObservationId::new(),
                    step: None,
                    crew_member_id: submission.author_id.clone(),
                    project_id: submission.project_id.clone(),
                    outcome: Outcome::Flagged,
                    note: Some(submission.description.clone()),
                    photo_ref: None,
                    captured_at: Utc::now(),
                    attribution: Attribution::category(&submission.category),
                    supervisor: None,
                    source: ObservationSource::Submission(id),
                };
                let observation_id = observation.id;
                self.record_observation(observation, &title_from(&submission.description))?;
                Resolution::Observation(observation_id)
            }
            ReviewDecision::PromoteToExperiment => {
                let experiment = Experiment::draft(
                    ExperimentId::new(),
                    ExperimentProposal::new(
                        title_from(&submission.description),
                        submission.category.clone(),
                    ),
                    ExperimentOrigin::Submission(id),
                    Utc::now(),
                );
                let experiment_id = experiment.id;
                self.commit(JournalEvent::ExperimentCreated { experiment })?;
                Resolution::Experiment(experiment_id)
            }
            ReviewDecision::TriggerReview => {
                let targets = self.review_targets(&submission);
                for &target in &targets {
                    self.commit(JournalEvent::KnowledgeReviewTriggered { id: target })?;
                }
                Resolution::Review(targets)
            }
            ReviewDecision::Archive => Resolution::Archived,
        };

        let now = Utc::now();
        let mut reviewed = submission;
        reviewed.history.push(StatusChange {
            from: SubmissionStatus::Submitted,
            to: SubmissionStatus::Reviewed,
            at: now,
        });
        reviewed.history.push(StatusChange {
            from: SubmissionStatus::Reviewed,
            to: target,
            at: now,
        });
        reviewed.status = target;
        reviewed.resolution = Some(resolution);
        reviewed.reviewed_by = Some(reviewer.clone());
        reviewed.reviewed_at = Some(now);
        self.commit(JournalEvent::SubmissionReviewed {
            submission: reviewed,
        })?;
        tracing::info!(submission_id = %id, status = %target, reviewer = %reviewer, "submission reviewed");
        Ok(self.store.submissions.require(&id)?)
    }

    /// Submissions still waiting for review, oldest first
    #[must_use]
    pub fn pending_submissions(&self) -> Vec<Submission> {
        let mut pending = self
            .store
            .submissions
            .filter(|s| s.status == SubmissionStatus::Submitted);
        pending.sort_by_key(|s| (s.created_at, s.id));
        pending
    }

    /// Explicitly linked item if it is live, otherwise items matching the
    /// submission's category
    fn review_targets(&self, submission: &Submission) -> Vec<KnowledgeItemId> {
        let linked = submission
            .knowledge_item_id
            .and_then(|id| self.store.knowledge.get(id))
            .filter(|item| item.status != KnowledgeStatus::Archived);
        match linked {
            Some(item) => vec![item.id],
            None => self
                .resolver
                .resolve(&self.store.knowledge, &Attribution::category(&submission.category))
                .into_iter()
                .map(|item| item.id)
                .collect(),
        }
    }

    pub(crate) fn apply_submission_filed(&self, submission: &Submission) -> Result<(), PipelineError> {
        self.store
            .submissions
            .insert_new(submission.id, submission.clone())?;
        Ok(())
    }

    pub(crate) fn apply_submission_reviewed(
        &self,
        submission: &Submission,
    ) -> Result<(), PipelineError> {
        self.store.submissions.update(&submission.id, |current| {
            if current.status != SubmissionStatus::Submitted {
                return Err(PipelineError::state_conflict(
                    "submission",
                    current.id,
                    current.status,
                    "review",
                ));
            }
            *current = submission.clone();
            Ok(())
        })?;
        Ok(())
    }
}

/// First line of the description, shortened for use as a title
fn title_from(description: &str) -> String {
    let line = description.lines().next().unwrap_or_default().trim();
    if line.is_empty() {
        return "Untitled submission".to_string();
    }
    if line.chars().count() <= MAX_TITLE_CHARS {
        return line.to_string();
    }
    let mut title: String = line.chars().take(MAX_TITLE_CHARS - 1).collect();
    title.push('…');
    title
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn titles_use_the_first_line() {
        assert_eq!(title_from("Grout cracked\nnear the tub"), "Grout cracked");
        assert_eq!(title_from("   "), "Untitled submission");
        let long = "x".repeat(200);
        assert_eq!(title_from(&long).chars().count(), MAX_TITLE_CHARS);
    }
}
