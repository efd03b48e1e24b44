//! Crew submissions
//!
//! Free-form reports that are not tied to a checklist step. Triage moves a
//! submission forward exactly once and leaves a forward reference to whatever
//! the decision created.

use crate::ids::{CrewMemberId, ExperimentId, KnowledgeItemId, ObservationId, ProjectId, SubmissionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Submission triage status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Submitted,
    Reviewed,
    LoggedAsObservation,
    PromotedToExperiment,
    TriggeredReview,
    Archived,
}

impl SubmissionStatus {
    /// Every status, in lifecycle order
    pub const ALL: [SubmissionStatus; 6] = [
        SubmissionStatus::Submitted,
        SubmissionStatus::Reviewed,
        SubmissionStatus::LoggedAsObservation,
        SubmissionStatus::PromotedToExperiment,
        SubmissionStatus::TriggeredReview,
        SubmissionStatus::Archived,
    ];
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SubmissionStatus::Submitted => "submitted",
            SubmissionStatus::Reviewed => "reviewed",
            SubmissionStatus::LoggedAsObservation => "logged_as_observation",
            SubmissionStatus::PromotedToExperiment => "promoted_to_experiment",
            SubmissionStatus::TriggeredReview => "triggered_review",
            SubmissionStatus::Archived => "archived",
        })
    }
}

/// Triage decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    LogAsObservation,
    PromoteToExperiment,
    TriggerReview,
    Archive,
}

impl ReviewDecision {
    /// Terminal status the decision lands on
    #[inline]
    #[must_use]
    pub fn target_status(self) -> SubmissionStatus {
        match self {
            ReviewDecision::LogAsObservation => SubmissionStatus::LoggedAsObservation,
            ReviewDecision::PromoteToExperiment => SubmissionStatus::PromotedToExperiment,
            ReviewDecision::TriggerReview => SubmissionStatus::TriggeredReview,
            ReviewDecision::Archive => SubmissionStatus::Archived,
        }
    }
}

/// Forward reference left by a triage decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "target")]
pub enum Resolution {
    Observation(ObservationId),
    Experiment(ExperimentId),
    /// Knowledge items flagged for review; may be empty when nothing matched
    Review(Vec<KnowledgeItemId>),
    Archived,
}

/// Recorded status change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange<S> {
    pub from: S,
    pub to: S,
    pub at: DateTime<Utc>,
}

/// Report as filed by a crew member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionReport {
    pub author_id: CrewMemberId,
    pub project_id: ProjectId,
    pub category: String,
    pub description: String,
    /// Knowledge item the report is about, when the author knows it
    pub knowledge_item_id: Option<KnowledgeItemId>,
}

impl SubmissionReport {
    /// Create a report
    #[inline]
    #[must_use]
    pub fn new(
        author_id: CrewMemberId,
        project_id: ProjectId,
        category: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            author_id,
            project_id,
            category: category.into(),
            description: description.into(),
            knowledge_item_id: None,
        }
    }

    /// About a specific knowledge item
    #[inline]
    #[must_use]
    pub fn about(mut self, knowledge_item_id: KnowledgeItemId) -> Self {
        self.knowledge_item_id = Some(knowledge_item_id);
        self
    }
}

/// A triaged or pending submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub id: SubmissionId,
    pub author_id: CrewMemberId,
    pub project_id: ProjectId,
    pub category: String,
    pub description: String,
    pub knowledge_item_id: Option<KnowledgeItemId>,
    pub status: SubmissionStatus,
    pub created_at: DateTime<Utc>,
    pub resolution: Option<Resolution>,
    pub reviewed_by: Option<CrewMemberId>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub history: Vec<StatusChange<SubmissionStatus>>,
}

impl Submission {
    /// Create a pending submission from a report
    #[must_use]
    pub fn from_report(id: SubmissionId, report: SubmissionReport, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            author_id: report.author_id,
            project_id: report.project_id,
            category: report.category,
            description: report.description,
            knowledge_item_id: report.knowledge_item_id,
            status: SubmissionStatus::Submitted,
            created_at,
            resolution: None,
            reviewed_by: None,
            reviewed_at: None,
            history: Vec::new(),
        }
    }
}
