//! Experiments
//!
//! A structured, falsifiable test of a product, technique, tool, system or
//! durability hypothesis. Results accumulate while the experiment is active;
//! completion turns them into a verdict.

use crate::attribution::Attribution;
use crate::ids::{BallotId, CrewMemberId, ExperimentId, KnowledgeItemId, SubmissionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Experiment lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentStatus {
    Draft,
    Active,
    Completed,
    /// Stopped early, never produces knowledge
    Terminated,
}

impl fmt::Display for ExperimentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExperimentStatus::Draft => "draft",
            ExperimentStatus::Active => "active",
            ExperimentStatus::Completed => "completed",
            ExperimentStatus::Terminated => "terminated",
        })
    }
}

/// What kind of hypothesis is being tested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HypothesisKind {
    #[default]
    Product,
    Technique,
    Tool,
    System,
    Durability,
}

/// One recorded result entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentResult {
    pub passed: bool,
    /// Field observations backing this entry (at least one is assumed)
    pub observation_count: u32,
    pub note: Option<String>,
    pub recorded_by: CrewMemberId,
    pub recorded_at: DateTime<Utc>,
}

impl ExperimentResult {
    /// Create a result entry backed by a single observation
    #[inline]
    #[must_use]
    pub fn new(passed: bool, recorded_by: CrewMemberId) -> Self {
        Self {
            passed,
            observation_count: 1,
            note: None,
            recorded_by,
            recorded_at: Utc::now(),
        }
    }

    /// With observation count
    #[inline]
    #[must_use]
    pub fn with_observations(mut self, count: u32) -> Self {
        self.observation_count = count;
        self
    }

    /// With note
    #[inline]
    #[must_use]
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    fn weight(&self) -> u32 {
        self.observation_count.max(1)
    }
}

/// Outcome of a completed experiment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Passing results outweigh failing ones
    Supported,
    /// Failing results outweigh passing ones
    Refuted,
    /// Evenly split; produces no knowledge
    Inconclusive,
}

impl Verdict {
    /// Weigh a set of results
    #[must_use]
    pub fn from_results(results: &[ExperimentResult]) -> Self {
        let (passes, fails) = results.iter().fold((0u64, 0u64), |(p, f), r| {
            if r.passed {
                (p + u64::from(r.weight()), f)
            } else {
                (p, f + u64::from(r.weight()))
            }
        });
        match passes.cmp(&fails) {
            std::cmp::Ordering::Greater => Verdict::Supported,
            std::cmp::Ordering::Less => Verdict::Refuted,
            std::cmp::Ordering::Equal => Verdict::Inconclusive,
        }
    }

    /// Verdict yields a knowledge item
    #[inline]
    #[must_use]
    pub fn produces_knowledge(self) -> bool {
        !matches!(self, Verdict::Inconclusive)
    }
}

/// How the experiment entered the pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum ExperimentOrigin {
    Direct,
    Submission(SubmissionId),
}

/// Who moved the experiment from draft to active
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum Activation {
    /// Direct admin activation
    Admin,
    /// Won a weekly ballot
    Ballot(BallotId),
}

/// Input for creating an experiment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentProposal {
    pub title: String,
    pub category: String,
    pub kind: HypothesisKind,
    pub match_criteria: Vec<String>,
}

impl ExperimentProposal {
    /// Create a proposal
    #[inline]
    #[must_use]
    pub fn new(title: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            category: category.into(),
            kind: HypothesisKind::default(),
            match_criteria: Vec::new(),
        }
    }

    /// With hypothesis kind
    #[inline]
    #[must_use]
    pub fn with_kind(mut self, kind: HypothesisKind) -> Self {
        self.kind = kind;
        self
    }

    /// With match criteria tags
    #[inline]
    #[must_use]
    pub fn with_criteria<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.match_criteria = tags.into_iter().map(Into::into).collect();
        self
    }
}

/// A structured hypothesis test
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Experiment {
    pub id: ExperimentId,
    pub title: String,
    pub category: String,
    pub kind: HypothesisKind,
    pub match_criteria: Vec<String>,
    pub status: ExperimentStatus,
    pub created_at: DateTime<Utc>,
    pub results: Vec<ExperimentResult>,
    pub verdict: Option<Verdict>,
    /// Set at completion when the verdict produced knowledge
    pub knowledge_item_id: Option<KnowledgeItemId>,
    pub origin: ExperimentOrigin,
    pub activation: Option<Activation>,
    pub terminated_reason: Option<String>,
}

impl Experiment {
    /// Create a draft experiment
    #[must_use]
    pub fn draft(
        id: ExperimentId,
        proposal: ExperimentProposal,
        origin: ExperimentOrigin,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            title: proposal.title,
            category: proposal.category,
            kind: proposal.kind,
            match_criteria: proposal.match_criteria,
            status: ExperimentStatus::Draft,
            created_at,
            results: Vec::new(),
            verdict: None,
            knowledge_item_id: None,
            origin,
            activation: None,
            terminated_reason: None,
        }
    }

    /// Attribution key for the knowledge this experiment feeds
    #[must_use]
    pub fn attribution(&self) -> Attribution {
        Attribution::new(&self.category, self.match_criteria.iter().map(String::as_str))
    }

    /// Completed with a verdict that counts toward knowledge
    #[inline]
    #[must_use]
    pub fn counts_as_evidence(&self) -> bool {
        self.status == ExperimentStatus::Completed
            && self.verdict.is_some_and(Verdict::produces_knowledge)
    }
}
