//! Training records
//!
//! Competency state per (crew member, SOP). Status is derived from the
//! recorded facts and can only rise; revocation is the one explicit way down.

use crate::ids::{CrewMemberId, SopId};
use crate::sop::SopConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Certification status
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingStatus {
    InProgress,
    ReviewReady,
    Certified,
}

impl fmt::Display for TrainingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TrainingStatus::InProgress => "in_progress",
            TrainingStatus::ReviewReady => "review_ready",
            TrainingStatus::Certified => "certified",
        })
    }
}

/// Per crew member, per SOP competency record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingRecord {
    pub crew_member_id: CrewMemberId,
    pub sop_id: SopId,
    pub status: TrainingStatus,
    pub supervised_completion_count: u32,
    pub best_review_score: Option<u32>,
    pub certified_at: Option<DateTime<Utc>>,
    pub revocations: u32,
    pub updated_at: DateTime<Utc>,
}

impl TrainingRecord {
    /// Fresh record
    #[must_use]
    pub fn new(crew_member_id: CrewMemberId, sop_id: SopId, now: DateTime<Utc>) -> Self {
        Self {
            crew_member_id,
            sop_id,
            status: TrainingStatus::InProgress,
            supervised_completion_count: 0,
            best_review_score: None,
            certified_at: None,
            revocations: 0,
            updated_at: now,
        }
    }

    /// Status the recorded facts support under the SOP's configuration
    #[must_use]
    pub fn earned_status(&self, config: &SopConfig) -> TrainingStatus {
        let completions_met =
            self.supervised_completion_count >= config.required_supervised_completions;
        let review_passed = self
            .best_review_score
            .is_some_and(|score| score >= config.review_pass_threshold);
        match (completions_met, review_passed) {
            (true, true) => TrainingStatus::Certified,
            (true, false) => TrainingStatus::ReviewReady,
            _ => TrainingStatus::InProgress,
        }
    }
}
