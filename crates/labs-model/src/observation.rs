//! Field observations
//!
//! Observations are immutable. A correction is a new observation, never an
//! edit of an old one.

use crate::attribution::Attribution;
use crate::ids::{CrewMemberId, ObservationId, PhotoRef, ProjectId, SopId, SubmissionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What the crew member saw when the step was done
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Step went as the procedure describes
    Confirmed,
    /// Step needed a different approach
    Deviated,
    /// Something worth a second look
    Flagged,
}

impl Outcome {
    /// Counts as supporting evidence
    #[inline]
    #[must_use]
    pub fn is_positive(self) -> bool {
        matches!(self, Outcome::Confirmed)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Outcome::Confirmed => "confirmed",
            Outcome::Deviated => "deviated",
            Outcome::Flagged => "flagged",
        })
    }
}

/// Procedure step an observation was captured on
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepRef {
    pub sop_id: SopId,
    pub step_order: u32,
}

/// Where the observation came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum ObservationSource {
    /// Triggered by a checklist step
    Checklist,
    /// Logged while triaging a submission
    Submission(SubmissionId),
}

/// A single field data point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub id: ObservationId,
    /// Absent for observations logged from a submission
    pub step: Option<StepRef>,
    pub crew_member_id: CrewMemberId,
    pub project_id: ProjectId,
    pub outcome: Outcome,
    pub note: Option<String>,
    pub photo_ref: Option<PhotoRef>,
    pub captured_at: DateTime<Utc>,
    /// Resolved when captured; recomputes never consult the catalog again
    pub attribution: Attribution,
    /// Supervisor who co-signed, when one was required
    pub supervisor: Option<CrewMemberId>,
    pub source: ObservationSource,
}

impl Observation {
    /// Observation references the given SOP
    #[inline]
    #[must_use]
    pub fn references_sop(&self, sop_id: &SopId) -> bool {
        self.step.as_ref().is_some_and(|s| &s.sop_id == sop_id)
    }
}
