//! Observation confirmation
//!
//! Turns a draft from the trigger evaluator into an immutable observation.
//! Validation happens here, before anything is written.

use crate::error::PipelineError;
use crate::trigger::ObservationDraft;
use chrono::{DateTime, Utc};
use labs_model::{
    CrewMemberId, KnowledgeItem, Observation, ObservationId, ObservationSource, Outcome, PhotoRef,
    StepRef,
};
use serde::{Deserialize, Serialize};

/// What the crew member filled in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmRequest {
    pub outcome: Outcome,
    pub note: Option<String>,
    pub photo_ref: Option<PhotoRef>,
    pub supervisor: Option<CrewMemberId>,
}

impl ConfirmRequest {
    /// Request with the given outcome and nothing else
    #[inline]
    #[must_use]
    pub fn new(outcome: Outcome) -> Self {
        Self {
            outcome,
            note: None,
            photo_ref: None,
            supervisor: None,
        }
    }

    /// One-tap confirmation
    #[inline]
    #[must_use]
    pub fn confirmed() -> Self {
        Self::new(Outcome::Confirmed)
    }

    /// With note
    #[inline]
    #[must_use]
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// With photo
    #[inline]
    #[must_use]
    pub fn with_photo(mut self, photo_ref: PhotoRef) -> Self {
        self.photo_ref = Some(photo_ref);
        self
    }

    /// Co-signed by a supervisor
    #[inline]
    #[must_use]
    pub fn cosigned_by(mut self, supervisor: CrewMemberId) -> Self {
        self.supervisor = Some(supervisor);
        self
    }

    fn has_note(&self) -> bool {
        self.note.as_deref().is_some_and(|n| !n.trim().is_empty())
    }
}

/// Result of a confirmation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    /// The stored observation
    pub observation: Observation,
    /// Knowledge items the observation counted toward, after recompute
    pub knowledge_items: Vec<KnowledgeItem>,
}

/// Check `request` against what `draft` requires
pub fn validate(draft: &ObservationDraft, request: &ConfirmRequest) -> Result<(), PipelineError> {
    if draft.required.needs_note(request.outcome) && !request.has_note() {
        return Err(PipelineError::validation(
            "note",
            format!(
                "a note is required for a {} observation on step {} of {}",
                request.outcome, draft.step_order, draft.sop_id
            ),
        ));
    }
    if draft.required.photo && request.photo_ref.is_none() {
        return Err(PipelineError::validation(
            "photo_ref",
            format!("procedure {} asks for a photo on every observation", draft.sop_id),
        ));
    }
    if draft.requires_cosign {
        match &request.supervisor {
            None => {
                return Err(PipelineError::validation(
                    "supervisor",
                    format!(
                        "{} is not certified on {}; a supervisor must co-sign",
                        draft.crew_member_id, draft.sop_id
                    ),
                ))
            }
            Some(supervisor) if supervisor == &draft.crew_member_id => {
                return Err(PipelineError::validation(
                    "supervisor",
                    "crew members cannot co-sign their own observations",
                ))
            }
            Some(_) => {}
        }
    }
    Ok(())
}

/// Build the observation a validated request describes
#[must_use]
pub fn observation_from(
    draft: &ObservationDraft,
    request: ConfirmRequest,
    id: ObservationId,
    captured_at: DateTime<Utc>,
) -> Observation {
    Observation {
        id,
        step: Some(StepRef {
            sop_id: draft.sop_id.clone(),
            step_order: draft.step_order,
        }),
        crew_member_id: draft.crew_member_id.clone(),
        project_id: draft.project_id.clone(),
        outcome: request.outcome,
        note: request.note.filter(|n| !n.trim().is_empty()),
        photo_ref: request.photo_ref,
        captured_at,
        attribution: draft.attribution.clone(),
        supervisor: request.supervisor,
        source: ObservationSource::Checklist,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trigger::RequiredFields;
    use labs_model::{Attribution, ObservationMode, ProjectId, SopId};

    fn draft(mode: ObservationMode, requires_cosign: bool) -> ObservationDraft {
        ObservationDraft {
            sop_id: SopId::new("tile"),
            step_order: 2,
            step_title: "Set tile".into(),
            sop_title: "Tile floor".into(),
            crew_member_id: CrewMemberId::new("ana"),
            project_id: ProjectId::new("p1"),
            mode,
            attribution: Attribution::category("tile"),
            suggested_outcome: Outcome::Confirmed,
            required: RequiredFields::for_mode(mode, requires_cosign),
            requires_cosign,
            checked_at: Utc::now(),
        }
    }

    #[test]
    fn standard_mode_needs_a_note_for_deviations() {
        let draft = draft(ObservationMode::Standard, false);
        assert!(validate(&draft, &ConfirmRequest::confirmed()).is_ok());
        let err = validate(&draft, &ConfirmRequest::new(Outcome::Deviated).with_note("  ")).unwrap_err();
        assert!(matches!(err, PipelineError::Validation { field: "note", .. }));
        assert!(validate(
            &draft,
            &ConfirmRequest::new(Outcome::Deviated).with_note("thinset skinned over")
        )
        .is_ok());
    }

    #[test]
    fn detailed_mode_needs_note_and_photo() {
        let draft = draft(ObservationMode::Detailed, false);
        let noted = ConfirmRequest::confirmed().with_note("flat within 1/8");
        let err = validate(&draft, &noted).unwrap_err();
        assert!(matches!(err, PipelineError::Validation { field: "photo_ref", .. }));
        assert!(validate(&draft, &noted.with_photo(PhotoRef::new("img-1"))).is_ok());
    }

    #[test]
    fn cosign_needs_someone_else() {
        let draft = draft(ObservationMode::Minimal, true);
        assert!(validate(&draft, &ConfirmRequest::confirmed()).is_err());
        assert!(validate(
            &draft,
            &ConfirmRequest::confirmed().cosigned_by(CrewMemberId::new("ana"))
        )
        .is_err());
        assert!(validate(
            &draft,
            &ConfirmRequest::confirmed().cosigned_by(CrewMemberId::new("lead"))
        )
        .is_ok());
    }

    #[test]
    fn observation_carries_the_step() {
        let draft = draft(ObservationMode::Minimal, false);
        let observation = observation_from(
            &draft,
            ConfirmRequest::confirmed(),
            ObservationId::new(),
            Utc::now(),
        );
        assert!(observation.references_sop(&SopId::new("tile")));
        assert_eq!(observation.source, ObservationSource::Checklist);
        assert_eq!(observation.note, None);
    }
}
