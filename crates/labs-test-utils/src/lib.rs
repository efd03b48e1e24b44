//! Testing utilities for the labs workspace
//!
//! Shared fixtures: a small SOP catalog covering each observation mode, a
//! pipeline wired to it, and helpers for driving crew through capture and
//! certification.

#![allow(missing_docs)]

use labs_model::{
    CrewMemberId, ObservationMode, Outcome, ProjectId, ScriptPhase, Sop, SopConfig, SopId,
};
use labs_pipeline::{
    CheckEvent, ConfirmRequest, Confirmation, LabsPipeline, ObservationDraft, PipelineConfig,
};
use labs_store::{SopCatalog, SopRegistry};
use std::sync::Arc;

/// Minimal-mode tiling procedure; steps 2 and 3 generate observations
pub const TILE: &str = "tile-floor";
/// Standard-mode painting procedure; step 1 generates observations
pub const PAINT: &str = "paint-walls";
/// Detailed-mode waterproofing procedure; step 1 generates observations
pub const MEMBRANE: &str = "shower-membrane";

/// Crew member who co-signs for uncertified crew
pub const SUPERVISOR: &str = "sam";

pub fn tile_sop() -> Sop {
    Sop::new(SopId::new(TILE), "Tile floor install", "tile")
        .with_tags(["grout", "thinset"])
        .with_mode(ObservationMode::Minimal)
        .with_step("Protect adjacent finishes", false, Some(ScriptPhase::Shield))
        .with_step("Set tile on thinset", true, Some(ScriptPhase::Install))
        .with_step("Grout and clean", true, Some(ScriptPhase::Punch))
}

pub fn paint_sop() -> Sop {
    Sop::new(SopId::new(PAINT), "Interior wall paint", "paint")
        .with_mode(ObservationMode::Standard)
        .with_step("Cut in edges", true, Some(ScriptPhase::Install))
        .with_step("Walkthrough", false, Some(ScriptPhase::Turnover))
}

pub fn membrane_sop() -> Sop {
    Sop::new(SopId::new(MEMBRANE), "Shower waterproofing", "waterproofing")
        .with_mode(ObservationMode::Detailed)
        .with_config(SopConfig {
            default_observation_mode: ObservationMode::Detailed,
            required_supervised_completions: 2,
            review_question_count: 5,
            review_pass_threshold: 4,
        })
        .with_step("Flood test", true, Some(ScriptPhase::Ready))
}

/// Registry holding every fixture procedure
pub fn registry() -> Arc<SopRegistry> {
    let registry = Arc::new(SopRegistry::new());
    for sop in [tile_sop(), paint_sop(), membrane_sop()] {
        registry.register(sop).unwrap();
    }
    registry
}

pub fn pipeline() -> LabsPipeline {
    pipeline_with(PipelineConfig::new())
}

pub fn pipeline_with(config: PipelineConfig) -> LabsPipeline {
    pipeline_over(config, registry())
}

pub fn pipeline_over(config: PipelineConfig, registry: Arc<SopRegistry>) -> LabsPipeline {
    LabsPipeline::new(config, registry as Arc<dyn SopCatalog>).unwrap()
}

pub fn crew(name: &str) -> CrewMemberId {
    CrewMemberId::new(name)
}

pub fn project() -> ProjectId {
    ProjectId::new("job-1042")
}

pub fn sop(id: &str) -> SopId {
    SopId::new(id)
}

/// Record enough supervised completions and a perfect review to certify
pub fn certify(pipeline: &LabsPipeline, crew_member_id: &CrewMemberId, sop_id: &SopId) {
    let config = registry().config(sop_id).found().unwrap_or_default();
    for _ in 0..config.required_supervised_completions {
        pipeline
            .record_supervised_completion(crew_member_id, sop_id)
            .unwrap();
    }
    pipeline
        .record_review_score(crew_member_id, sop_id, config.review_question_count)
        .unwrap();
}

/// Check a step and return the draft it produces
pub fn check(
    pipeline: &LabsPipeline,
    sop_id: &str,
    step_order: u32,
    crew_member_id: &CrewMemberId,
) -> ObservationDraft {
    let event = CheckEvent::new(SopId::new(sop_id), step_order, crew_member_id.clone(), project());
    pipeline
        .evaluate(&event)
        .into_draft()
        .unwrap_or_else(|| panic!("step {step_order} of {sop_id} produced no draft"))
}

/// Request that satisfies everything `draft` requires
pub fn request_for(draft: &ObservationDraft, outcome: Outcome) -> ConfirmRequest {
    let mut request = ConfirmRequest::new(outcome);
    if draft.required.needs_note(outcome) {
        request = request.with_note(format!("{outcome} on {}", draft.step_title));
    }
    if draft.required.photo {
        request = request.with_photo(labs_model::PhotoRef::new("photos/fixture.jpg"));
    }
    if draft.requires_cosign {
        request = request.cosigned_by(crew(SUPERVISOR));
    }
    request
}

/// Check and confirm one step
pub fn observe(
    pipeline: &LabsPipeline,
    sop_id: &str,
    step_order: u32,
    crew_member_id: &CrewMemberId,
    outcome: Outcome,
) -> Confirmation {
    let draft = check(pipeline, sop_id, step_order, crew_member_id);
    let request = request_for(&draft, outcome);
    pipeline.confirm(&draft, request).unwrap()
}

/// Confirm `count` observations with the same outcome
pub fn observe_many(
    pipeline: &LabsPipeline,
    sop_id: &str,
    step_order: u32,
    outcome: Outcome,
    count: usize,
) -> Vec<Confirmation> {
    (0..count)
        .map(|n| observe(pipeline, sop_id, step_order, &crew(&format!("crew-{n}")), outcome))
        .collect()
}
