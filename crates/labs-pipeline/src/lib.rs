//! Labs Pipeline - field knowledge pipeline
//!
//! Turns checklist activity into scored, reviewable knowledge:
//! - Evaluates check events and captures observations
//! - Triages crew submissions
//! - Runs experiments from draft to verdict
//! - Aggregates evidence into confidence-scored knowledge items
//! - Gates certification on supervised completions and review scores
//! - Prioritises experiments through weekly ballots
//!
//! # Example
//!
//! ```rust,ignore
//! use labs_pipeline::prelude::*;
//!
//! let pipeline = LabsPipeline::new(PipelineConfig::new(), catalog)?;
//! let event = CheckEvent::new(sop_id, 2, crew_member_id, project_id);
//! if let TriggerDecision::ImmediateConfirm(draft) = pipeline.evaluate(&event) {
//!     let confirmation = pipeline.confirm(&draft, ConfirmRequest::confirmed())?;
//!     println!("{} items updated", confirmation.knowledge_items.len());
//! }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

// Core modules
pub mod aggregator;
pub mod attribution;
pub mod badges;
pub mod ballots;
pub mod capture;
pub mod config;
pub mod error;
pub mod experiments;
pub mod pipeline;
pub mod replay;
pub mod scoring;
pub mod training;
pub mod triage;
pub mod trigger;
pub mod worker;

// Re-exports for convenience
pub use aggregator::{Aggregator, Assessment};
pub use attribution::{AttributionResolver, CategoryResolver, StrictCategoryResolver};
pub use badges::{evidence_badges, EvidenceBadge, StepBadge};
pub use ballots::BallotOutcome;
pub use capture::{ConfirmRequest, Confirmation};
pub use config::{
    PipelineConfig, ScoringPolicy, CHALLENGE_THRESHOLD, EXPERIMENT_WEIGHT, MAX_EXPERIMENT_WEIGHT,
    MIN_PUBLISHED_OBSERVATIONS, MIN_REVIEW_EVIDENCE, PUBLICATION_THRESHOLD, WILSON_Z,
};
pub use error::PipelineError;
pub use experiments::ExperimentOutcome;
pub use pipeline::{LabsPipeline, PipelineSummary};
pub use training::TrainingGate;
pub use trigger::{
    CheckEvent, NoActionReason, NoteRequirement, ObservationDraft, RequiredFields,
    TriggerDecision, TriggerEvaluator,
};
pub use worker::{RecomputeHandle, RecomputeMessage, RecomputeWorker, WorkerStats};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with the pipeline
    pub use crate::{
        CheckEvent, ConfirmRequest, Confirmation, ExperimentOutcome, LabsPipeline,
        PipelineConfig, PipelineError, TriggerDecision,
    };
    pub use labs_model::{
        Activation, CrewMemberId, ExperimentProposal, ExperimentResult, Outcome, ProjectId,
        ReviewDecision, SopId, SubmissionReport,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
