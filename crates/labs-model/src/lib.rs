//! Labs Model - entities of the field knowledge pipeline
//!
//! Defines the data the pipeline moves around:
//! - Observations captured on checklist steps
//! - Submissions awaiting triage
//! - Experiments and their results
//! - Confidence-scored knowledge items
//! - Training records and weekly ballots
//!
//! Every status field has a fixed transition table in [`state_machine`].
//! Nothing in this crate performs I/O.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod attribution;
pub mod ballot;
pub mod error;
pub mod experiment;
pub mod ids;
pub mod knowledge;
pub mod observation;
pub mod sop;
pub mod state_machine;
pub mod submission;
pub mod training;

pub use attribution::Attribution;
pub use ballot::{week_start_of, Ballot, BallotOption, BallotStatus};
pub use error::{SopError, TransitionError};
pub use experiment::{
    Activation, Experiment, ExperimentOrigin, ExperimentProposal, ExperimentResult,
    ExperimentStatus, HypothesisKind, Verdict,
};
pub use ids::{
    BallotId, CrewMemberId, ExperimentId, KnowledgeItemId, ObservationId, PhotoRef, ProjectId,
    SopId, SubmissionId,
};
pub use knowledge::{EvidenceTally, KnowledgeItem, KnowledgeSeed, KnowledgeStatus, KnowledgeType};
pub use observation::{Observation, ObservationSource, Outcome, StepRef};
pub use sop::{ObservationMode, ScriptPhase, Sop, SopConfig, StepTemplate};
pub use state_machine::{validate_path, validate_transition, Lifecycle};
pub use submission::{
    Resolution, ReviewDecision, StatusChange, Submission, SubmissionReport, SubmissionStatus,
};
pub use training::{TrainingRecord, TrainingStatus};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
