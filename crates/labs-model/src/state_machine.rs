//! Lifecycle transition tables
//!
//! Every status enum in the pipeline is one-directional. The allowed edges are
//! listed here in one place; anything not listed is illegal. The only
//! backward-looking edges are `challenged -> published` for knowledge items
//! and the explicit archive/revoke operations, which are not automatic.

use crate::error::TransitionError;
use std::fmt::Debug;

/// A status field with a fixed transition table
pub trait Lifecycle: Copy + Eq + Debug + 'static {
    /// Entity name used in diagnostics
    const ENTITY: &'static str;

    /// Statuses reachable in one step from `self`
    fn allowed_transitions(self) -> &'static [Self];

    /// Status has no outgoing edges
    #[inline]
    fn is_terminal(self) -> bool {
        self.allowed_transitions().is_empty()
    }

    /// Check whether `self -> to` is a legal edge
    #[inline]
    fn can_transition_to(self, to: Self) -> bool {
        self.allowed_transitions().contains(&to)
    }
}

/// Validate a single transition against the entity's table
pub fn validate_transition<S: Lifecycle>(from: S, to: S) -> Result<(), TransitionError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(TransitionError::Illegal {
            entity: S::ENTITY,
            from: format!("{from:?}"),
            to: format!("{to:?}"),
        })
    }
}

/// Validate a path of transitions, starting at `from`
pub fn validate_path<S: Lifecycle>(from: S, path: &[S]) -> Result<(), TransitionError> {
    let mut current = from;
    for &next in path {
        validate_transition(current, next)?;
        current = next;
    }
    Ok(())
}

mod tables {
    use super::Lifecycle;
    use crate::ballot::BallotStatus;
    use crate::experiment::ExperimentStatus;
    use crate::knowledge::KnowledgeStatus;
    use crate::submission::SubmissionStatus;
    use crate::training::TrainingStatus;

    impl Lifecycle for SubmissionStatus {
        const ENTITY: &'static str = "submission";

        fn allowed_transitions(self) -> &'static [Self] {
            use SubmissionStatus::*;
            match self {
                Submitted => &[Reviewed],
                Reviewed => &[
                    LoggedAsObservation,
                    PromotedToExperiment,
                    TriggeredReview,
                    Archived,
                ],
                LoggedAsObservation | PromotedToExperiment | TriggeredReview | Archived => &[],
            }
        }
    }

    impl Lifecycle for ExperimentStatus {
        const ENTITY: &'static str = "experiment";

        fn allowed_transitions(self) -> &'static [Self] {
            use ExperimentStatus::*;
            match self {
                Draft => &[Active, Terminated],
                Active => &[Completed, Terminated],
                Completed | Terminated => &[],
            }
        }
    }

    impl Lifecycle for KnowledgeStatus {
        const ENTITY: &'static str = "knowledge item";

        fn allowed_transitions(self) -> &'static [Self] {
            use KnowledgeStatus::*;
            match self {
                Draft => &[UnderReview, Archived],
                UnderReview => &[Published, Archived],
                Published => &[Challenged, Archived],
                Challenged => &[Published, Archived],
                Archived => &[],
            }
        }
    }

    impl Lifecycle for TrainingStatus {
        const ENTITY: &'static str = "training record";

        fn allowed_transitions(self) -> &'static [Self] {
            use TrainingStatus::*;
            match self {
                // Both prerequisites can land in the same call
                InProgress => &[ReviewReady, Certified],
                ReviewReady => &[Certified],
                Certified => &[],
            }
        }
    }

    impl Lifecycle for BallotStatus {
        const ENTITY: &'static str = "ballot";

        fn allowed_transitions(self) -> &'static [Self] {
            match self {
                BallotStatus::Open => &[BallotStatus::Closed],
                BallotStatus::Closed => &[],
            }
        }
    }
}
