//! Error types for the knowledge pipeline
//!
//! Every fallible operation returns [`PipelineError`]. The variants map onto
//! what the caller can do about them:
//! - `ConfigurationMissing`: the SOP catalog has no answer; fix the catalog
//! - `StateConflict`: the entity is in the wrong lifecycle state
//! - `ConcurrencyConflict`: lost a write race twice; safe to retry
//! - `Validation`: the request itself is incomplete or malformed

use labs_model::{validate_transition, BallotId, CrewMemberId, KnowledgeItemId, Lifecycle};
use labs_store::StoreError;
use std::fmt;

/// Main pipeline error type
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The SOP catalog has no configuration for the lookup
    #[error("configuration missing: {what}")]
    ConfigurationMissing {
        /// What was looked up
        what: String,
    },

    /// Entity is not in a state that allows the operation
    #[error("{entity} {id} is {current}; cannot {action}")]
    StateConflict {
        /// Entity kind
        entity: &'static str,
        /// Identifier as displayed
        id: String,
        /// Current status
        current: String,
        /// Operation that was refused
        action: &'static str,
    },

    /// Knowledge item changed under us on both attempts
    #[error("knowledge item {id} changed concurrently (expected version {expected}, found {found})")]
    ConcurrencyConflict {
        /// Item being recomputed
        id: KnowledgeItemId,
        /// Version we read
        expected: u64,
        /// Version found at write time
        found: u64,
    },

    /// Request failed validation
    #[error("invalid {field}: {reason}")]
    Validation {
        /// Offending field
        field: &'static str,
        /// Why it was rejected
        reason: String,
    },

    /// Voter already voted on this ballot
    #[error("{voter} has already voted on ballot {ballot_id}")]
    DuplicateVote {
        /// Ballot
        ballot_id: BallotId,
        /// Voter
        voter: CrewMemberId,
    },

    /// Entity does not exist
    #[error("{entity} {id} not found")]
    NotFound {
        /// Entity kind
        entity: &'static str,
        /// Identifier as displayed
        id: String,
    },

    /// Background recompute worker is no longer running
    #[error("recompute worker has stopped")]
    WorkerStopped,

    /// Pipeline configuration could not be loaded
    #[error("configuration error: {0}")]
    Config(String),

    /// Underlying store failure
    #[error("store error: {0}")]
    Store(StoreError),
}

impl PipelineError {
    /// Shorthand for [`PipelineError::StateConflict`]
    #[inline]
    pub fn state_conflict(
        entity: &'static str,
        id: impl ToString,
        current: impl ToString,
        action: &'static str,
    ) -> Self {
        Self::StateConflict {
            entity,
            id: id.to_string(),
            current: current.to_string(),
            action,
        }
    }

    /// Shorthand for [`PipelineError::Validation`]
    #[inline]
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }

    /// Shorthand for [`PipelineError::ConfigurationMissing`]
    #[inline]
    pub fn configuration_missing(what: impl Into<String>) -> Self {
        Self::ConfigurationMissing { what: what.into() }
    }

    /// Caller may retry the same request unchanged
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, PipelineError::ConcurrencyConflict { .. })
    }

    /// The crew member cannot continue without someone fixing data or config
    #[inline]
    #[must_use]
    pub fn is_field_blocking(&self) -> bool {
        matches!(
            self,
            PipelineError::ConfigurationMissing { .. } | PipelineError::Config(_)
        )
    }
}

impl From<StoreError> for PipelineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::VersionConflict {
                id,
                expected,
                found,
            } => PipelineError::ConcurrencyConflict {
                id,
                expected,
                found,
            },
            StoreError::NotFound { entity, id } => PipelineError::NotFound { entity, id },
            other => PipelineError::Store(other),
        }
    }
}

/// Check `from -> to` against the entity's transition table
pub(crate) fn ensure_transition<S>(
    id: impl ToString,
    from: S,
    to: S,
    action: &'static str,
) -> Result<(), PipelineError>
where
    S: Lifecycle + fmt::Display,
{
    validate_transition(from, to)
        .map_err(|_| PipelineError::state_conflict(S::ENTITY, id, from, action))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_conflicts_become_concurrency_conflicts() {
        let err: PipelineError = StoreError::VersionConflict {
            id: KnowledgeItemId::new(),
            expected: 1,
            found: 2,
        }
        .into();
        assert!(err.is_retryable());
    }

    #[test]
    fn missing_configuration_is_field_blocking() {
        let err = PipelineError::configuration_missing("procedure tile-floor");
        assert!(err.is_field_blocking());
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "configuration missing: procedure tile-floor");
    }

    #[test]
    fn illegal_transitions_name_the_entity() {
        let err = ensure_transition(
            "01J",
            labs_model::ExperimentStatus::Completed,
            labs_model::ExperimentStatus::Active,
            "activate",
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "experiment 01J is completed; cannot activate");
    }

    #[test]
    fn state_conflict_message() {
        let err = PipelineError::state_conflict("experiment", "01J", "completed", "record result");
        assert_eq!(err.to_string(), "experiment 01J is completed; cannot record result");
    }
}
