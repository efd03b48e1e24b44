//! Store errors

use labs_model::{KnowledgeItemId, SopError, SopId};

/// Errors raised by the authoritative store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Entity does not exist
    #[error("{entity} {id} not found")]
    NotFound {
        /// Entity kind
        entity: &'static str,
        /// Identifier as displayed
        id: String,
    },

    /// Insert collided with an existing id
    #[error("{entity} {id} already exists")]
    Duplicate {
        /// Entity kind
        entity: &'static str,
        /// Identifier as displayed
        id: String,
    },

    /// Compare-and-swap lost against a concurrent writer
    #[error("knowledge item {id} changed concurrently (expected version {expected}, found {found})")]
    VersionConflict {
        /// Item being written
        id: KnowledgeItemId,
        /// Version the writer read
        expected: u64,
        /// Version currently stored
        found: u64,
    },

    /// Step removal blocked by referencing observations
    #[error("step {step_order} of procedure {sop_id} is referenced by observations; retire it instead")]
    StepInUse {
        /// Procedure
        sop_id: SopId,
        /// Step position
        step_order: u32,
    },

    /// Procedure definition refused by the catalog
    #[error("procedure {sop_id} is invalid: {source}")]
    InvalidProcedure {
        /// Procedure
        sop_id: SopId,
        /// Rule it breaks
        #[source]
        source: SopError,
    },

    /// Journal chain does not verify
    #[error("journal integrity violation at entry {seq}")]
    IntegrityViolation {
        /// First entry that fails verification
        seq: u64,
    },

    /// Journal I/O failure
    #[error("journal io: {0}")]
    Io(#[from] std::io::Error),

    /// Journal (de)serialization failure
    #[error("journal encoding: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl StoreError {
    /// Shorthand for [`StoreError::NotFound`]
    #[inline]
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}
