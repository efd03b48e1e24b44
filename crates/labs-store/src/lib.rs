//! Labs Store - authoritative state for the knowledge pipeline
//!
//! Holds the five pipeline collections plus ballots:
//! - [`ObservationLog`]: append-only observations
//! - submissions, experiments, training records and ballots in [`Table`]s
//! - [`KnowledgeStore`]: versioned knowledge items with compare-and-swap
//!
//! Also provides the [`SopCatalog`] read interface with its in-process
//! [`SopRegistry`], and the hash-chained [`Journal`] used for offline replay.

#![warn(unreachable_pub)]

pub mod catalog;
pub mod error;
pub mod journal;
pub mod knowledge;
pub mod observations;
pub mod table;

pub use catalog::{Lookup, SopCatalog, SopRegistry};
pub use error::StoreError;
pub use journal::{verify_entries, Journal, JournalEntry, JournalEvent};
pub use knowledge::KnowledgeStore;
pub use observations::ObservationLog;
pub use table::Table;

use labs_model::{
    Ballot, BallotId, CrewMemberId, Experiment, ExperimentId, SopId, Submission, SubmissionId,
    TrainingRecord,
};

/// Every collection the pipeline owns
#[derive(Debug)]
pub struct LabsStore {
    /// Append-only observations
    pub observations: ObservationLog,
    /// Crew submissions
    pub submissions: Table<SubmissionId, Submission>,
    /// Experiments
    pub experiments: Table<ExperimentId, Experiment>,
    /// Knowledge items
    pub knowledge: KnowledgeStore,
    /// Training records keyed by (crew member, SOP)
    pub training: Table<TrainingKey, TrainingRecord>,
    /// Weekly ballots
    pub ballots: Table<BallotId, Ballot>,
    /// Write journal
    pub journal: Journal,
}

impl LabsStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self {
            observations: ObservationLog::new(),
            submissions: Table::new("submission"),
            experiments: Table::new("experiment"),
            knowledge: KnowledgeStore::new(),
            training: Table::new("training record"),
            ballots: Table::new("ballot"),
            journal: Journal::new(),
        }
    }
}

impl Default for LabsStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Key of a training record
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrainingKey {
    pub crew_member_id: CrewMemberId,
    pub sop_id: SopId,
}

impl TrainingKey {
    /// Build a key
    #[inline]
    #[must_use]
    pub fn new(crew_member_id: &CrewMemberId, sop_id: &SopId) -> Self {
        Self {
            crew_member_id: crew_member_id.clone(),
            sop_id: sop_id.clone(),
        }
    }
}

impl std::fmt::Display for TrainingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.crew_member_id, self.sop_id)
    }
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
