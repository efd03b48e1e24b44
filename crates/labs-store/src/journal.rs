//! Hash-chained journal of pipeline writes
//!
//! Field capture may happen offline, so every write is recorded as a durable
//! event that can be replayed against a remote authority later. Each entry
//! commits to the previous entry's hash; tampering or truncation in the
//! middle of the chain fails [`Journal::verify_integrity`].
//!
//! Events carry identity and facts, never cached scores: knowledge item
//! scores are always recomputed when the journal is replayed.

use crate::error::StoreError;
use chrono::{DateTime, Utc};
use labs_model::{
    Activation, Ballot, BallotId, CrewMemberId, Experiment, ExperimentId, ExperimentResult,
    KnowledgeItemId, KnowledgeSeed, Observation, SopId, Submission, Verdict,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// A single recorded write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum JournalEvent {
    ObservationRecorded {
        observation: Observation,
    },
    KnowledgeItemCreated {
        id: KnowledgeItemId,
        seed: KnowledgeSeed,
    },
    KnowledgeReviewTriggered {
        id: KnowledgeItemId,
    },
    KnowledgeItemArchived {
        id: KnowledgeItemId,
    },
    SubmissionFiled {
        submission: Submission,
    },
    /// Final state of a triaged submission
    SubmissionReviewed {
        submission: Submission,
    },
    ExperimentCreated {
        experiment: Experiment,
    },
    ExperimentActivated {
        id: ExperimentId,
        activation: Activation,
    },
    ExperimentResultRecorded {
        id: ExperimentId,
        result: ExperimentResult,
    },
    ExperimentCompleted {
        id: ExperimentId,
        verdict: Verdict,
        knowledge_item_id: Option<KnowledgeItemId>,
    },
    ExperimentTerminated {
        id: ExperimentId,
        reason: String,
    },
    SupervisedCompletionRecorded {
        crew_member_id: CrewMemberId,
        sop_id: SopId,
    },
    ReviewScoreRecorded {
        crew_member_id: CrewMemberId,
        sop_id: SopId,
        score: u32,
    },
    TrainingRevoked {
        crew_member_id: CrewMemberId,
        sop_id: SopId,
    },
    BallotOpened {
        ballot: Ballot,
    },
    VoteCast {
        ballot_id: BallotId,
        voter: CrewMemberId,
        experiment_id: ExperimentId,
    },
    BallotClosed {
        ballot_id: BallotId,
        winner: Option<ExperimentId>,
    },
}

impl JournalEvent {
    /// Short event name for logs
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            JournalEvent::ObservationRecorded { .. } => "observation_recorded",
            JournalEvent::KnowledgeItemCreated { .. } => "knowledge_item_created",
            JournalEvent::KnowledgeReviewTriggered { .. } => "knowledge_review_triggered",
            JournalEvent::KnowledgeItemArchived { .. } => "knowledge_item_archived",
            JournalEvent::SubmissionFiled { .. } => "submission_filed",
            JournalEvent::SubmissionReviewed { .. } => "submission_reviewed",
            JournalEvent::ExperimentCreated { .. } => "experiment_created",
            JournalEvent::ExperimentActivated { .. } => "experiment_activated",
            JournalEvent::ExperimentResultRecorded { .. } => "experiment_result_recorded",
            JournalEvent::ExperimentCompleted { .. } => "experiment_completed",
            JournalEvent::ExperimentTerminated { .. } => "experiment_terminated",
            JournalEvent::SupervisedCompletionRecorded { .. } => "supervised_completion_recorded",
            JournalEvent::ReviewScoreRecorded { .. } => "review_score_recorded",
            JournalEvent::TrainingRevoked { .. } => "training_revoked",
            JournalEvent::BallotOpened { .. } => "ballot_opened",
            JournalEvent::VoteCast { .. } => "vote_cast",
            JournalEvent::BallotClosed { .. } => "ballot_closed",
        }
    }
}

/// Journal entry with its chain hashes (hex encoded)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub seq: u64,
    pub recorded_at: DateTime<Utc>,
    pub event: JournalEvent,
    pub prev_hash: String,
    pub hash: String,
}

const GENESIS_HASH: [u8; 32] = [0u8; 32];

/// Append-only, hash-chained event journal
#[derive(Debug, Default)]
pub struct Journal {
    inner: Mutex<Vec<JournalEntry>>,
}

impl Journal {
    /// Create an empty journal
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event stamped with the current time
    pub fn append(&self, event: JournalEvent) -> Result<u64, StoreError> {
        self.append_at(event, Utc::now())
    }

    /// Append an event with an explicit timestamp (used by replay)
    pub fn append_at(
        &self,
        event: JournalEvent,
        recorded_at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut guard = self.inner.lock();
        let seq = guard.len() as u64;
        let prev_hash = guard.last().map_or_else(|| hex::encode(GENESIS_HASH), |e| e.hash.clone());
        let hash = compute_hash(seq, recorded_at, &event, &prev_hash)?;
        tracing::trace!(seq, event = event.name(), "journal append");
        guard.push(JournalEntry {
            seq,
            recorded_at,
            event,
            prev_hash,
            hash,
        });
        Ok(seq)
    }

    /// Snapshot of every entry
    #[must_use]
    pub fn entries(&self) -> Vec<JournalEntry> {
        self.inner.lock().clone()
    }

    /// Number of entries
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// No entries
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Check the chain from genesis
    pub fn verify_integrity(&self) -> Result<(), StoreError> {
        verify_entries(&self.inner.lock())
    }

    /// Write the journal as JSON lines
    pub fn write_to(&self, path: &Path) -> Result<(), StoreError> {
        let entries = self.entries();
        let mut writer = BufWriter::new(File::create(path)?);
        for entry in &entries {
            serde_json::to_writer(&mut writer, entry)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Read JSON-lines entries and verify the chain
    pub fn read_from(path: &Path) -> Result<Vec<JournalEntry>, StoreError> {
        let reader = BufReader::new(File::open(path)?);
        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            entries.push(serde_json::from_str::<JournalEntry>(&line)?);
        }
        verify_entries(&entries)?;
        Ok(entries)
    }
}

/// Verify a sequence of entries starting from genesis
pub fn verify_entries(entries: &[JournalEntry]) -> Result<(), StoreError> {
    let mut prev = hex::encode(GENESIS_HASH);
    for (idx, entry) in entries.iter().enumerate() {
        let seq = idx as u64;
        if entry.seq != seq || entry.prev_hash != prev {
            return Err(StoreError::IntegrityViolation { seq });
        }
        let expected = compute_hash(entry.seq, entry.recorded_at, &entry.event, &entry.prev_hash)?;
        if entry.hash != expected {
            return Err(StoreError::IntegrityViolation { seq });
        }
        prev.clone_from(&entry.hash);
    }
    Ok(())
}

fn compute_hash(
    seq: u64,
    recorded_at: DateTime<Utc>,
    event: &JournalEvent,
    prev_hash: &str,
) -> Result<String, StoreError> {
    let mut hasher = Sha256::new();
    hasher.update(seq.to_le_bytes());
    hasher.update(recorded_at.to_rfc3339().as_bytes());
    hasher.update([0]);
    hasher.update(serde_json::to_vec(event)?);
    hasher.update([0]);
    hasher.update(prev_hash.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn revoke(crew: &str) -> JournalEvent {
        JournalEvent::TrainingRevoked {
            crew_member_id: CrewMemberId::new(crew),
            sop_id: SopId::new("tile"),
        }
    }

    #[test]
    fn chain_links_entries() {
        let journal = Journal::new();
        journal.append(revoke("a")).unwrap();
        journal.append(revoke("b")).unwrap();

        let entries = journal.entries();
        assert_eq!(entries[1].prev_hash, entries[0].hash);
        assert!(journal.verify_integrity().is_ok());
    }

    #[test]
    fn tampering_is_detected() {
        let journal = Journal::new();
        journal.append(revoke("a")).unwrap();
        journal.append(revoke("b")).unwrap();

        let mut entries = journal.entries();
        entries[0].event = revoke("mallory");
        assert!(matches!(
            verify_entries(&entries),
            Err(StoreError::IntegrityViolation { seq: 0 })
        ));
    }

    #[test]
    fn file_roundtrip_verifies() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.jsonl");
        let journal = Journal::new();
        journal.append(revoke("a")).unwrap();
        journal.write_to(&path).unwrap();

        let entries = Journal::read_from(&path).unwrap();
        assert_eq!(entries, journal.entries());
    }
}
