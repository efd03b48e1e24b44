//! Weekly prioritisation ballots
//!
//! Draft experiments are put to a vote; closing the ballot activates the
//! winner through the normal experiment lifecycle.

use crate::error::{ensure_transition, PipelineError};
use crate::pipeline::LabsPipeline;
use chrono::NaiveDate;
use labs_model::{
    week_start_of, Activation, Ballot, BallotId, BallotStatus, CrewMemberId, Experiment,
    ExperimentId, ExperimentStatus,
};
use labs_store::JournalEvent;

/// Result of closing a ballot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BallotOutcome {
    /// Ballot as stored
    pub ballot: Ballot,
    /// Winning experiment after activation
    pub activated: Option<Experiment>,
}

impl BallotOutcome {
    /// Winning option, if any votes were cast
    #[inline]
    #[must_use]
    pub fn winner(&self) -> Option<ExperimentId> {
        self.ballot.winner
    }
}

impl LabsPipeline {
    /// Open a ballot for the week containing `week_of`
    ///
    /// # Errors
    /// - `Validation` when there are no candidates
    /// - `StateConflict` when a candidate is no longer a draft
    pub fn open_ballot(
        &self,
        week_of: NaiveDate,
        candidates: &[ExperimentId],
    ) -> Result<Ballot, PipelineError> {
        if candidates.is_empty() {
            return Err(PipelineError::validation(
                "candidates",
                "a ballot needs at least one draft experiment",
            ));
        }
        for &candidate in candidates {
            let experiment = self.store.experiments.require(&candidate)?;
            if experiment.status != ExperimentStatus::Draft {
                return Err(PipelineError::state_conflict(
                    "experiment",
                    candidate,
                    experiment.status,
                    "put on a ballot",
                ));
            }
        }
        let ballot = Ballot::open(BallotId::new(), week_start_of(week_of), candidates);
        let id = ballot.id;
        self.commit(JournalEvent::BallotOpened { ballot })?;
        tracing::info!(ballot_id = %id, options = candidates.len(), "ballot opened");
        Ok(self.store.ballots.require(&id)?)
    }

    /// Cast one vote
    ///
    /// # Errors
    /// - `DuplicateVote` if the voter already voted on this ballot
    /// - `StateConflict` if the ballot is closed
    pub fn vote(
        &self,
        ballot_id: BallotId,
        voter: &CrewMemberId,
        experiment_id: ExperimentId,
    ) -> Result<Ballot, PipelineError> {
        self.commit(JournalEvent::VoteCast {
            ballot_id,
            voter: voter.clone(),
            experiment_id,
        })?;
        Ok(self.store.ballots.require(&ballot_id)?)
    }

    /// Close a ballot and activate its winner
    pub fn close_ballot(&self, ballot_id: BallotId) -> Result<BallotOutcome, PipelineError> {
        let ballot = self.store.ballots.require(&ballot_id)?;
        ensure_transition(ballot_id, ballot.status, BallotStatus::Closed, "close")?;
        let winner = ballot.leading_option();
        self.commit(JournalEvent::BallotClosed { ballot_id, winner })?;
        tracing::info!(ballot_id = %ballot_id, winner = ?winner, "ballot closed");

        let activated = match winner {
            Some(experiment_id) => {
                let still_draft = self
                    .store
                    .experiments
                    .get(&experiment_id)
                    .is_some_and(|e| e.status == ExperimentStatus::Draft);
                if still_draft {
                    Some(self.activate_experiment(experiment_id, Activation::Ballot(ballot_id))?)
                } else {
                    tracing::warn!(
                        ballot_id = %ballot_id,
                        experiment_id = %experiment_id,
                        "Ballot winner is no longer a draft; leaving it as is"
                    );
                    None
                }
            }
            None => None,
        };
        Ok(BallotOutcome {
            ballot: self.store.ballots.require(&ballot_id)?,
            activated,
        })
    }

    pub(crate) fn apply_ballot_opened(&self, ballot: &Ballot) -> Result<(), PipelineError> {
        self.store.ballots.insert_new(ballot.id, ballot.clone())?;
        Ok(())
    }

    pub(crate) fn apply_vote(
        &self,
        ballot_id: BallotId,
        voter: &CrewMemberId,
        experiment_id: ExperimentId,
    ) -> Result<(), PipelineError> {
        self.store.ballots.update(&ballot_id, |ballot| {
            if ballot.status != BallotStatus::Open {
                return Err(PipelineError::state_conflict(
                    "ballot",
                    ballot_id,
                    ballot.status,
                    "vote",
                ));
            }
            if ballot.has_voted(voter) {
                return Err(PipelineError::DuplicateVote {
                    ballot_id,
                    voter: voter.clone(),
                });
            }
            let option = ballot.option_mut(experiment_id).ok_or_else(|| {
                PipelineError::validation(
                    "experiment_id",
                    format!("experiment {experiment_id} is not on ballot {ballot_id}"),
                )
            })?;
            option.vote_count += 1;
            ballot.votes.insert(voter.clone(), experiment_id);
            Ok(())
        })?;
        Ok(())
    }

    pub(crate) fn apply_ballot_closed(
        &self,
        ballot_id: BallotId,
        winner: Option<ExperimentId>,
    ) -> Result<(), PipelineError> {
        self.store.ballots.update(&ballot_id, |ballot| {
            ensure_transition(ballot_id, ballot.status, BallotStatus::Closed, "close")?;
            ballot.status = BallotStatus::Closed;
            ballot.winner = winner;
            Ok::<(), PipelineError>(())
        })?;
        Ok(())
    }
}
