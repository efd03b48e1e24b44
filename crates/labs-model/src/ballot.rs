//! Weekly prioritisation ballots
//!
//! Stakeholders vote on which draft experiment to activate next. One vote per
//! voter per ballot.

use crate::ids::{BallotId, CrewMemberId, ExperimentId};
use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Ballot status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BallotStatus {
    Open,
    Closed,
}

impl std::fmt::Display for BallotStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            BallotStatus::Open => "open",
            BallotStatus::Closed => "closed",
        })
    }
}

/// One candidate on the ballot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallotOption {
    pub experiment_id: ExperimentId,
    pub vote_count: u32,
}

/// Monday of the ISO week containing `date`
#[must_use]
pub fn week_start_of(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

/// Weekly ballot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ballot {
    pub id: BallotId,
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
    pub options: Vec<BallotOption>,
    /// Voter -> chosen option; enforces one vote per voter
    pub votes: BTreeMap<CrewMemberId, ExperimentId>,
    pub status: BallotStatus,
    pub winner: Option<ExperimentId>,
}

impl Ballot {
    /// Open a ballot covering the seven days from `week_start`
    #[must_use]
    pub fn open(id: BallotId, week_start: NaiveDate, candidates: &[ExperimentId]) -> Self {
        let mut options: Vec<BallotOption> = Vec::with_capacity(candidates.len());
        for &experiment_id in candidates {
            if !options.iter().any(|o| o.experiment_id == experiment_id) {
                options.push(BallotOption {
                    experiment_id,
                    vote_count: 0,
                });
            }
        }
        Self {
            id,
            week_start,
            week_end: week_start + Duration::days(6),
            options,
            votes: BTreeMap::new(),
            status: BallotStatus::Open,
            winner: None,
        }
    }

    /// Voter has already cast a vote
    #[inline]
    #[must_use]
    pub fn has_voted(&self, voter: &CrewMemberId) -> bool {
        self.votes.contains_key(voter)
    }

    /// Option for the experiment, if it is on the ballot
    #[must_use]
    pub fn option_mut(&mut self, experiment_id: ExperimentId) -> Option<&mut BallotOption> {
        self.options
            .iter_mut()
            .find(|o| o.experiment_id == experiment_id)
    }

    /// Highest vote count wins; ties go to the earliest option. No votes, no winner.
    #[must_use]
    pub fn leading_option(&self) -> Option<ExperimentId> {
        let mut best: Option<&BallotOption> = None;
        for option in &self.options {
            if option.vote_count == 0 {
                continue;
            }
            if best.map_or(true, |b| option.vote_count > b.vote_count) {
                best = Some(option);
            }
        }
        best.map(|o| o.experiment_id)
    }
}
