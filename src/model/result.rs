use std::fmt::{self, Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{OptionId, VoteId};

/// Number of ballots currently naming an option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionCount {
    pub option: OptionId,
    pub count: u64,
}

/// How a closed vote was decided.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    /// Quorum met and one option strictly ahead.
    Winner { option: OptionId },
    /// Quorum met but several options share the top count.
    Tied { options: Vec<OptionId> },
    /// Too few members took part for the result to stand.
    NoQuorum,
}

impl Display for Outcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Winner { option } => write!(f, "`{option}` won"),
            Self::Tied { options } => write!(f, "tie between {}", options.join(", ")),
            Self::NoQuorum => f.write_str("no quorum"),
        }
    }
}

/// The frozen result of a closed vote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedResult {
    pub vote_id: VoteId,
    /// Every option in definition order, zero-filled.
    pub counts: Vec<OptionCount>,
    pub distinct_voters: u64,
    /// Eligible members at the moment of closing.
    pub eligible_members: u64,
    pub turnout_percent: f64,
    pub quorum_percent: u8,
    pub meets_quorum: bool,
    pub outcome: Outcome,
    pub closed_at: DateTime<Utc>,
}

impl ClosedResult {
    pub fn winner(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Winner { option } => Some(option),
            _ => None,
        }
    }

    /// A vote that reached its deadline without a single ballot.
    pub fn expired(&self) -> bool {
        self.distinct_voters == 0
    }

    pub fn count_for(&self, option: &str) -> Option<u64> {
        self.counts
            .iter()
            .find(|c| c.option == option)
            .map(|c| c.count)
    }
}
