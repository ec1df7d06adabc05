use std::collections::HashSet;
use std::fmt::{self, Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Ballot, ClosedResult, MemberId, OptionId, Outcome, Vote, VoteId};

use super::tabulate;

/// A vote together with every ballot cast in it, as served by the dump endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteDump {
    pub vote: Vote,
    pub ballots: Vec<Ballot>,
}

/// A way in which a dump disagrees with itself.
#[derive(Debug, Clone, PartialEq)]
pub enum Discrepancy {
    ForeignBallot {
        member_id: MemberId,
        vote_id: VoteId,
    },
    DuplicateBallot {
        member_id: MemberId,
    },
    UnknownOption {
        member_id: MemberId,
        option: OptionId,
    },
    LateBallot {
        member_id: MemberId,
        cast_at: DateTime<Utc>,
    },
    /// The recorded counts do not list exactly the vote's options, in order.
    CountedOptions {
        recorded: Vec<OptionId>,
        expected: Vec<OptionId>,
    },
    Count {
        option: OptionId,
        recorded: u64,
        recomputed: u64,
    },
    Voters {
        recorded: u64,
        recomputed: u64,
    },
    Outcome {
        recorded: Outcome,
        recomputed: Outcome,
    },
}

impl Display for Discrepancy {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::ForeignBallot { member_id, vote_id } => {
                write!(f, "ballot of member {member_id} belongs to vote {vote_id}")
            }
            Self::DuplicateBallot { member_id } => {
                write!(f, "member {member_id} has more than one ballot")
            }
            Self::UnknownOption { member_id, option } => {
                write!(f, "member {member_id} chose `{option}`, which is not an option")
            }
            Self::LateBallot { member_id, cast_at } => {
                write!(f, "ballot of member {member_id} was cast at {cast_at}, after closing")
            }
            Self::CountedOptions { recorded, expected } => write!(
                f,
                "recorded counts for [{}] but the vote has options [{}]",
                recorded.join(", "),
                expected.join(", ")
            ),
            Self::Count {
                option,
                recorded,
                recomputed,
            } => write!(
                f,
                "`{option}` recorded {recorded} ballot(s) but the dump holds {recomputed}"
            ),
            Self::Voters {
                recorded,
                recomputed,
            } => write!(
                f,
                "recorded {recorded} voter(s) but the dump holds {recomputed}"
            ),
            Self::Outcome {
                recorded,
                recomputed,
            } => write!(f, "recorded outcome `{recorded}` but ballots give `{recomputed}`"),
        }
    }
}

impl VoteDump {
    /// Recompute the closed result from the ballots alone.
    /// `None` if the vote has no recorded result.
    pub fn recompute(&self) -> Option<ClosedResult> {
        let recorded = self.vote.result.as_ref()?;
        Some(tabulate(
            &self.vote,
            &self.ballots,
            recorded.eligible_members,
            recorded.closed_at,
        ))
    }

    /// Check the ballots are well formed and, for a closed vote, that they
    /// reproduce the recorded result.
    pub fn verify(&self) -> Result<(), Vec<Discrepancy>> {
        let mut problems = self.check_ballots();

        if let (Some(recorded), Some(recomputed)) = (&self.vote.result, self.recompute()) {
            let counted: Vec<OptionId> =
                recorded.counts.iter().map(|c| c.option.clone()).collect();
            let expected: Vec<OptionId> =
                recomputed.counts.iter().map(|c| c.option.clone()).collect();
            if counted != expected {
                problems.push(Discrepancy::CountedOptions {
                    recorded: counted,
                    expected,
                });
            }
            for fresh in &recomputed.counts {
                let stored = recorded.counts.iter().find(|c| c.option == fresh.option);
                if let Some(stored) = stored.filter(|stored| stored.count != fresh.count) {
                    problems.push(Discrepancy::Count {
                        option: fresh.option.clone(),
                        recorded: stored.count,
                        recomputed: fresh.count,
                    });
                }
            }
            if recorded.distinct_voters != recomputed.distinct_voters {
                problems.push(Discrepancy::Voters {
                    recorded: recorded.distinct_voters,
                    recomputed: recomputed.distinct_voters,
                });
            }
            if recorded.outcome != recomputed.outcome {
                problems.push(Discrepancy::Outcome {
                    recorded: recorded.outcome.clone(),
                    recomputed: recomputed.outcome,
                });
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems)
        }
    }

    fn check_ballots(&self) -> Vec<Discrepancy> {
        let closed_at = self.vote.closed_at.unwrap_or(self.vote.deadline);
        let mut seen = HashSet::new();
        let mut problems = vec![];
        for ballot in &self.ballots {
            let member_id = ballot.member_id;
            if ballot.vote_id != self.vote.id {
                problems.push(Discrepancy::ForeignBallot {
                    member_id,
                    vote_id: ballot.vote_id,
                });
            }
            if !seen.insert(member_id) {
                problems.push(Discrepancy::DuplicateBallot { member_id });
            }
            if !self.vote.has_option(&ballot.option) {
                problems.push(Discrepancy::UnknownOption {
                    member_id,
                    option: ballot.option.clone(),
                });
            }
            if ballot.cast_at >= self.vote.deadline || ballot.cast_at > closed_at {
                problems.push(Discrepancy::LateBallot {
                    member_id,
                    cast_at: ballot.cast_at,
                });
            }
        }
        problems
    }
}
