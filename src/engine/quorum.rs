//! Quorum evaluation.
//!
//! Quorum counts distinct members, never ballot rows, and is judged against
//! the number of members eligible at the time of evaluation.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::model::Ballot;

/// Participation figures for one vote.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuorumReport {
    pub distinct_voters: u64,
    pub eligible_members: u64,
    /// Share of eligible members who voted, in `[0, 100]`.
    pub turnout_percent: f64,
    pub threshold_percent: u8,
    pub meets_quorum: bool,
}

/// Evaluate quorum over a set of ballots.
pub fn evaluate(ballots: &[Ballot], eligible_members: u64, threshold_percent: u8) -> QuorumReport {
    let distinct_voters = ballots
        .iter()
        .map(|ballot| ballot.member_id)
        .collect::<HashSet<_>>()
        .len() as u64;
    evaluate_count(distinct_voters, eligible_members, threshold_percent)
}

/// Evaluate quorum from an already-deduplicated voter count.
///
/// Voters beyond the eligible count (members deactivated after voting) are
/// clamped so turnout never exceeds 100%.
pub fn evaluate_count(
    distinct_voters: u64,
    eligible_members: u64,
    threshold_percent: u8,
) -> QuorumReport {
    if eligible_members == 0 {
        return QuorumReport {
            distinct_voters,
            eligible_members,
            turnout_percent: 0.0,
            threshold_percent,
            meets_quorum: false,
        };
    }

    let counted = distinct_voters.min(eligible_members);
    // Integer comparison so 5 of 10 at 50% is met exactly.
    let meets_quorum = counted * 100 >= u64::from(threshold_percent) * eligible_members;
    QuorumReport {
        distinct_voters,
        eligible_members,
        turnout_percent: counted as f64 * 100.0 / eligible_members as f64,
        threshold_percent,
        meets_quorum,
    }
}
