//! Rules for closing a vote before its deadline.

use std::collections::HashSet;

use crate::model::{Ballot, MemberId, Vote};

/// Decides, after each recorded ballot, whether a vote should close early.
pub trait ClosingPolicy: Send + Sync {
    /// Whether the policy ever closes early. Lets the engine skip the lookups.
    fn is_active(&self) -> bool {
        true
    }

    /// `eligible` holds the members who may vote right now. `ballots` may
    /// include members who have since lost eligibility.
    fn should_close_early(&self, vote: &Vote, ballots: &[Ballot], eligible: &[MemberId]) -> bool;
}

/// Votes always run until their deadline.
#[derive(Debug, Default, Clone, Copy)]
pub struct UntilDeadline;

impl ClosingPolicy for UntilDeadline {
    fn is_active(&self) -> bool {
        false
    }

    fn should_close_early(&self, _: &Vote, _: &[Ballot], _: &[MemberId]) -> bool {
        false
    }
}

/// Close as soon as every eligible member has voted and every ballot names
/// the same option.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unanimity;

impl ClosingPolicy for Unanimity {
    fn should_close_early(&self, _: &Vote, ballots: &[Ballot], eligible: &[MemberId]) -> bool {
        let Some(first) = ballots.first() else {
            return false;
        };
        if eligible.is_empty() || ballots.iter().any(|b| b.option != first.option) {
            return false;
        }
        let voted: HashSet<MemberId> = ballots.iter().map(|b| b.member_id).collect();
        eligible.iter().all(|member| voted.contains(member))
    }
}
