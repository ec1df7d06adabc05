use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::{Vote, VoteId};

/// The single reminder scheduled for a vote when it is published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reminder {
    #[serde(rename = "_id")]
    pub vote_id: VoteId,
    pub fire_at: DateTime<Utc>,
    pub fired: bool,
}

impl Reminder {
    /// Fire `lead` before the deadline, or straight away if the vote is shorter than that.
    pub fn for_vote(vote: &Vote, lead: Duration) -> Self {
        Self {
            vote_id: vote.id,
            fire_at: (vote.deadline - lead).max(vote.created_at),
            fired: false,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        !self.fired && self.fire_at <= now
    }
}
