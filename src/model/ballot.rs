use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{MemberId, OptionId, VoteId};

/// One member's current choice in one vote.
///
/// There is at most one ballot per (vote, member); casting again replaces it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ballot {
    pub vote_id: VoteId,
    pub member_id: MemberId,
    pub option: OptionId,
    pub cast_at: DateTime<Utc>,
}

impl Ballot {
    pub fn new(
        vote_id: VoteId,
        member_id: MemberId,
        option: impl Into<OptionId>,
        cast_at: DateTime<Utc>,
    ) -> Self {
        Self {
            vote_id,
            member_id,
            option: option.into(),
            cast_at,
        }
    }
}
