use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ClosedResult, MemberId, OptionId, Vote, VoteId};

/// Something members or the export should hear about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    VoteOpened {
        vote_id: VoteId,
        title: String,
        description: String,
        options: Vec<OptionId>,
        quorum_percent: u8,
        deadline: DateTime<Utc>,
    },
    ReminderDue {
        vote_id: VoteId,
        title: String,
        deadline: DateTime<Utc>,
        /// Eligible members who have not voted yet.
        pending_members: Vec<MemberId>,
    },
    VoteClosed {
        vote_id: VoteId,
        title: String,
        result: ClosedResult,
    },
}

impl Notification {
    pub fn opened(vote: &Vote) -> Self {
        Self::VoteOpened {
            vote_id: vote.id,
            title: vote.title.clone(),
            description: vote.description.clone(),
            options: vote.options.clone(),
            quorum_percent: vote.quorum_percent,
            deadline: vote.deadline,
        }
    }

    pub fn reminder(vote: &Vote, pending_members: Vec<MemberId>) -> Self {
        Self::ReminderDue {
            vote_id: vote.id,
            title: vote.title.clone(),
            deadline: vote.deadline,
            pending_members,
        }
    }

    pub fn closed(vote: &Vote, result: ClosedResult) -> Self {
        Self::VoteClosed {
            vote_id: vote.id,
            title: vote.title.clone(),
            result,
        }
    }

    pub fn vote_id(&self) -> VoteId {
        match self {
            Self::VoteOpened { vote_id, .. }
            | Self::ReminderDue { vote_id, .. }
            | Self::VoteClosed { vote_id, .. } => *vote_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::VoteOpened { .. } => "vote_opened",
            Self::ReminderDue { .. } => "reminder_due",
            Self::VoteClosed { .. } => "vote_closed",
        }
    }
}
