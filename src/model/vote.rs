use std::collections::HashSet;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use mongodb::bson::{to_bson, Bson};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::{result::ClosedResult, OptionId, VoteId};

/// Fewest options a vote may offer.
pub const MIN_OPTIONS: usize = 2;
/// Most options a vote may offer; the chat keyboard has no room for more.
pub const MAX_OPTIONS: usize = 10;

/// Lifecycle state of a vote.
///
/// `Closed` and `Cancelled` are terminal: nothing moves a vote out of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteState {
    Draft,
    Active,
    Closed,
    Cancelled,
}

impl VoteState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Closed => "closed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl Display for VoteState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VoteState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "draft" => Ok(Self::Draft),
            "active" => Ok(Self::Active),
            "closed" => Ok(Self::Closed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(Error::BadRequest(format!("Unknown vote state `{other}`"))),
        }
    }
}

impl From<VoteState> for Bson {
    fn from(state: VoteState) -> Self {
        to_bson(&state).expect("Serialisation is infallible")
    }
}

/// Defaults applied to a [`VoteSpec`] that leaves fields out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteDefaults {
    pub duration: Duration,
    pub quorum_percent: u8,
}

impl Default for VoteDefaults {
    fn default() -> Self {
        Self {
            duration: Duration::days(7),
            quorum_percent: 50,
        }
    }
}

/// A vote as submitted by an admin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteSpec {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub options: Vec<OptionId>,
    /// Absolute deadline. Defaults to the configured duration after publishing.
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub quorum_percent: Option<u8>,
}

impl VoteSpec {
    /// Check everything that does not depend on when the vote is published.
    pub fn check_structure(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(invalid("title must not be empty"));
        }
        if self.options.len() < MIN_OPTIONS {
            return Err(invalid(format!("at least {MIN_OPTIONS} options are required")));
        }
        if self.options.len() > MAX_OPTIONS {
            return Err(invalid(format!("at most {MAX_OPTIONS} options are allowed")));
        }
        let mut seen = HashSet::new();
        for option in &self.options {
            if option.trim().is_empty() {
                return Err(invalid("options must not be empty"));
            }
            if !seen.insert(option.as_str()) {
                return Err(invalid(format!("option `{option}` is listed twice")));
            }
        }
        if let Some(quorum) = self.quorum_percent {
            if quorum == 0 || quorum > 100 {
                return Err(invalid("quorum must be between 1 and 100 percent"));
            }
        }
        Ok(())
    }

    /// Check the whole definition as if it were published at `now`.
    pub fn check(&self, now: DateTime<Utc>) -> Result<()> {
        self.check_structure()?;
        match self.deadline {
            Some(deadline) if deadline <= now => Err(invalid("deadline must be in the future")),
            _ => Ok(()),
        }
    }
}

fn invalid(reason: impl Into<String>) -> Error {
    Error::InvalidVoteDefinition(reason.into())
}

/// A vote, in any state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    #[serde(rename = "_id")]
    pub id: VoteId,
    pub title: String,
    pub description: String,
    pub options: Vec<OptionId>,
    pub quorum_percent: u8,
    pub state: VoteState,
    /// Draft creation time, replaced by the publish time.
    pub created_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    /// Drafts without an explicit deadline get a fresh one when published.
    #[serde(default)]
    pub deadline_from_publish: bool,
    /// When the vote reached a terminal state.
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub result: Option<ClosedResult>,
    /// Set once the closed result has reached the spreadsheet export.
    #[serde(default)]
    pub exported: bool,
}

impl Vote {
    /// Build a draft from a structurally valid spec.
    pub fn draft(id: VoteId, spec: VoteSpec, now: DateTime<Utc>, defaults: VoteDefaults) -> Self {
        Self {
            id,
            title: spec.title.trim().to_string(),
            description: spec.description,
            options: spec.options,
            quorum_percent: spec.quorum_percent.unwrap_or(defaults.quorum_percent),
            state: VoteState::Draft,
            created_at: now,
            deadline: spec.deadline.unwrap_or(now + defaults.duration),
            deadline_from_publish: spec.deadline.is_none(),
            closed_at: None,
            result: None,
            exported: false,
        }
    }

    /// Move a draft into the active state at `now`.
    pub fn activate(&mut self, now: DateTime<Utc>, defaults: VoteDefaults) -> Result<()> {
        if self.state != VoteState::Draft {
            return Err(Error::InvalidState {
                vote_id: self.id,
                state: self.state,
                action: "be published",
            });
        }
        if self.deadline_from_publish {
            self.deadline = now + defaults.duration;
        }
        if self.deadline <= now {
            return Err(invalid("deadline must be in the future"));
        }
        self.created_at = now;
        self.state = VoteState::Active;
        Ok(())
    }

    pub fn has_option(&self, option: &str) -> bool {
        self.options.iter().any(|o| o == option)
    }

    /// Whether a ballot cast at `now` may be recorded.
    pub fn accepts_ballots(&self, now: DateTime<Utc>) -> bool {
        self.state == VoteState::Active && now < self.deadline
    }

    /// Whether the vote is active and its deadline has passed.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.state == VoteState::Active && now >= self.deadline
    }

    /// Terminal votes may only be purged once their result is safely exported.
    pub fn is_purgeable(&self) -> bool {
        match self.state {
            VoteState::Draft | VoteState::Cancelled => true,
            VoteState::Closed => self.exported,
            VoteState::Active => false,
        }
    }
}

#[cfg(test)]
impl VoteSpec {
    pub fn example() -> Self {
        Self {
            title: "Repaint the stairwell".to_string(),
            description: "Contractor quotes are pinned in the chat.".to_string(),
            options: vec!["Yes".to_string(), "No".to_string()],
            deadline: None,
            quorum_percent: Some(50),
        }
    }
}
