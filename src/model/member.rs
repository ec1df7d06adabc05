use std::fmt::{self, Display, Formatter};

use chrono::{DateTime, Utc};
use mongodb::bson::{to_bson, Bson};
use serde::{Deserialize, Serialize};

use super::MemberId;

/// Where a member's registration stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberStatus {
    Pending,
    Approved,
    Rejected,
}

impl Display for MemberStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        })
    }
}

impl From<MemberStatus> for Bson {
    fn from(status: MemberStatus) -> Self {
        to_bson(&status).expect("Serialisation is infallible")
    }
}

/// An association member, identified by their chat user ID.
///
/// Members are never deleted. Deactivation only clears `eligible`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    #[serde(rename = "_id")]
    pub id: MemberId,
    pub name: String,
    pub status: MemberStatus,
    pub eligible: bool,
    #[serde(default)]
    pub is_admin: bool,
    pub registered_at: DateTime<Utc>,
    #[serde(default)]
    pub decided_at: Option<DateTime<Utc>>,
}

impl Member {
    /// A fresh registration awaiting admin review.
    pub fn new(id: MemberId, name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name: name.into(),
            status: MemberStatus::Pending,
            eligible: false,
            is_admin: false,
            registered_at: now,
            decided_at: None,
        }
    }

    /// Only approved, currently eligible members may vote or count towards quorum.
    pub fn can_vote(&self) -> bool {
        self.status == MemberStatus::Approved && self.eligible
    }
}

/// Body of a registration request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registration {
    pub name: String,
}

#[cfg(test)]
impl Member {
    /// An approved, eligible member.
    pub fn approved_example(id: MemberId) -> Self {
        Self {
            status: MemberStatus::Approved,
            eligible: true,
            decided_at: Some(Utc::now()),
            ..Self::new(id, format!("Member {id}"), Utc::now())
        }
    }
}
