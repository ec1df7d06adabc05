use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Roles a token can be issued for.
pub trait Role: Send + Sync + 'static {
    const RIGHTS: Rights;
}

/// What a token holder may do. Admins can do everything voters can.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rights {
    Voter,
    Admin,
}

impl Display for Rights {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            formatter,
            "{}",
            match self {
                Self::Voter => "voter",
                Self::Admin => "admin",
            }
        )
    }
}

/// Marker for routes any registered chat user may call.
pub struct Voter;

impl Role for Voter {
    const RIGHTS: Rights = Rights::Voter;
}

/// Marker for routes reserved to association admins.
pub struct Admin;

impl Role for Admin {
    const RIGHTS: Rights = Rights::Admin;
}
