//! Data types shared by the engine, the stores and the API.

pub mod auth;
pub mod mongodb;

mod ballot;
mod member;
mod notification;
mod reminder;
mod result;
mod vote;

pub use ballot::Ballot;
pub use member::{Member, MemberStatus, Registration};
pub use notification::Notification;
pub use reminder::Reminder;
pub use result::{ClosedResult, OptionCount, Outcome};
pub use vote::{Vote, VoteDefaults, VoteSpec, VoteState, MAX_OPTIONS, MIN_OPTIONS};

/// Votes are numbered sequentially from 1.
pub type VoteId = u32;

/// Members are identified by their chat platform user ID.
pub type MemberId = i64;

/// Options are identified by their display text, unique within a vote.
pub type OptionId = String;
