//! Persistence behind the engine.
//!
//! The engine only needs CRUD access, so stores are traits with an
//! in-memory implementation for tests and single-process deployments and a
//! MongoDB implementation for production.

use crate::error::Result;
use crate::model::{Ballot, Member, MemberId, Reminder, Vote, VoteId, VoteState};

mod memory;
mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

/// Who may vote. Consulted by the engine on every cast and when closing.
#[rocket::async_trait]
pub trait MemberDirectory: Send + Sync {
    async fn is_approved_and_eligible(&self, member_id: MemberId) -> Result<bool>;

    async fn count_eligible_members(&self) -> Result<u64>;

    /// IDs of every approved, eligible member.
    async fn eligible_members(&self) -> Result<Vec<MemberId>>;
}

/// Records owned by the engine and the member registry.
#[rocket::async_trait]
pub trait Store: Send + Sync {
    /// Insert a new member. Returns false if the ID is already registered.
    async fn insert_member(&self, member: &Member) -> Result<bool>;

    async fn member(&self, member_id: MemberId) -> Result<Option<Member>>;

    async fn replace_member(&self, member: &Member) -> Result<()>;

    /// Allocate the next vote ID.
    async fn next_vote_id(&self) -> Result<VoteId>;

    async fn insert_vote(&self, vote: &Vote) -> Result<()>;

    async fn vote(&self, vote_id: VoteId) -> Result<Option<Vote>>;

    /// All votes, optionally in one state, ordered by ID.
    async fn votes(&self, state: Option<VoteState>) -> Result<Vec<Vote>>;

    /// Replace a vote only while its stored state is still `expected`.
    /// Returns whether the replacement happened.
    async fn replace_vote_if(&self, vote: &Vote, expected: VoteState) -> Result<bool>;

    /// Set the exported marker on a closed vote. Returns false if it was already set.
    async fn mark_exported(&self, vote_id: VoteId) -> Result<bool>;

    /// Delete a vote together with its ballots and reminder.
    async fn delete_vote(&self, vote_id: VoteId) -> Result<()>;

    /// Insert or replace the ballot for its (vote, member) pair, returning the
    /// ballot stored before the call. A stored ballot with a later `cast_at`
    /// is kept and the new one discarded.
    async fn upsert_ballot(&self, ballot: &Ballot) -> Result<Option<Ballot>>;

    async fn ballots(&self, vote_id: VoteId) -> Result<Vec<Ballot>>;

    async fn insert_reminder(&self, reminder: &Reminder) -> Result<()>;

    async fn reminder(&self, vote_id: VoteId) -> Result<Option<Reminder>>;

    /// Flip the fired flag. Returns false if the reminder had already fired.
    async fn mark_reminder_fired(&self, vote_id: VoteId) -> Result<bool>;
}
