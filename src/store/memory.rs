use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::Result;
use crate::model::{Ballot, Member, MemberId, Reminder, Vote, VoteId, VoteState};

use super::{MemberDirectory, Store};

#[derive(Default)]
struct Inner {
    members: BTreeMap<MemberId, Member>,
    votes: BTreeMap<VoteId, Vote>,
    ballots: BTreeMap<(VoteId, MemberId), Ballot>,
    reminders: BTreeMap<VoteId, Reminder>,
    last_vote_id: VoteId,
}

/// A store that keeps everything in process memory.
///
/// Clones share the same data. Nothing survives a restart.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // No operation leaves the maps half-updated, so a poisoned lock is still usable.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of ballot rows held for a vote.
    pub fn ballot_rows(&self, vote_id: VoteId) -> usize {
        self.lock()
            .ballots
            .range((vote_id, MemberId::MIN)..=(vote_id, MemberId::MAX))
            .count()
    }
}

#[rocket::async_trait]
impl MemberDirectory for MemoryStore {
    async fn is_approved_and_eligible(&self, member_id: MemberId) -> Result<bool> {
        Ok(self
            .lock()
            .members
            .get(&member_id)
            .map_or(false, Member::can_vote))
    }

    async fn count_eligible_members(&self) -> Result<u64> {
        Ok(self.lock().members.values().filter(|m| m.can_vote()).count() as u64)
    }

    async fn eligible_members(&self) -> Result<Vec<MemberId>> {
        Ok(self
            .lock()
            .members
            .values()
            .filter(|m| m.can_vote())
            .map(|m| m.id)
            .collect())
    }
}

#[rocket::async_trait]
impl Store for MemoryStore {
    async fn insert_member(&self, member: &Member) -> Result<bool> {
        let mut inner = self.lock();
        if inner.members.contains_key(&member.id) {
            return Ok(false);
        }
        inner.members.insert(member.id, member.clone());
        Ok(true)
    }

    async fn member(&self, member_id: MemberId) -> Result<Option<Member>> {
        Ok(self.lock().members.get(&member_id).cloned())
    }

    async fn replace_member(&self, member: &Member) -> Result<()> {
        self.lock().members.insert(member.id, member.clone());
        Ok(())
    }

    async fn next_vote_id(&self) -> Result<VoteId> {
        let mut inner = self.lock();
        inner.last_vote_id += 1;
        Ok(inner.last_vote_id)
    }

    async fn insert_vote(&self, vote: &Vote) -> Result<()> {
        self.lock().votes.insert(vote.id, vote.clone());
        Ok(())
    }

    async fn vote(&self, vote_id: VoteId) -> Result<Option<Vote>> {
        Ok(self.lock().votes.get(&vote_id).cloned())
    }

    async fn votes(&self, state: Option<VoteState>) -> Result<Vec<Vote>> {
        Ok(self
            .lock()
            .votes
            .values()
            .filter(|vote| state.map_or(true, |state| vote.state == state))
            .cloned()
            .collect())
    }

    async fn replace_vote_if(&self, vote: &Vote, expected: VoteState) -> Result<bool> {
        let mut inner = self.lock();
        match inner.votes.get_mut(&vote.id) {
            Some(stored) if stored.state == expected => {
                *stored = vote.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_exported(&self, vote_id: VoteId) -> Result<bool> {
        let mut inner = self.lock();
        match inner.votes.get_mut(&vote_id) {
            Some(vote) if vote.state == VoteState::Closed && !vote.exported => {
                vote.exported = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_vote(&self, vote_id: VoteId) -> Result<()> {
        let mut inner = self.lock();
        inner.votes.remove(&vote_id);
        inner.reminders.remove(&vote_id);
        inner
            .ballots
            .retain(|&(ballot_vote, _), _| ballot_vote != vote_id);
        Ok(())
    }

    async fn upsert_ballot(&self, ballot: &Ballot) -> Result<Option<Ballot>> {
        let mut inner = self.lock();
        let key = (ballot.vote_id, ballot.member_id);
        match inner.ballots.get(&key) {
            Some(stored) if stored.cast_at > ballot.cast_at => Ok(Some(stored.clone())),
            _ => Ok(inner.ballots.insert(key, ballot.clone())),
        }
    }

    async fn ballots(&self, vote_id: VoteId) -> Result<Vec<Ballot>> {
        Ok(self
            .lock()
            .ballots
            .range((vote_id, MemberId::MIN)..=(vote_id, MemberId::MAX))
            .map(|(_, ballot)| ballot.clone())
            .collect())
    }

    async fn insert_reminder(&self, reminder: &Reminder) -> Result<()> {
        self.lock()
            .reminders
            .entry(reminder.vote_id)
            .or_insert_with(|| reminder.clone());
        Ok(())
    }

    async fn reminder(&self, vote_id: VoteId) -> Result<Option<Reminder>> {
        Ok(self.lock().reminders.get(&vote_id).cloned())
    }

    async fn mark_reminder_fired(&self, vote_id: VoteId) -> Result<bool> {
        let mut inner = self.lock();
        match inner.reminders.get_mut(&vote_id) {
            Some(reminder) if !reminder.fired => {
                reminder.fired = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
