use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use rocket::tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::model::VoteId;

/// One async mutex per vote.
///
/// Everything that reads a vote and then writes it holds that vote's lock for
/// the whole read-modify-write, so casts, closes and cancels on the same vote
/// never interleave. Different votes never contend.
#[derive(Default)]
pub struct VoteLocks {
    locks: Mutex<HashMap<VoteId, Arc<AsyncMutex<()>>>>,
}

impl VoteLocks {
    pub async fn lock(&self, vote_id: VoteId) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(vote_id)
            .or_default()
            .clone();
        lock.lock_owned().await
    }

    /// Drop the lock of a purged vote.
    pub fn forget(&self, vote_id: VoteId) {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&vote_id);
    }
}
