use std::collections::HashSet;
use std::sync::Arc;

use crate::error::Result;
use crate::model::{Ballot, OptionCount, OptionId, VoteId};
use crate::store::Store;

/// What recording a ballot did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cast {
    First,
    Changed { from: OptionId },
    /// A ballot cast later was already stored and stays.
    Superseded { by: Ballot },
}

/// Ballot records for all votes.
///
/// The ledger does not check eligibility or vote state; the engine does that
/// before anything is recorded.
pub struct Ledger {
    store: Arc<dyn Store>,
}

impl Ledger {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Record a ballot, replacing the member's earlier ballot in the same vote
    /// unless that one was cast later.
    pub async fn cast(&self, ballot: &Ballot) -> Result<Cast> {
        let cast = match self.store.upsert_ballot(ballot).await? {
            None => Cast::First,
            Some(stored) if stored.cast_at > ballot.cast_at => Cast::Superseded { by: stored },
            Some(previous) => Cast::Changed {
                from: previous.option,
            },
        };
        match &cast {
            Cast::First => info!(
                "Ballot recorded: vote {} member {} chose `{}`",
                ballot.vote_id, ballot.member_id, ballot.option
            ),
            Cast::Changed { from } => info!(
                "Ballot recorded: vote {} member {} changed `{from}` -> `{}`",
                ballot.vote_id, ballot.member_id, ballot.option
            ),
            Cast::Superseded { by } => info!(
                "Ballot ignored: vote {} member {} already chose `{}` at {}",
                ballot.vote_id, ballot.member_id, by.option, by.cast_at
            ),
        }
        Ok(cast)
    }

    pub async fn ballots(&self, vote_id: VoteId) -> Result<Vec<Ballot>> {
        self.store.ballots(vote_id).await
    }

    /// Current count per option, in the given option order.
    pub async fn tally(&self, vote_id: VoteId, options: &[OptionId]) -> Result<Vec<OptionCount>> {
        Ok(tally(options, &self.ballots(vote_id).await?))
    }

    pub async fn count_distinct_voters(&self, vote_id: VoteId) -> Result<u64> {
        Ok(count_distinct_voters(&self.ballots(vote_id).await?))
    }
}

/// Count ballots per option. Every option appears, even with zero ballots.
pub fn tally(options: &[OptionId], ballots: &[Ballot]) -> Vec<OptionCount> {
    let mut counts: Vec<OptionCount> = options
        .iter()
        .map(|option| OptionCount {
            option: option.clone(),
            count: 0,
        })
        .collect();
    for ballot in ballots {
        match counts.iter_mut().find(|c| c.option == ballot.option) {
            Some(count) => count.count += 1,
            None => warn!(
                "Ignoring ballot for unknown option `{}` in vote {}",
                ballot.option, ballot.vote_id
            ),
        }
    }
    counts
}

pub fn count_distinct_voters(ballots: &[Ballot]) -> u64 {
    ballots
        .iter()
        .map(|ballot| ballot.member_id)
        .collect::<HashSet<_>>()
        .len() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Utc;

    use crate::store::MemoryStore;

    fn options() -> Vec<OptionId> {
        vec!["A".to_string(), "B".to_string(), "C".to_string()]
    }

    #[test]
    fn tally_is_zero_filled_in_option_order() {
        let ballots = vec![
            Ballot::new(1, 1, "B", Utc::now()),
            Ballot::new(1, 2, "B", Utc::now()),
        ];
        let counts = tally(&options(), &ballots);
        let summary: Vec<(&str, u64)> = counts
            .iter()
            .map(|c| (c.option.as_str(), c.count))
            .collect();
        assert_eq!(summary, vec![("A", 0), ("B", 2), ("C", 0)]);
    }

    #[test]
    fn tally_skips_unknown_options() {
        let ballots = vec![Ballot::new(1, 1, "D", Utc::now())];
        assert!(tally(&options(), &ballots).iter().all(|c| c.count == 0));
    }

    #[rocket::async_test]
    async fn recast_replaces_previous_choice() {
        let store = MemoryStore::new();
        let ledger = Ledger::new(Arc::new(store.clone()));

        let now = Utc::now();
        let first = ledger.cast(&Ballot::new(1, 5, "A", now)).await.unwrap();
        assert_eq!(first, Cast::First);
        let second = ledger.cast(&Ballot::new(1, 5, "B", now)).await.unwrap();
        assert_eq!(
            second,
            Cast::Changed {
                from: "A".to_string()
            }
        );

        let counts = ledger.tally(1, &options()).await.unwrap();
        assert_eq!(counts[0].count, 0);
        assert_eq!(counts[1].count, 1);
        assert_eq!(ledger.count_distinct_voters(1).await.unwrap(), 1);
        assert_eq!(store.ballot_rows(1), 1);
    }

    #[rocket::async_test]
    async fn older_ballot_does_not_replace_newer() {
        let store = MemoryStore::new();
        let ledger = Ledger::new(Arc::new(store.clone()));
        let now = Utc::now();

        let newer = Ballot::new(1, 5, "B", now);
        ledger.cast(&newer).await.unwrap();
        let older = Ballot::new(1, 5, "A", now - chrono::Duration::minutes(5));
        let cast = ledger.cast(&older).await.unwrap();
        assert_eq!(cast, Cast::Superseded { by: newer.clone() });

        assert_eq!(ledger.ballots(1).await.unwrap(), vec![newer]);
        let counts = ledger.tally(1, &options()).await.unwrap();
        assert_eq!(counts[0].count, 0);
        assert_eq!(counts[1].count, 1);
    }
}
