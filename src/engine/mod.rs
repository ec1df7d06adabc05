//! The voting lifecycle engine.
//!
//! [`VotingEngine`] owns every state transition of a vote. Operations that
//! read and then write a vote hold that vote's lock throughout, and the final
//! write is a compare-and-set on the state the operation started from, so a
//! vote closes at most once and no ballot lands after the closing snapshot.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::model::{
    Ballot, ClosedResult, MemberId, Notification, OptionCount, Outcome, Reminder, Vote,
    VoteDefaults, VoteId, VoteSpec, VoteState,
};
use crate::notify::EventSink;
use crate::store::{MemberDirectory, Store};

pub mod clock;
pub mod ledger;
pub mod policy;
pub mod quorum;
pub mod scheduler;

mod audit;
mod locks;

pub use audit::{Discrepancy, VoteDump};
pub use scheduler::{Scheduler, SchedulerFairing, TickReport};

use ledger::{Cast, Ledger};
use locks::VoteLocks;
use policy::{ClosingPolicy, UntilDeadline};
use quorum::QuorumReport;

/// Tunables of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub defaults: VoteDefaults,
    /// How long before the deadline the reminder fires.
    pub reminder_lead: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            defaults: VoteDefaults::default(),
            reminder_lead: Duration::hours(24),
        }
    }
}

/// What a close request did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CloseOutcome {
    /// This call closed the vote.
    Closed { result: ClosedResult },
    /// The vote was already terminal; nothing changed.
    AlreadyClosed {
        state: VoteState,
        result: Option<ClosedResult>,
    },
    /// The deadline has not passed yet.
    NotDue { deadline: DateTime<Utc> },
}

impl CloseOutcome {
    pub fn result(&self) -> Option<&ClosedResult> {
        match self {
            Self::Closed { result } => Some(result),
            Self::AlreadyClosed { result, .. } => result.as_ref(),
            Self::NotDue { .. } => None,
        }
    }
}

/// What happened to a vote's reminder on a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderOutcome {
    Fired { recipients: usize },
    /// The deadline passed before the reminder could go out.
    Stale,
    NotDue,
}

/// Live participation in a vote.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuorumStatus {
    pub vote_id: VoteId,
    pub state: VoteState,
    pub counts: Vec<OptionCount>,
    #[serde(flatten)]
    pub report: QuorumReport,
}

pub struct VotingEngine {
    store: Arc<dyn Store>,
    members: Arc<dyn MemberDirectory>,
    ledger: Ledger,
    events: Arc<dyn EventSink>,
    policy: Box<dyn ClosingPolicy>,
    settings: EngineSettings,
    locks: VoteLocks,
}

impl VotingEngine {
    pub fn new(
        store: Arc<dyn Store>,
        members: Arc<dyn MemberDirectory>,
        events: Arc<dyn EventSink>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            ledger: Ledger::new(store.clone()),
            store,
            members,
            events,
            policy: Box::new(UntilDeadline),
            settings,
            locks: VoteLocks::default(),
        }
    }

    /// Replace the early-closing policy.
    pub fn with_policy(mut self, policy: impl ClosingPolicy + 'static) -> Self {
        self.policy = Box::new(policy);
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Save a vote definition without opening it.
    pub async fn create_draft(&self, spec: VoteSpec, now: DateTime<Utc>) -> Result<Vote> {
        spec.check_structure()?;
        let id = self.store.next_vote_id().await?;
        let vote = Vote::draft(id, spec, now, self.settings.defaults);
        self.store.insert_vote(&vote).await?;
        info!("Vote {id} drafted: {}", vote.title);
        Ok(vote)
    }

    /// Create and open a vote in one step. Nothing is stored if the definition is invalid.
    pub async fn publish(&self, spec: VoteSpec, now: DateTime<Utc>) -> Result<Vote> {
        spec.check(now)?;
        let id = self.store.next_vote_id().await?;
        let mut vote = Vote::draft(id, spec, now, self.settings.defaults);
        vote.activate(now, self.settings.defaults)?;
        self.store.insert_vote(&vote).await?;
        self.announce(&vote).await;
        Ok(vote)
    }

    /// Open a previously drafted vote.
    pub async fn publish_draft(&self, vote_id: VoteId, now: DateTime<Utc>) -> Result<Vote> {
        let _guard = self.locks.lock(vote_id).await;
        let mut vote = self.load(vote_id).await?;
        vote.activate(now, self.settings.defaults)?;
        if !self.store.replace_vote_if(&vote, VoteState::Draft).await? {
            return Err(self.lost_race(vote_id, "be published").await);
        }
        self.announce(&vote).await;
        Ok(vote)
    }

    /// Schedule the reminder and tell members a vote opened.
    async fn announce(&self, vote: &Vote) {
        let reminder = Reminder::for_vote(vote, self.settings.reminder_lead);
        match self.store.insert_reminder(&reminder).await {
            Ok(()) => info!(
                "Vote {} opened until {}, reminder at {}",
                vote.id, vote.deadline, reminder.fire_at
            ),
            Err(e) => error!("Vote {} opened, but its reminder was not saved: {e}", vote.id),
        }
        self.events.publish(Notification::opened(vote));
    }

    /// Record `member_id`'s choice, replacing any earlier ballot of theirs.
    ///
    /// Returns the ballot that stands afterwards. That is the stored one if it
    /// was cast after `now`.
    pub async fn cast_ballot(
        &self,
        vote_id: VoteId,
        member_id: MemberId,
        option: &str,
        now: DateTime<Utc>,
    ) -> Result<Ballot> {
        let _guard = self.locks.lock(vote_id).await;
        let vote = self.load(vote_id).await?;

        if !vote.accepts_ballots(now) {
            let action = if vote.state == VoteState::Active {
                "accept ballots after its deadline"
            } else {
                "accept ballots"
            };
            info!("Rejected ballot from member {member_id} in vote {vote_id}: {}", vote.state);
            return Err(Error::InvalidState {
                vote_id,
                state: vote.state,
                action,
            });
        }
        if !self.members.is_approved_and_eligible(member_id).await? {
            info!("Rejected ballot from ineligible member {member_id} in vote {vote_id}");
            return Err(Error::NotEligible(member_id));
        }
        if !vote.has_option(option) {
            return Err(Error::UnknownOption {
                vote_id,
                option: option.to_string(),
            });
        }

        let ballot = Ballot::new(vote_id, member_id, option, now);
        if let Cast::Superseded { by } = self.ledger.cast(&ballot).await? {
            return Ok(by);
        }

        if self.policy.is_active() {
            if let Err(e) = self.apply_policy(vote, now).await {
                error!("Early closing check for vote {vote_id} failed: {e}");
            }
        }
        Ok(ballot)
    }

    async fn apply_policy(&self, vote: Vote, now: DateTime<Utc>) -> Result<()> {
        let ballots = self.ledger.ballots(vote.id).await?;
        let eligible = self.members.eligible_members().await?;
        if self.policy.should_close_early(&vote, &ballots, &eligible) {
            info!("Vote {} closing early", vote.id);
            self.close_locked(vote, now).await?;
        }
        Ok(())
    }

    /// Close the vote if its deadline has passed.
    pub async fn close_if_due(&self, vote_id: VoteId, now: DateTime<Utc>) -> Result<CloseOutcome> {
        let _guard = self.locks.lock(vote_id).await;
        let vote = self.load(vote_id).await?;
        match vote.state {
            VoteState::Active if now >= vote.deadline => self.close_locked(vote, now).await,
            VoteState::Active => Ok(CloseOutcome::NotDue {
                deadline: vote.deadline,
            }),
            VoteState::Draft => Err(Error::InvalidState {
                vote_id,
                state: vote.state,
                action: "be closed",
            }),
            VoteState::Closed | VoteState::Cancelled => Ok(already_closed(vote)),
        }
    }

    /// Close an active vote now, regardless of its deadline.
    pub async fn force_close(&self, vote_id: VoteId, now: DateTime<Utc>) -> Result<CloseOutcome> {
        let _guard = self.locks.lock(vote_id).await;
        let vote = self.load(vote_id).await?;
        match vote.state {
            VoteState::Active => {
                if now < vote.deadline {
                    info!("Vote {vote_id} closed early by an admin");
                }
                self.close_locked(vote, now).await
            }
            VoteState::Draft => Err(Error::InvalidState {
                vote_id,
                state: vote.state,
                action: "be closed",
            }),
            VoteState::Closed | VoteState::Cancelled => Ok(already_closed(vote)),
        }
    }

    /// Take the closing snapshot and move an active vote to `Closed`.
    /// The caller must hold the vote's lock.
    async fn close_locked(&self, mut vote: Vote, now: DateTime<Utc>) -> Result<CloseOutcome> {
        let ballots = self.ledger.ballots(vote.id).await?;
        let eligible = self.members.count_eligible_members().await?;
        let result = tabulate(&vote, &ballots, eligible, now);

        vote.state = VoteState::Closed;
        vote.closed_at = Some(now);
        vote.result = Some(result.clone());
        if !self.store.replace_vote_if(&vote, VoteState::Active).await? {
            let current = self.load(vote.id).await?;
            warn!("Vote {} was already {} when closing", vote.id, current.state);
            return Ok(already_closed(current));
        }

        info!(
            "Vote {} closed: {} of {} eligible voted ({:.1}%), {}",
            vote.id,
            result.distinct_voters,
            result.eligible_members,
            result.turnout_percent,
            result.outcome
        );
        self.events.publish(Notification::closed(&vote, result.clone()));
        Ok(CloseOutcome::Closed { result })
    }

    /// Abandon a draft or active vote. Cancelling a cancelled vote is a no-op.
    pub async fn cancel(&self, vote_id: VoteId, now: DateTime<Utc>) -> Result<Vote> {
        let _guard = self.locks.lock(vote_id).await;
        let mut vote = self.load(vote_id).await?;
        let expected = vote.state;
        match expected {
            VoteState::Cancelled => return Ok(vote),
            VoteState::Closed => {
                return Err(Error::InvalidState {
                    vote_id,
                    state: expected,
                    action: "be cancelled",
                })
            }
            VoteState::Draft | VoteState::Active => {}
        }

        vote.state = VoteState::Cancelled;
        vote.closed_at = Some(now);
        if !self.store.replace_vote_if(&vote, expected).await? {
            return Err(self.lost_race(vote_id, "be cancelled").await);
        }
        info!("Vote {vote_id} cancelled while {expected}");
        Ok(vote)
    }

    /// Re-evaluate quorum against the live ballots and current eligibility.
    pub async fn quorum_status(&self, vote_id: VoteId) -> Result<QuorumStatus> {
        let vote = self.load(vote_id).await?;
        let ballots = self.ledger.ballots(vote_id).await?;
        let eligible = self.members.count_eligible_members().await?;
        Ok(QuorumStatus {
            vote_id,
            state: vote.state,
            counts: ledger::tally(&vote.options, &ballots),
            report: quorum::evaluate(&ballots, eligible, vote.quorum_percent),
        })
    }

    pub async fn get_vote(&self, vote_id: VoteId) -> Result<Vote> {
        self.load(vote_id).await
    }

    pub async fn list_votes(&self, state: Option<VoteState>) -> Result<Vec<Vote>> {
        self.store.votes(state).await
    }

    /// The frozen result of a closed vote.
    pub async fn get_result(&self, vote_id: VoteId) -> Result<ClosedResult> {
        let vote = self.load(vote_id).await?;
        match (vote.state, vote.result) {
            (VoteState::Closed, Some(result)) => Ok(result),
            _ => Err(Error::NotClosed(vote_id)),
        }
    }

    /// Everything needed to audit a vote independently.
    pub async fn dump(&self, vote_id: VoteId) -> Result<VoteDump> {
        let vote = self.load(vote_id).await?;
        let ballots = self.ledger.ballots(vote_id).await?;
        Ok(VoteDump { vote, ballots })
    }

    /// Record that a closed vote's result reached the export.
    /// Returns false if it was already marked.
    pub async fn mark_exported(&self, vote_id: VoteId) -> Result<bool> {
        let vote = self.load(vote_id).await?;
        if vote.state != VoteState::Closed {
            return Err(Error::NotClosed(vote_id));
        }
        self.store.mark_exported(vote_id).await
    }

    /// Delete a vote with its ballots and reminder.
    ///
    /// Only drafts, cancelled votes and exported closed votes can be purged.
    pub async fn purge(&self, vote_id: VoteId) -> Result<()> {
        let guard = self.locks.lock(vote_id).await;
        let vote = self.load(vote_id).await?;
        if !vote.is_purgeable() {
            let action = if vote.state == VoteState::Closed {
                "be purged before it is exported"
            } else {
                "be purged"
            };
            return Err(Error::InvalidState {
                vote_id,
                state: vote.state,
                action,
            });
        }
        self.store.delete_vote(vote_id).await?;
        self.locks.forget(vote_id);
        drop(guard);
        info!("Vote {vote_id} purged");
        Ok(())
    }

    /// Fire the vote's reminder if it is due and has not fired yet.
    pub async fn fire_reminder_if_due(
        &self,
        vote_id: VoteId,
        now: DateTime<Utc>,
    ) -> Result<ReminderOutcome> {
        let _guard = self.locks.lock(vote_id).await;
        let vote = self.load(vote_id).await?;
        if vote.state != VoteState::Active {
            return Ok(ReminderOutcome::NotDue);
        }
        match self.store.reminder(vote_id).await? {
            Some(reminder) if reminder.is_due(now) => {}
            _ => return Ok(ReminderOutcome::NotDue),
        }

        if now >= vote.deadline {
            if self.store.mark_reminder_fired(vote_id).await? {
                info!("Dropped stale reminder for vote {vote_id}");
            }
            return Ok(ReminderOutcome::Stale);
        }

        let pending = self.pending_members(&vote).await?;
        if !self.store.mark_reminder_fired(vote_id).await? {
            return Ok(ReminderOutcome::NotDue);
        }
        let recipients = pending.len();
        info!("Reminder for vote {vote_id} due, {recipients} member(s) have not voted");
        self.events.publish(Notification::reminder(&vote, pending));
        Ok(ReminderOutcome::Fired { recipients })
    }

    /// Eligible members without a ballot in the vote.
    async fn pending_members(&self, vote: &Vote) -> Result<Vec<MemberId>> {
        let voted: HashSet<MemberId> = self
            .ledger
            .ballots(vote.id)
            .await?
            .into_iter()
            .map(|ballot| ballot.member_id)
            .collect();
        Ok(self
            .members
            .eligible_members()
            .await?
            .into_iter()
            .filter(|member| !voted.contains(member))
            .collect())
    }

    async fn load(&self, vote_id: VoteId) -> Result<Vote> {
        self.store
            .vote(vote_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("vote {vote_id}")))
    }

    /// The error for a compare-and-set that found the vote in another state.
    async fn lost_race(&self, vote_id: VoteId, action: &'static str) -> Error {
        match self.load(vote_id).await {
            Ok(vote) => Error::InvalidState {
                vote_id,
                state: vote.state,
                action,
            },
            Err(e) => e,
        }
    }
}

fn already_closed(vote: Vote) -> CloseOutcome {
    CloseOutcome::AlreadyClosed {
        state: vote.state,
        result: vote.result,
    }
}

/// Compute the final result of a vote from its ballots.
pub fn tabulate(
    vote: &Vote,
    ballots: &[Ballot],
    eligible_members: u64,
    closed_at: DateTime<Utc>,
) -> ClosedResult {
    let counts = ledger::tally(&vote.options, ballots);
    let report = quorum::evaluate(ballots, eligible_members, vote.quorum_percent);
    let outcome = if report.meets_quorum {
        decide(&counts)
    } else {
        Outcome::NoQuorum
    };
    ClosedResult {
        vote_id: vote.id,
        counts,
        distinct_voters: report.distinct_voters,
        eligible_members,
        turnout_percent: report.turnout_percent,
        quorum_percent: vote.quorum_percent,
        meets_quorum: report.meets_quorum,
        outcome,
        closed_at,
    }
}

/// Pick the option with the most ballots, or report the tie.
fn decide(counts: &[OptionCount]) -> Outcome {
    let top = counts.iter().map(|c| c.count).max().unwrap_or(0);
    let mut leaders: Vec<_> = counts
        .iter()
        .filter(|c| c.count == top)
        .map(|c| c.option.clone())
        .collect();
    if leaders.len() == 1 {
        Outcome::Winner {
            option: leaders.remove(0),
        }
    } else {
        Outcome::Tied { options: leaders }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::TimeZone;
    use rocket::futures::future::join_all;

    use crate::model::Member;
    use crate::notify::RecordingSink;
    use crate::store::MemoryStore;

    use super::policy::Unanimity;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    struct Fixture {
        engine: VotingEngine,
        store: MemoryStore,
        events: RecordingSink,
    }

    /// An engine over `eligible` approved members with IDs `1..=eligible`.
    async fn fixture(eligible: i64) -> Fixture {
        let store = MemoryStore::new();
        for id in 1..=eligible {
            store
                .insert_member(&Member::approved_example(id))
                .await
                .unwrap();
        }
        let events = RecordingSink::default();
        let engine = VotingEngine::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(events.clone()),
            EngineSettings::default(),
        );
        Fixture {
            engine,
            store,
            events,
        }
    }

    fn spec(options: &[&str]) -> VoteSpec {
        VoteSpec {
            options: options.iter().map(|o| o.to_string()).collect(),
            deadline: Some(start() + Duration::days(3)),
            ..VoteSpec::example()
        }
    }

    async fn cast_all(f: &Fixture, vote_id: VoteId, ballots: &[(MemberId, &str)]) {
        for &(member, option) in ballots {
            f.engine
                .cast_ballot(vote_id, member, option, start() + Duration::hours(1))
                .await
                .unwrap();
        }
    }

    fn after_deadline() -> DateTime<Utc> {
        start() + Duration::days(3)
    }

    #[rocket::async_test]
    async fn publish_opens_vote_and_schedules_reminder() {
        let f = fixture(3).await;
        let vote = f.engine.publish(spec(&["Yes", "No"]), start()).await.unwrap();

        assert_eq!(vote.state, VoteState::Active);
        assert_eq!(vote.created_at, start());
        let reminder = f.store.reminder(vote.id).await.unwrap().unwrap();
        assert_eq!(reminder.fire_at, vote.deadline - Duration::hours(24));
        assert!(!reminder.fired);
        assert_eq!(f.events.count("vote_opened"), 1);
    }

    #[rocket::async_test]
    async fn invalid_definition_creates_nothing() {
        let f = fixture(3).await;
        let result = f.engine.publish(spec(&["Only"]), start()).await;
        assert!(matches!(result, Err(Error::InvalidVoteDefinition(_))));

        let past = VoteSpec {
            deadline: Some(start() - Duration::hours(1)),
            ..spec(&["Yes", "No"])
        };
        let result = f.engine.publish(past, start()).await;
        assert!(matches!(result, Err(Error::InvalidVoteDefinition(_))));

        assert!(f.engine.list_votes(None).await.unwrap().is_empty());
        assert!(f.events.events().is_empty());
    }

    #[rocket::async_test]
    async fn draft_publishes_once() {
        let f = fixture(3).await;
        let draft = f.engine.create_draft(spec(&["Yes", "No"]), start()).await.unwrap();
        assert_eq!(draft.state, VoteState::Draft);
        assert!(f.store.reminder(draft.id).await.unwrap().is_none());
        assert!(f.events.events().is_empty());

        let vote = f.engine.publish_draft(draft.id, start()).await.unwrap();
        assert_eq!(vote.state, VoteState::Active);
        assert_eq!(f.events.count("vote_opened"), 1);

        let again = f.engine.publish_draft(draft.id, start()).await;
        assert!(matches!(
            again,
            Err(Error::InvalidState {
                state: VoteState::Active,
                ..
            })
        ));
        assert_eq!(f.events.count("vote_opened"), 1);
    }

    #[rocket::async_test]
    async fn below_quorum_closes_without_result() {
        let f = fixture(10).await;
        let vote = f.engine.publish(spec(&["Yes", "No"]), start()).await.unwrap();
        cast_all(&f, vote.id, &[(1, "Yes"), (2, "Yes"), (3, "No"), (4, "Yes")]).await;

        let outcome = f.engine.close_if_due(vote.id, after_deadline()).await.unwrap();
        let result = outcome.result().unwrap();
        assert!(matches!(outcome, CloseOutcome::Closed { .. }));
        assert_eq!(result.turnout_percent, 40.0);
        assert!(!result.meets_quorum);
        assert_eq!(result.outcome, Outcome::NoQuorum);
        assert_eq!(result.count_for("Yes"), Some(3));
    }

    #[rocket::async_test]
    async fn even_split_is_a_tie() {
        let f = fixture(10).await;
        let vote = f.engine.publish(spec(&["A", "B", "C"]), start()).await.unwrap();
        cast_all(
            &f,
            vote.id,
            &[(1, "A"), (2, "A"), (3, "A"), (4, "B"), (5, "B"), (6, "B")],
        )
        .await;

        let outcome = f.engine.close_if_due(vote.id, after_deadline()).await.unwrap();
        let result = outcome.result().unwrap();
        assert!(result.meets_quorum);
        assert_eq!(result.turnout_percent, 60.0);
        assert_eq!(
            result.outcome,
            Outcome::Tied {
                options: vec!["A".to_string(), "B".to_string()]
            }
        );
        assert_eq!(result.count_for("C"), Some(0));
    }

    #[rocket::async_test]
    async fn clear_majority_wins() {
        let f = fixture(4).await;
        let vote = f.engine.publish(spec(&["Yes", "No"]), start()).await.unwrap();
        cast_all(&f, vote.id, &[(1, "Yes"), (2, "Yes"), (3, "No")]).await;

        let outcome = f.engine.close_if_due(vote.id, after_deadline()).await.unwrap();
        assert_eq!(outcome.result().unwrap().winner(), Some("Yes"));
    }

    #[rocket::async_test]
    async fn recast_moves_the_ballot() {
        let f = fixture(3).await;
        let vote = f.engine.publish(spec(&["A", "B"]), start()).await.unwrap();
        cast_all(&f, vote.id, &[(1, "A"), (1, "B")]).await;

        let status = f.engine.quorum_status(vote.id).await.unwrap();
        assert_eq!(status.counts[0].count, 0);
        assert_eq!(status.counts[1].count, 1);
        assert_eq!(status.report.distinct_voters, 1);
        assert_eq!(f.store.ballot_rows(vote.id), 1);
    }

    #[rocket::async_test]
    async fn concurrent_casts_leave_one_row() {
        let f = fixture(3).await;
        let vote = f.engine.publish(spec(&["A", "B"]), start()).await.unwrap();
        let now = start() + Duration::hours(1);

        let casts = (0..20).map(|i| {
            let option = if i % 2 == 0 { "A" } else { "B" };
            f.engine.cast_ballot(vote.id, 1, option, now)
        });
        for result in join_all(casts).await {
            result.unwrap();
        }

        assert_eq!(f.store.ballot_rows(vote.id), 1);
        let status = f.engine.quorum_status(vote.id).await.unwrap();
        assert_eq!(status.counts.iter().map(|c| c.count).sum::<u64>(), 1);
    }

    #[rocket::async_test]
    async fn closing_twice_emits_once() {
        let f = fixture(3).await;
        let vote = f.engine.publish(spec(&["Yes", "No"]), start()).await.unwrap();
        cast_all(&f, vote.id, &[(1, "Yes"), (2, "Yes")]).await;

        let first = f.engine.close_if_due(vote.id, after_deadline()).await.unwrap();
        let later = after_deadline() + Duration::hours(5);
        let second = f.engine.close_if_due(vote.id, later).await.unwrap();

        let result = first.result().unwrap().clone();
        assert_eq!(
            second,
            CloseOutcome::AlreadyClosed {
                state: VoteState::Closed,
                result: Some(result.clone()),
            }
        );
        assert_eq!(f.engine.get_result(vote.id).await.unwrap(), result);
        assert_eq!(f.events.count("vote_closed"), 1);
    }

    #[rocket::async_test]
    async fn concurrent_closes_close_once() {
        let f = fixture(3).await;
        let vote = f.engine.publish(spec(&["Yes", "No"]), start()).await.unwrap();

        let closes = (0..8).map(|_| f.engine.close_if_due(vote.id, after_deadline()));
        let outcomes = join_all(closes).await;
        let closed = outcomes
            .iter()
            .filter(|o| matches!(o, Ok(CloseOutcome::Closed { .. })))
            .count();
        assert_eq!(closed, 1);
        assert_eq!(f.events.count("vote_closed"), 1);
    }

    #[rocket::async_test]
    async fn not_due_before_deadline() {
        let f = fixture(3).await;
        let vote = f.engine.publish(spec(&["Yes", "No"]), start()).await.unwrap();
        let outcome = f.engine.close_if_due(vote.id, start()).await.unwrap();
        assert_eq!(
            outcome,
            CloseOutcome::NotDue {
                deadline: vote.deadline
            }
        );
        assert!(matches!(
            f.engine.get_result(vote.id).await,
            Err(Error::NotClosed(_))
        ));
    }

    #[rocket::async_test]
    async fn cast_after_close_changes_nothing() {
        let f = fixture(3).await;
        let vote = f.engine.publish(spec(&["Yes", "No"]), start()).await.unwrap();
        cast_all(&f, vote.id, &[(1, "Yes")]).await;
        f.engine.close_if_due(vote.id, after_deadline()).await.unwrap();

        let late = f
            .engine
            .cast_ballot(vote.id, 2, "No", after_deadline())
            .await;
        assert!(matches!(
            late,
            Err(Error::InvalidState {
                state: VoteState::Closed,
                ..
            })
        ));
        assert_eq!(f.store.ballot_rows(vote.id), 1);
        assert_eq!(
            f.engine.get_result(vote.id).await.unwrap().count_for("No"),
            Some(0)
        );
    }

    #[rocket::async_test]
    async fn cast_past_deadline_before_tick_is_rejected() {
        let f = fixture(3).await;
        let vote = f.engine.publish(spec(&["Yes", "No"]), start()).await.unwrap();
        let late = f
            .engine
            .cast_ballot(vote.id, 1, "Yes", vote.deadline)
            .await;
        assert!(matches!(
            late,
            Err(Error::InvalidState {
                state: VoteState::Active,
                ..
            })
        ));
        assert_eq!(f.store.ballot_rows(vote.id), 0);
    }

    #[rocket::async_test]
    async fn cast_checks_eligibility_and_option() {
        let f = fixture(2).await;
        let pending = Member::new(50, "Newcomer", start());
        f.store.insert_member(&pending).await.unwrap();
        let vote = f.engine.publish(spec(&["Yes", "No"]), start()).await.unwrap();
        let now = start() + Duration::hours(1);

        let result = f.engine.cast_ballot(vote.id, 50, "Yes", now).await;
        assert!(matches!(result, Err(Error::NotEligible(50))));
        let result = f.engine.cast_ballot(vote.id, 99, "Yes", now).await;
        assert!(matches!(result, Err(Error::NotEligible(99))));
        let result = f.engine.cast_ballot(vote.id, 1, "Maybe", now).await;
        assert!(matches!(result, Err(Error::UnknownOption { .. })));
        let result = f.engine.cast_ballot(404, 1, "Yes", now).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
        assert_eq!(f.store.ballot_rows(vote.id), 0);
    }

    #[rocket::async_test]
    async fn cannot_vote_in_a_draft() {
        let f = fixture(2).await;
        let draft = f.engine.create_draft(spec(&["Yes", "No"]), start()).await.unwrap();
        let result = f.engine.cast_ballot(draft.id, 1, "Yes", start()).await;
        assert!(matches!(
            result,
            Err(Error::InvalidState {
                state: VoteState::Draft,
                ..
            })
        ));
    }

    #[rocket::async_test]
    async fn zero_ballots_expire_without_quorum() {
        let f = fixture(5).await;
        let vote = f.engine.publish(spec(&["Yes", "No"]), start()).await.unwrap();
        let outcome = f.engine.close_if_due(vote.id, after_deadline()).await.unwrap();
        let result = outcome.result().unwrap();
        assert!(result.expired());
        assert_eq!(result.outcome, Outcome::NoQuorum);
        assert!(result.counts.iter().all(|c| c.count == 0));
    }

    #[rocket::async_test]
    async fn eligibility_is_counted_at_close() {
        let f = fixture(4).await;
        let vote = f.engine.publish(spec(&["Yes", "No"]), start()).await.unwrap();
        cast_all(&f, vote.id, &[(1, "Yes")]).await;

        // Two members leave before the deadline: 1 of 2 meets 50%.
        for id in [3, 4] {
            let mut member = f.store.member(id).await.unwrap().unwrap();
            member.eligible = false;
            f.store.replace_member(&member).await.unwrap();
        }

        let outcome = f.engine.close_if_due(vote.id, after_deadline()).await.unwrap();
        let result = outcome.result().unwrap();
        assert_eq!(result.eligible_members, 2);
        assert!(result.meets_quorum);
        assert_eq!(result.winner(), Some("Yes"));
    }

    #[rocket::async_test]
    async fn cancel_is_terminal() {
        let f = fixture(2).await;
        let vote = f.engine.publish(spec(&["Yes", "No"]), start()).await.unwrap();
        let cancelled = f.engine.cancel(vote.id, start()).await.unwrap();
        assert_eq!(cancelled.state, VoteState::Cancelled);

        // Idempotent.
        assert_eq!(
            f.engine.cancel(vote.id, start()).await.unwrap().state,
            VoteState::Cancelled
        );
        let outcome = f.engine.close_if_due(vote.id, after_deadline()).await.unwrap();
        assert_eq!(
            outcome,
            CloseOutcome::AlreadyClosed {
                state: VoteState::Cancelled,
                result: None
            }
        );
        assert_eq!(f.events.count("vote_closed"), 0);
    }

    #[rocket::async_test]
    async fn closed_vote_cannot_be_cancelled() {
        let f = fixture(2).await;
        let vote = f.engine.publish(spec(&["Yes", "No"]), start()).await.unwrap();
        f.engine.force_close(vote.id, start()).await.unwrap();
        let result = f.engine.cancel(vote.id, start()).await;
        assert!(matches!(
            result,
            Err(Error::InvalidState {
                state: VoteState::Closed,
                ..
            })
        ));
    }

    #[rocket::async_test]
    async fn force_close_ignores_deadline() {
        let f = fixture(2).await;
        let vote = f.engine.publish(spec(&["Yes", "No"]), start()).await.unwrap();
        cast_all(&f, vote.id, &[(1, "No"), (2, "No")]).await;

        let now = start() + Duration::hours(2);
        let outcome = f.engine.force_close(vote.id, now).await.unwrap();
        let result = outcome.result().unwrap();
        assert_eq!(result.closed_at, now);
        assert_eq!(result.winner(), Some("No"));
        let vote = f.engine.get_vote(vote.id).await.unwrap();
        assert_eq!(vote.closed_at, Some(now));
    }

    #[rocket::async_test]
    async fn unanimity_closes_early() {
        let mut f = fixture(3).await;
        f.engine = f.engine.with_policy(Unanimity);
        let vote = f.engine.publish(spec(&["Yes", "No"]), start()).await.unwrap();

        cast_all(&f, vote.id, &[(1, "Yes"), (2, "Yes")]).await;
        assert_eq!(f.engine.get_vote(vote.id).await.unwrap().state, VoteState::Active);

        cast_all(&f, vote.id, &[(3, "Yes")]).await;
        let vote = f.engine.get_vote(vote.id).await.unwrap();
        assert_eq!(vote.state, VoteState::Closed);
        assert_eq!(vote.result.unwrap().winner(), Some("Yes"));
        assert_eq!(f.events.count("vote_closed"), 1);
    }

    #[rocket::async_test]
    async fn unanimity_waits_for_members_who_joined_later() {
        let mut f = fixture(3).await;
        f.engine = f.engine.with_policy(Unanimity);
        let vote = f.engine.publish(spec(&["Yes", "No"]), start()).await.unwrap();
        cast_all(&f, vote.id, &[(1, "Yes"), (2, "Yes")]).await;

        let mut leaving = f.store.member(2).await.unwrap().unwrap();
        leaving.eligible = false;
        f.store.replace_member(&leaving).await.unwrap();
        f.store
            .insert_member(&Member::approved_example(4))
            .await
            .unwrap();

        // Three Yes ballots against three eligible members, but member 4 has not voted.
        cast_all(&f, vote.id, &[(3, "Yes")]).await;
        assert_eq!(f.engine.get_vote(vote.id).await.unwrap().state, VoteState::Active);
        assert_eq!(f.events.count("vote_closed"), 0);

        cast_all(&f, vote.id, &[(4, "Yes")]).await;
        assert_eq!(f.engine.get_vote(vote.id).await.unwrap().state, VoteState::Closed);
    }

    #[rocket::async_test]
    async fn late_arriving_older_ballot_is_discarded() {
        let f = fixture(3).await;
        let vote = f.engine.publish(spec(&["Yes", "No"]), start()).await.unwrap();

        let newer = start() + Duration::hours(2);
        f.engine.cast_ballot(vote.id, 1, "No", newer).await.unwrap();
        let standing = f
            .engine
            .cast_ballot(vote.id, 1, "Yes", start() + Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(standing, Ballot::new(vote.id, 1, "No", newer));

        let dump = f.engine.dump(vote.id).await.unwrap();
        assert_eq!(dump.ballots, vec![Ballot::new(vote.id, 1, "No", newer)]);
    }

    #[rocket::async_test]
    async fn purge_requires_export_for_closed_votes() {
        let f = fixture(2).await;
        let active = f.engine.publish(spec(&["Yes", "No"]), start()).await.unwrap();
        cast_all(&f, active.id, &[(1, "Yes")]).await;
        assert!(matches!(
            f.engine.purge(active.id).await,
            Err(Error::InvalidState { .. })
        ));

        f.engine.force_close(active.id, start()).await.unwrap();
        assert!(f.engine.purge(active.id).await.is_err());

        assert!(f.engine.mark_exported(active.id).await.unwrap());
        assert!(!f.engine.mark_exported(active.id).await.unwrap());
        f.engine.purge(active.id).await.unwrap();
        assert!(matches!(
            f.engine.get_vote(active.id).await,
            Err(Error::NotFound(_))
        ));
        assert_eq!(f.store.ballot_rows(active.id), 0);

        let draft = f.engine.create_draft(spec(&["Yes", "No"]), start()).await.unwrap();
        f.engine.purge(draft.id).await.unwrap();
    }

    #[rocket::async_test]
    async fn only_closed_votes_are_exported() {
        let f = fixture(2).await;
        let vote = f.engine.publish(spec(&["Yes", "No"]), start()).await.unwrap();
        assert!(matches!(
            f.engine.mark_exported(vote.id).await,
            Err(Error::NotClosed(_))
        ));
    }

    #[rocket::async_test]
    async fn reminder_lists_members_yet_to_vote() {
        let f = fixture(3).await;
        let vote = f.engine.publish(spec(&["Yes", "No"]), start()).await.unwrap();
        cast_all(&f, vote.id, &[(2, "No")]).await;

        let early = f.engine.fire_reminder_if_due(vote.id, start()).await.unwrap();
        assert_eq!(early, ReminderOutcome::NotDue);

        let due = vote.deadline - Duration::hours(24);
        let fired = f.engine.fire_reminder_if_due(vote.id, due).await.unwrap();
        assert_eq!(fired, ReminderOutcome::Fired { recipients: 2 });
        match f.events.events().last() {
            Some(Notification::ReminderDue {
                pending_members, ..
            }) => assert_eq!(pending_members, &vec![1, 3]),
            other => panic!("unexpected event {other:?}"),
        }

        let again = f.engine.fire_reminder_if_due(vote.id, due).await.unwrap();
        assert_eq!(again, ReminderOutcome::NotDue);
        assert_eq!(f.events.count("reminder_due"), 1);
    }

    #[rocket::async_test]
    async fn stale_reminder_is_dropped() {
        let f = fixture(3).await;
        let vote = f.engine.publish(spec(&["Yes", "No"]), start()).await.unwrap();
        let outcome = f
            .engine
            .fire_reminder_if_due(vote.id, after_deadline())
            .await
            .unwrap();
        assert_eq!(outcome, ReminderOutcome::Stale);
        assert!(f.store.reminder(vote.id).await.unwrap().unwrap().fired);
        assert_eq!(f.events.count("reminder_due"), 0);
    }

    #[rocket::async_test]
    async fn dump_verifies() {
        let f = fixture(4).await;
        let vote = f.engine.publish(spec(&["Yes", "No"]), start()).await.unwrap();
        cast_all(&f, vote.id, &[(1, "Yes"), (2, "No"), (3, "Yes")]).await;
        f.engine.close_if_due(vote.id, after_deadline()).await.unwrap();

        let dump = f.engine.dump(vote.id).await.unwrap();
        assert_eq!(dump.ballots.len(), 3);
        assert!(dump.verify().is_ok());
    }
}
