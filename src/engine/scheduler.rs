use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rocket::{
    fairing::{Fairing, Info, Kind},
    Build, Orbit, Rocket,
};
use serde::Serialize;

use crate::error::Result;
use crate::model::VoteState;
use crate::ticker::Ticker;
use crate::Config;

use super::{clock::Clock, CloseOutcome, ReminderOutcome, VotingEngine};

/// What one pass of the scheduler did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub active_votes: usize,
    pub reminders_fired: usize,
    pub reminders_dropped: usize,
    pub votes_closed: usize,
    pub failures: usize,
}

impl TickReport {
    fn is_idle(&self) -> bool {
        self.reminders_fired == 0
            && self.reminders_dropped == 0
            && self.votes_closed == 0
            && self.failures == 0
    }
}

impl Display for TickReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} active, {} reminder(s) fired, {} dropped, {} closed, {} failure(s)",
            self.active_votes,
            self.reminders_fired,
            self.reminders_dropped,
            self.votes_closed,
            self.failures
        )
    }
}

/// Drives time-based transitions: reminders and deadline closing.
pub struct Scheduler {
    engine: Arc<VotingEngine>,
}

impl Scheduler {
    pub fn new(engine: Arc<VotingEngine>) -> Self {
        Self { engine }
    }

    /// Walk every active vote once as of `now`.
    ///
    /// A failure on one vote is logged and counted; the rest are still processed
    /// and the failed vote is retried on the next pass.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<TickReport> {
        let active = self.engine.list_votes(Some(VoteState::Active)).await?;
        let mut report = TickReport {
            active_votes: active.len(),
            ..TickReport::default()
        };

        for vote in &active {
            match self.engine.fire_reminder_if_due(vote.id, now).await {
                Ok(ReminderOutcome::Fired { .. }) => report.reminders_fired += 1,
                Ok(ReminderOutcome::Stale) => report.reminders_dropped += 1,
                Ok(ReminderOutcome::NotDue) => {}
                Err(e) => {
                    error!("Reminder for vote {} failed: {e}", vote.id);
                    report.failures += 1;
                }
            }

            if vote.is_due(now) {
                match self.engine.close_if_due(vote.id, now).await {
                    Ok(CloseOutcome::Closed { .. }) => report.votes_closed += 1,
                    Ok(_) => {}
                    Err(e) => {
                        error!("Closing vote {} failed, will retry: {e}", vote.id);
                        report.failures += 1;
                    }
                }
            }
        }

        if report.is_idle() {
            debug!("Tick at {now}: {report}");
        } else {
            info!("Tick at {now}: {report}");
        }
        Ok(report)
    }
}

/// A fairing that starts the periodic scheduler during ignition and stops it
/// on shutdown. It places the `Scheduler` and its `Ticker` into managed state.
/// This fairing depends on the engine and clock being in managed state, and
/// so must be attached after the fairing responsible for those.
pub struct SchedulerFairing;

#[rocket::async_trait]
impl Fairing for SchedulerFairing {
    fn info(&self) -> Info {
        Info {
            name: "Vote Scheduler",
            kind: Kind::Ignite | Kind::Shutdown,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        let (engine, clock, period) = match (
            rocket.state::<Arc<VotingEngine>>(),
            rocket.state::<Arc<dyn Clock>>(),
            rocket.state::<Config>(),
        ) {
            (Some(engine), Some(clock), Some(config)) => {
                (engine.clone(), clock.clone(), config.tick_interval())
            }
            _ => {
                error!("Engine was not available when starting the scheduler");
                return Err(rocket);
            }
        };

        let scheduler = Arc::new(Scheduler::new(engine));
        let job_scheduler = scheduler.clone();
        let ticker = Ticker::start(period, move || {
            let scheduler = job_scheduler.clone();
            let now = clock.now();
            async move {
                if let Err(e) = scheduler.run_once(now).await {
                    error!("Scheduler pass failed: {e}");
                }
            }
        });
        info!("Scheduler ticking every {} second(s)", period.as_secs());

        Ok(rocket.manage(scheduler).manage(ticker))
    }

    async fn on_shutdown(&self, rocket: &Rocket<Orbit>) {
        if let Some(ticker) = rocket.state::<Ticker>() {
            ticker.stop();
            info!("Scheduler stopped");
        }
    }
}
