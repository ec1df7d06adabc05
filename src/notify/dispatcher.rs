use std::sync::Arc;

use rocket::tokio::{
    self,
    sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
    time::Duration,
};
use thiserror::Error;

use crate::engine::clock::Clock;
use crate::model::Notification;
use crate::store::Store;

use super::{EventSink, QuietHours};

/// Reasons a single delivery attempt failed.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("{target} answered with status {status}")]
    Rejected { target: String, status: u16 },
}

/// Somewhere notifications are delivered to.
#[rocket::async_trait]
pub trait DeliveryTarget: Send + Sync {
    fn name(&self) -> &str;

    /// Member-facing targets hold deliveries back during quiet hours.
    fn respects_quiet_hours(&self) -> bool {
        false
    }

    /// Successful delivery of a `vote_closed` event to this target marks the vote exported.
    fn exports_results(&self) -> bool {
        false
    }

    async fn deliver(&self, notification: &Notification) -> Result<(), DeliveryError>;
}

/// Writes every notification to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTarget;

#[rocket::async_trait]
impl DeliveryTarget for LogTarget {
    fn name(&self) -> &str {
        "log"
    }

    async fn deliver(&self, notification: &Notification) -> Result<(), DeliveryError> {
        match notification {
            Notification::VoteOpened {
                vote_id, deadline, ..
            } => info!("Vote {vote_id} opened, deadline {deadline}"),
            Notification::ReminderDue {
                vote_id,
                pending_members,
                ..
            } => info!(
                "Reminder for vote {vote_id}: {} member(s) yet to vote",
                pending_members.len()
            ),
            Notification::VoteClosed { vote_id, result, .. } => info!(
                "Vote {vote_id} closed: {}, turnout {:.1}%",
                result.outcome, result.turnout_percent
            ),
        }
        Ok(())
    }
}

/// How hard the dispatcher tries and when it stays silent.
#[derive(Debug, Clone, Copy)]
pub struct DeliverySettings {
    pub attempts: u32,
    pub retry_delay: Duration,
    pub quiet_hours: Option<QuietHours>,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            attempts: 5,
            retry_delay: Duration::from_secs(300),
            quiet_hours: None,
        }
    }
}

/// An [`EventSink`] that hands notifications to one background worker per target.
///
/// Each worker delivers in publish order, so a target never sees a vote close
/// before it opened. Publishing never waits on a worker.
pub struct Dispatcher {
    senders: Vec<(String, UnboundedSender<Notification>)>,
}

impl Dispatcher {
    /// Start a worker for each target. Must be called inside the async runtime.
    pub fn spawn(
        targets: Vec<Arc<dyn DeliveryTarget>>,
        settings: DeliverySettings,
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let senders = targets
            .into_iter()
            .map(|target| {
                let (sender, receiver) = unbounded_channel();
                let name = target.name().to_string();
                let worker = Worker {
                    target,
                    settings,
                    store: store.clone(),
                    clock: clock.clone(),
                };
                tokio::spawn(worker.run(receiver));
                info!("Delivering notifications to {name}");
                (name, sender)
            })
            .collect();
        Self { senders }
    }
}

impl EventSink for Dispatcher {
    fn publish(&self, notification: Notification) {
        for (name, sender) in &self.senders {
            if sender.send(notification.clone()).is_err() {
                error!(
                    "Delivery worker for {name} has stopped, dropping {} for vote {}",
                    notification.kind(),
                    notification.vote_id()
                );
            }
        }
    }
}

struct Worker {
    target: Arc<dyn DeliveryTarget>,
    settings: DeliverySettings,
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl Worker {
    async fn run(self, mut receiver: UnboundedReceiver<Notification>) {
        while let Some(notification) = receiver.recv().await {
            self.wait_out_quiet_hours(&notification).await;
            self.deliver(&notification).await;
        }
        debug!("Delivery worker for {} stopped", self.target.name());
    }

    async fn wait_out_quiet_hours(&self, notification: &Notification) {
        let quiet_hours = match self.settings.quiet_hours {
            Some(quiet_hours) if self.target.respects_quiet_hours() => quiet_hours,
            _ => return,
        };
        let now = self.clock.now();
        let open = quiet_hours.next_open(now);
        if open > now {
            info!(
                "Quiet hours: holding {} for vote {} to {} until {open}",
                notification.kind(),
                notification.vote_id(),
                self.target.name()
            );
            let wait = (open - now).to_std().unwrap_or_default();
            tokio::time::sleep(wait).await;
        }
    }

    async fn deliver(&self, notification: &Notification) {
        let name = self.target.name();
        for attempt in 1..=self.settings.attempts {
            match self.target.deliver(notification).await {
                Ok(()) => {
                    debug!(
                        "Delivered {} for vote {} to {name}",
                        notification.kind(),
                        notification.vote_id()
                    );
                    self.record_export(notification).await;
                    return;
                }
                Err(e) => {
                    warn!(
                        "Delivery of {} for vote {} to {name} failed (attempt {attempt}/{}): {e}",
                        notification.kind(),
                        notification.vote_id(),
                        self.settings.attempts
                    );
                    if attempt < self.settings.attempts {
                        tokio::time::sleep(self.settings.retry_delay).await;
                    }
                }
            }
        }
        error!(
            "Giving up on {} for vote {} to {name}",
            notification.kind(),
            notification.vote_id()
        );
    }

    async fn record_export(&self, notification: &Notification) {
        if !self.target.exports_results() {
            return;
        }
        if let Notification::VoteClosed { vote_id, .. } = notification {
            match self.store.mark_exported(*vote_id).await {
                Ok(true) => info!("Vote {vote_id} exported"),
                Ok(false) => debug!("Vote {vote_id} was already marked exported"),
                Err(e) => error!("Failed to mark vote {vote_id} exported: {e}"),
            }
        }
    }
}
