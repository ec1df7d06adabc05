//! Getting vote events out of the engine.
//!
//! The engine publishes [`Notification`]s to an [`EventSink`] and never waits
//! for delivery. The production sink is a [`Dispatcher`] that fans events out
//! to delivery targets on background tasks.

use std::sync::{Arc, Mutex, PoisonError};

use crate::model::Notification;

mod dispatcher;
mod quiet_hours;
mod webhook;

pub use dispatcher::{DeliveryError, DeliverySettings, DeliveryTarget, Dispatcher, LogTarget};
pub use quiet_hours::{QuietHours, QuietHoursError};
pub use webhook::WebhookTarget;

/// Receives engine events. Must not block.
pub trait EventSink: Send + Sync {
    fn publish(&self, notification: Notification);
}

/// Keeps every published event in memory. Clones share the same record.
#[derive(Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<Notification> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of recorded events of the given kind, e.g. `vote_closed`.
    pub fn count(&self, kind: &str) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|event| event.kind() == kind)
            .count()
    }
}

impl EventSink for RecordingSink {
    fn publish(&self, notification: Notification) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notification);
    }
}
