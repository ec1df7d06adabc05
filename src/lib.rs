#[macro_use]
extern crate rocket;

#[cfg(test)]
#[macro_use]
extern crate backend_test;

use rocket::{Build, Rocket};

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod model;
pub mod notify;
pub mod registry;
pub mod store;
pub mod ticker;

pub use config::Config;

use config::{ConfigFairing, EngineFairing, StoreFairing};
use engine::SchedulerFairing;
use logging::LoggerFairing;

/// Assemble the server. Fairings run in attach order, and each one relies on
/// the state managed by those before it.
pub fn build() -> Rocket<Build> {
    rocket::build()
        .attach(LoggerFairing)
        .attach(ConfigFairing)
        .attach(StoreFairing)
        .attach(EngineFairing)
        .attach(SchedulerFairing)
        .mount("/", api::routes())
}

/// Everything a `#[backend_test]` can ask for.
#[cfg(test)]
pub(crate) struct Harness {
    pub client: rocket::local::asynchronous::Client,
    pub store: store::MemoryStore,
    pub events: notify::RecordingSink,
    pub clock: engine::clock::ManualClock,
}

/// A server over an in-memory store, recording events instead of delivering
/// them, with a clock that only moves when the test says so.
#[cfg(test)]
pub(crate) async fn test_harness() -> Harness {
    use std::sync::Arc;

    use chrono::TimeZone;

    use crate::engine::{
        clock::{Clock, ManualClock},
        Scheduler, VotingEngine,
    };
    use crate::notify::RecordingSink;
    use crate::registry::MemberRegistry;
    use crate::store::{MemberDirectory, MemoryStore, Store};

    let config = Config::example();
    let store = MemoryStore::new();
    let events = RecordingSink::default();
    let clock = ManualClock::new(chrono::Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap());

    let engine = Arc::new(VotingEngine::new(
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(events.clone()),
        config.engine_settings(),
    ));
    let rocket = rocket::build()
        .attach(LoggerFairing)
        .manage(config)
        .manage(Arc::new(store.clone()) as Arc<dyn Store>)
        .manage(Arc::new(store.clone()) as Arc<dyn MemberDirectory>)
        .manage(MemberRegistry::new(Arc::new(store.clone())))
        .manage(Arc::new(clock.clone()) as Arc<dyn Clock>)
        .manage(Arc::new(Scheduler::new(engine.clone())))
        .manage(engine)
        .mount("/", api::routes());

    let client = rocket::local::asynchronous::Client::tracked(rocket)
        .await
        .unwrap();
    Harness {
        client,
        store,
        events,
        clock,
    }
}
