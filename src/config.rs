use std::sync::Arc;

use chrono::Duration;
use rocket::{
    fairing::{Fairing, Info, Kind},
    tokio::time::Duration as StdDuration,
    Build, Rocket,
};
use serde::Deserialize;
use subtle::ConstantTimeEq;

use crate::engine::{
    clock::{Clock, SystemClock},
    policy::Unanimity,
    EngineSettings, VotingEngine,
};
use crate::model::{MemberId, VoteDefaults};
use crate::notify::{
    DeliverySettings, DeliveryTarget, Dispatcher, LogTarget, QuietHours, QuietHoursError,
    WebhookTarget,
};
use crate::registry::MemberRegistry;
use crate::store::{MemberDirectory, MemoryStore, MongoStore, Store};

/// Application configuration, derived from `Rocket.toml` and `ROCKET_*`
/// environment variables. This struct becomes managed state and can be
/// inspected by any endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // secrets
    api_secret: String,
    jwt_secret: String,
    // non-secrets
    #[serde(default = "defaults::auth_ttl")]
    auth_ttl: u32,
    #[serde(default)]
    admin_ids: Vec<MemberId>,
    #[serde(default = "defaults::tick_interval")]
    tick_interval: u32,
    #[serde(default = "defaults::reminder_lead_hours")]
    reminder_lead_hours: u32,
    #[serde(default = "defaults::default_duration_days")]
    default_duration_days: u32,
    #[serde(default = "defaults::default_quorum_percent")]
    default_quorum_percent: u8,
    #[serde(default = "defaults::quiet_hours_start")]
    quiet_hours_start: String,
    #[serde(default = "defaults::quiet_hours_end")]
    quiet_hours_end: String,
    #[serde(default = "defaults::utc_offset_minutes")]
    utc_offset_minutes: i32,
    #[serde(default = "defaults::delivery_attempts")]
    delivery_attempts: u32,
    #[serde(default = "defaults::delivery_retry_seconds")]
    delivery_retry_seconds: u32,
    #[serde(default)]
    close_on_unanimity: bool,
    #[serde(default)]
    chat_webhook_url: Option<String>,
    #[serde(default)]
    export_webhook_url: Option<String>,
}

mod defaults {
    pub fn auth_ttl() -> u32 {
        3600
    }

    pub fn tick_interval() -> u32 {
        300
    }

    pub fn reminder_lead_hours() -> u32 {
        24
    }

    pub fn default_duration_days() -> u32 {
        7
    }

    pub fn default_quorum_percent() -> u8 {
        50
    }

    pub fn quiet_hours_start() -> String {
        "22:00".to_string()
    }

    pub fn quiet_hours_end() -> String {
        "08:00".to_string()
    }

    pub fn utc_offset_minutes() -> i32 {
        180
    }

    pub fn delivery_attempts() -> u32 {
        5
    }

    pub fn delivery_retry_seconds() -> u32 {
        300
    }
}

impl Config {
    /// Whether `presented` is the shared secret the chat bot uses to obtain
    /// tokens, compared in constant time.
    pub fn is_api_secret(&self, presented: &str) -> bool {
        presented
            .as_bytes()
            .ct_eq(self.api_secret.as_bytes())
            .into()
    }

    /// Secret key used to sign JWTs.
    pub fn jwt_secret(&self) -> &[u8] {
        self.jwt_secret.as_bytes()
    }

    /// Valid lifetime of auth tokens in seconds.
    pub fn auth_ttl(&self) -> Duration {
        Duration::seconds(self.auth_ttl.into())
    }

    /// Chat user IDs that always get admin rights.
    pub fn is_admin(&self, member_id: MemberId) -> bool {
        self.admin_ids.contains(&member_id)
    }

    /// How often the scheduler checks reminders and deadlines.
    pub fn tick_interval(&self) -> StdDuration {
        StdDuration::from_secs(self.tick_interval.max(1).into())
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            defaults: VoteDefaults {
                duration: Duration::days(self.default_duration_days.into()),
                quorum_percent: self.default_quorum_percent,
            },
            reminder_lead: Duration::hours(self.reminder_lead_hours.into()),
        }
    }

    /// Whether a vote closes as soon as every eligible member picked the same option.
    pub fn close_on_unanimity(&self) -> bool {
        self.close_on_unanimity
    }

    /// Local quiet hours, or `None` if disabled by equal bounds.
    pub fn quiet_hours(&self) -> Result<Option<QuietHours>, QuietHoursError> {
        if self.quiet_hours_start == self.quiet_hours_end {
            return Ok(None);
        }
        QuietHours::parse(
            &self.quiet_hours_start,
            &self.quiet_hours_end,
            self.utc_offset_minutes,
        )
        .map(Some)
    }

    pub fn delivery_settings(&self) -> Result<DeliverySettings, QuietHoursError> {
        Ok(DeliverySettings {
            attempts: self.delivery_attempts.max(1),
            retry_delay: StdDuration::from_secs(self.delivery_retry_seconds.into()),
            quiet_hours: self.quiet_hours()?,
        })
    }

    pub fn chat_webhook_url(&self) -> Option<&str> {
        self.chat_webhook_url.as_deref()
    }

    pub fn export_webhook_url(&self) -> Option<&str> {
        self.export_webhook_url.as_deref()
    }
}

#[cfg(test)]
impl Config {
    pub fn example() -> Self {
        Self {
            api_secret: "bot-secret".to_string(),
            jwt_secret: "jwt-secret".to_string(),
            auth_ttl: defaults::auth_ttl(),
            admin_ids: vec![1],
            tick_interval: defaults::tick_interval(),
            reminder_lead_hours: defaults::reminder_lead_hours(),
            default_duration_days: defaults::default_duration_days(),
            default_quorum_percent: defaults::default_quorum_percent(),
            quiet_hours_start: defaults::quiet_hours_start(),
            quiet_hours_end: defaults::quiet_hours_end(),
            utc_offset_minutes: defaults::utc_offset_minutes(),
            delivery_attempts: defaults::delivery_attempts(),
            delivery_retry_seconds: defaults::delivery_retry_seconds(),
            close_on_unanimity: false,
            chat_webhook_url: None,
            export_webhook_url: None,
        }
    }
}

/// A fairing that loads the application config and puts it in managed state.
/// This could easily be achieved using `AdHoc::config`, but is written out
/// explicitly for symmetry with the other fairings and control over error
/// messages.
pub struct ConfigFairing;

#[rocket::async_trait]
impl Fairing for ConfigFairing {
    fn info(&self) -> Info {
        Info {
            name: "Config",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<Config>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load application config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        if let Err(e) = config.quiet_hours() {
            error!("Failed to load application config: {e}");
            return Err(rocket);
        }

        // Manage the state.
        rocket = rocket.manage(config);
        Ok(rocket)
    }
}

/// Configuration for the store.
#[derive(Deserialize)]
struct StoreConfig {
    // secrets
    #[serde(default)]
    db_uri: Option<String>,
}

/// A fairing that opens the store and places it into managed state as both
/// `Arc<dyn Store>` and `Arc<dyn MemberDirectory>`, alongside the
/// [`MemberRegistry`] writing to it. With `db_uri` set, this
/// connects to MongoDB; otherwise everything lives in memory.
pub struct StoreFairing;

#[rocket::async_trait]
impl Fairing for StoreFairing {
    fn info(&self) -> Info {
        Info {
            name: "Store",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<StoreConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load store config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };

        let (store, members): (Arc<dyn Store>, Arc<dyn MemberDirectory>) = match config.db_uri {
            Some(uri) => {
                info!("Loaded database config, connecting...");
                match MongoStore::connect(&uri, &get_database_name()).await {
                    Ok(store) => {
                        info!("...database connection online!");
                        (Arc::new(store.clone()), Arc::new(store))
                    }
                    Err(e) => {
                        error!("Failed to connect to database: {e}");
                        return Err(rocket);
                    }
                }
            }
            None => {
                warn!("No `db_uri` set, keeping votes in memory only");
                let store = MemoryStore::new();
                (Arc::new(store.clone()), Arc::new(store))
            }
        };

        // Manage the state.
        let registry = MemberRegistry::new(store.clone());
        Ok(rocket.manage(store).manage(members).manage(registry))
    }
}

/// Get the name of the database to use (production version).
#[cfg(not(test))]
pub(crate) fn get_database_name() -> String {
    "assoc_voting".to_string()
}

/// Get the name of the database to use (test version).
/// Use a random name to avoid collisions between tests.
#[cfg(test)]
pub(crate) fn get_database_name() -> String {
    let random: u32 = rand::random();
    let db = format!("test{random}");
    info!("Using database {db}");
    db
}

/// A fairing that starts notification delivery and builds the voting engine,
/// placing `Arc<VotingEngine>` and `Arc<dyn Clock>` into managed state.
/// This fairing depends on the config and store being in managed state, and
/// so must be attached after the fairings responsible for those.
pub struct EngineFairing;

#[rocket::async_trait]
impl Fairing for EngineFairing {
    fn info(&self) -> Info {
        Info {
            name: "Voting Engine",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        let (config, store, members) = match (
            rocket.state::<Config>(),
            rocket.state::<Arc<dyn Store>>(),
            rocket.state::<Arc<dyn MemberDirectory>>(),
        ) {
            (Some(config), Some(store), Some(members)) => {
                (config.clone(), store.clone(), members.clone())
            }
            _ => {
                error!("Config or store was not available when building the engine");
                return Err(rocket);
            }
        };

        let delivery = match config.delivery_settings() {
            Ok(delivery) => delivery,
            Err(e) => {
                error!("Invalid delivery settings: {e}");
                return Err(rocket);
            }
        };
        let targets = match delivery_targets(&config) {
            Ok(targets) => targets,
            Err(e) => {
                error!("Failed to set up notification delivery: {e}");
                return Err(rocket);
            }
        };

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let dispatcher = Dispatcher::spawn(targets, delivery, store.clone(), clock.clone());
        let mut engine = VotingEngine::new(
            store,
            members,
            Arc::new(dispatcher),
            config.engine_settings(),
        );
        if config.close_on_unanimity() {
            engine = engine.with_policy(Unanimity);
            info!("Votes close early once every eligible member agrees");
        }
        info!("Voting engine ready");

        Ok(rocket.manage(Arc::new(engine)).manage(clock))
    }
}

/// The log target, plus the chat and export webhooks when configured.
fn delivery_targets(
    config: &Config,
) -> Result<Vec<Arc<dyn DeliveryTarget>>, crate::notify::DeliveryError> {
    let mut targets: Vec<Arc<dyn DeliveryTarget>> = vec![Arc::new(LogTarget)];
    if let Some(url) = config.chat_webhook_url() {
        targets.push(Arc::new(WebhookTarget::new("chat", url)?.member_facing()));
    }
    if let Some(url) = config.export_webhook_url() {
        targets.push(Arc::new(WebhookTarget::new("export", url)?.exporting()));
    }
    Ok(targets)
}
