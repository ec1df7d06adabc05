use reqwest::Client;

use crate::model::Notification;

use super::{DeliveryError, DeliveryTarget};

/// POSTs each notification as JSON to a fixed URL.
///
/// Used both for the chat bot (which renders member messages) and for the
/// spreadsheet export.
pub struct WebhookTarget {
    name: String,
    url: String,
    client: Client,
    member_facing: bool,
    exports: bool,
}

impl WebhookTarget {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Result<Self, DeliveryError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self {
            name: name.into(),
            url: url.into(),
            client,
            member_facing: false,
            exports: false,
        })
    }

    /// Hold deliveries back during quiet hours.
    pub fn member_facing(mut self) -> Self {
        self.member_facing = true;
        self
    }

    /// Treat a delivered `vote_closed` event as a completed export.
    pub fn exporting(mut self) -> Self {
        self.exports = true;
        self
    }
}

#[rocket::async_trait]
impl DeliveryTarget for WebhookTarget {
    fn name(&self) -> &str {
        &self.name
    }

    fn respects_quiet_hours(&self) -> bool {
        self.member_facing
    }

    fn exports_results(&self) -> bool {
        self.exports
    }

    async fn deliver(&self, notification: &Notification) -> Result<(), DeliveryError> {
        let response = self.client.post(&self.url).json(notification).send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(DeliveryError::Rejected {
                target: self.name.clone(),
                status: status.as_u16(),
            })
        }
    }
}
