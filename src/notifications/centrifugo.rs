/// Centrifugo HTTP publish API transport
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use super::{Notification, Notifier};
use crate::config::NotifierConfig;
use crate::errors::{SwapError, SwapResult};
use crate::logger::{self, LogTag};

pub struct CentrifugoNotifier {
    client: reqwest::Client,
    publish_url: String,
    api_key: String,
}

impl CentrifugoNotifier {
    pub fn new(config: &NotifierConfig) -> SwapResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| SwapError::Notify(format!("HTTP client error: {}", e)))?;

        Ok(Self {
            client,
            publish_url: publish_url(&config.url),
            api_key: config.api_key.clone(),
        })
    }
}

fn publish_url(base: &str) -> String {
    format!("{}/api/publish", base.trim_end_matches('/'))
}

fn publish_body(notification: &Notification) -> serde_json::Value {
    json!({
        "channel": notification.channel,
        "data": { "message": notification.message },
    })
}

#[async_trait]
impl Notifier for CentrifugoNotifier {
    async fn publish(&self, notification: &Notification) -> SwapResult<()> {
        let resp = self
            .client
            .post(&self.publish_url)
            .header("Authorization", format!("apikey {}", self.api_key))
            .json(&publish_body(notification))
            .send()
            .await
            .map_err(|e| SwapError::Notify(format!("Publish request failed: {}", e)))?;

        if !resp.status().is_success() {
            return Err(SwapError::Notify(format!(
                "Publish returned status: {}",
                resp.status()
            )));
        }

        logger::debug(
            LogTag::Notify,
            &format!("Published to {}", notification.channel),
        );
        Ok(())
    }
}
