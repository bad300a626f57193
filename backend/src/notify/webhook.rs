use std::time::Duration;

use async_trait::async_trait;
use anyhow::Context;

use super::{BookingNotification, Notifier};

/// POSTs each notification as JSON to a relay (email/SMS gateway).
#[derive(Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("failed to build webhook HTTP client")?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, message: &BookingNotification) -> anyhow::Result<()> {
        let resp = self
            .client
            .post(&self.url)
            .json(message)
            .send()
            .await
            .context("webhook request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("webhook returned {}: {}", status, body);
        }
        Ok(())
    }
}
