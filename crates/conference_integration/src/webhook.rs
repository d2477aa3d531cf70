use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use shared::protocol::ReactionsWebhookPayload;
use url::Url;

use crate::WebhookReporter;

/// Posts flushed reaction batches as JSON to a fixed endpoint.
pub struct HttpWebhookReporter {
    http: Client,
    endpoint: Url,
}

impl HttpWebhookReporter {
    pub fn new(endpoint: &str) -> Result<Self> {
        let endpoint =
            Url::parse(endpoint).with_context(|| format!("invalid webhook url: {endpoint}"))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(anyhow!(
                "webhook url must use http or https, got {}",
                endpoint.scheme()
            ));
        }
        Ok(Self {
            http: Client::new(),
            endpoint,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl WebhookReporter for HttpWebhookReporter {
    async fn report_reactions(&self, payload: ReactionsWebhookPayload) -> Result<()> {
        self.http
            .post(self.endpoint.clone())
            .json(&payload)
            .send()
            .await
            .with_context(|| format!("failed to reach reactions webhook {}", self.endpoint))?
            .error_for_status()?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/webhook_tests.rs"]
mod tests;
