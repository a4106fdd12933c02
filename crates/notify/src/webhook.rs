use std::time::Duration;

use reqwest::Client;
use serde_json::json;

use common::{Error, Recommendation, Result};

/// Posts a one-line alert per new recommendation to a Discord webhook.
pub struct WebhookNotifier {
    url: String,
    http: Client,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .use_rustls_tls()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self { url: url.into(), http })
    }

    pub async fn send(&self, rec: &Recommendation) -> Result<()> {
        let resp = self
            .http
            .post(&self.url)
            .json(&json!({ "content": content(rec) }))
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(Error::Http(format!("webhook returned HTTP {}", resp.status())));
        }
        Ok(())
    }
}

fn content(rec: &Recommendation) -> String {
    format!(
        "**{} setup**\n**{}** @ **${:.4}**\n**Score: {}%**",
        rec.strategy, rec.symbol, rec.price, rec.score
    )
}
