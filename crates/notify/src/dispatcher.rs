use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use common::{
    token_fingerprint, DispatchReport, Notifier, PushClient, PushMessage, Recommendation, SubscriberStore,
};

use crate::webhook::WebhookNotifier;

const TITLE: &str = "Scanner signal";

/// Fans new recommendations out to every subscriber whose threshold they
/// clear, then removes dead tokens in one batch.
pub struct NotificationDispatcher {
    store: Arc<dyn SubscriberStore>,
    push: Option<Arc<dyn PushClient>>,
    webhook: Option<WebhookNotifier>,
}

impl NotificationDispatcher {
    pub fn new(store: Arc<dyn SubscriberStore>, push: Option<Arc<dyn PushClient>>) -> Self {
        Self { store, push, webhook: None }
    }

    pub fn with_webhook(mut self, webhook: WebhookNotifier) -> Self {
        self.webhook = Some(webhook);
        self
    }

    /// Deliver `message` to every subscriber accepting `score`.
    pub async fn dispatch(&self, message: &PushMessage, score: u8) -> DispatchReport {
        let mut report = DispatchReport::default();
        let Some(push) = &self.push else {
            debug!("Push delivery not configured, skipping fan-out");
            return report;
        };

        let subscribers = match self.store.subscribers().await {
            Ok(s) => s,
            Err(e) => {
                error!(error = %e, "Failed to load subscribers");
                return report;
            }
        };

        let mut dead = Vec::new();
        for sub in subscribers {
            if sub.token.is_empty() {
                continue;
            }
            if !sub.accepts(score) {
                report.filtered += 1;
                continue;
            }
            match push.send(&sub.token, message).await {
                Ok(()) => report.delivered += 1,
                Err(e) if e.is_permanent() => {
                    debug!(token = %token_fingerprint(&sub.token), error = %e, "Dead token");
                    report.failed += 1;
                    dead.push(sub.token);
                }
                Err(e) => {
                    warn!(token = %token_fingerprint(&sub.token), error = %e, "Push delivery failed");
                    report.failed += 1;
                }
            }
        }

        if !dead.is_empty() {
            match self.store.remove_subscribers(&dead).await {
                Ok(n) => {
                    report.removed = n as usize;
                    info!(removed = n, "Removed unregistered push tokens");
                }
                Err(e) => error!(error = %e, count = dead.len(), "Failed to remove dead tokens"),
            }
        }
        report
    }

    /// Send a fixed test alert to every subscriber, regardless of threshold.
    pub async fn send_test(&self) -> DispatchReport {
        let message = PushMessage {
            title: TITLE.into(),
            body: "Test notification".into(),
            data: HashMap::from([
                ("ticker".to_string(), "TEST".to_string()),
                ("price".to_string(), "0.0000".to_string()),
                ("score".to_string(), "100".to_string()),
                ("strategy".to_string(), "Test".to_string()),
                ("click_action".to_string(), "/".to_string()),
            ]),
        };
        self.dispatch(&message, 100).await
    }
}

/// Data-only push payload for a recommendation.
pub fn message_for(rec: &Recommendation) -> PushMessage {
    let price = format!("{:.4}", rec.price);
    PushMessage {
        title: TITLE.into(),
        body: format!("{} {} @ ${price} (score {})", rec.strategy, rec.symbol, rec.score),
        data: HashMap::from([
            ("ticker".to_string(), rec.symbol.clone()),
            ("price".to_string(), price.clone()),
            ("score".to_string(), rec.score.to_string()),
            ("strategy".to_string(), rec.strategy.to_string()),
            ("click_action".to_string(), "/".to_string()),
        ]),
    }
}

#[async_trait]
impl Notifier for NotificationDispatcher {
    async fn notify(&self, rec: &Recommendation) -> DispatchReport {
        if let Some(webhook) = &self.webhook {
            if let Err(e) = webhook.send(rec).await {
                warn!(symbol = %rec.symbol, error = %e, "Webhook alert failed");
            }
        }
        self.dispatch(&message_for(rec), rec.score).await
    }
}
