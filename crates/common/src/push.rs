use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{DeliveryError, Recommendation, Result, Subscriber};

/// A data-only push message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushMessage {
    pub title: String,
    pub body: String,
    /// Flat string map delivered as the message `data` payload.
    pub data: HashMap<String, String>,
}

/// Abstraction over the push delivery provider.
///
/// `FcmClient` in `crates/notify` implements this for production. Errors must
/// be classified so that permanently dead tokens can be cleaned up.
#[async_trait]
pub trait PushClient: Send + Sync {
    async fn send(&self, token: &str, message: &PushMessage) -> Result<(), DeliveryError>;
}

/// Outcome of fanning one recommendation out to all subscribers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchReport {
    pub delivered: usize,
    /// Subscribers whose threshold the score did not clear.
    pub filtered: usize,
    pub failed: usize,
    pub removed: usize,
}

/// Sink for newly persisted, non-duplicate recommendations.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, recommendation: &Recommendation) -> DispatchReport;
}

/// Storage for push subscribers.
#[async_trait]
pub trait SubscriberStore: Send + Sync {
    async fn subscribers(&self) -> Result<Vec<Subscriber>>;

    /// Delete every listed token in one statement. Returns rows removed.
    async fn remove_subscribers(&self, tokens: &[String]) -> Result<u64>;
}

/// Short, stable identifier for a delivery token, safe to write to logs.
pub fn token_fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    hex::encode(&digest[..6])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_short_and_stable() {
        let a = token_fingerprint("device-token-1");
        assert_eq!(a.len(), 12);
        assert_eq!(a, token_fingerprint("device-token-1"));
        assert_ne!(a, token_fingerprint("device-token-2"));
    }
}
