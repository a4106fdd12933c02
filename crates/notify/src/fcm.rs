use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde_json::{json, Value};
use tracing::warn;

use common::{DeliveryError, Error, PushClient, PushMessage, Result};

use crate::auth::ServiceAccountAuth;

pub const DEFAULT_FCM_BASE_URL: &str = "https://fcm.googleapis.com";
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Provider responses that mean the token will never work again.
const DEAD_TOKEN_MARKERS: [&str; 3] = [
    "UNREGISTERED",
    "Requested entity was not found",
    "registration-token-not-registered",
];

/// Firebase Cloud Messaging HTTP v1 client.
///
/// Bearer tokens come from [`ServiceAccountAuth`]. A 401 drops the cached
/// token and the send is retried once with a fresh one.
pub struct FcmClient {
    send_url: String,
    auth: ServiceAccountAuth,
    http: Client,
}

impl FcmClient {
    pub fn new(project_id: &str, auth: ServiceAccountAuth) -> Result<Self> {
        Self::with_base_url(DEFAULT_FCM_BASE_URL, project_id, auth)
    }

    pub fn with_base_url(base_url: &str, project_id: &str, auth: ServiceAccountAuth) -> Result<Self> {
        let http = Client::builder()
            .use_rustls_tls()
            .timeout(SEND_TIMEOUT)
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self {
            send_url: format!(
                "{}/v1/projects/{project_id}/messages:send",
                base_url.trim_end_matches('/')
            ),
            auth,
            http,
        })
    }

    async fn post(&self, payload: &Value) -> Result<Response, DeliveryError> {
        let token = self
            .auth
            .token()
            .await
            .map_err(|e| DeliveryError::Transient(format!("no access token: {e}")))?;
        self.http
            .post(&self.send_url)
            .bearer_auth(token)
            .json(payload)
            .send()
            .await
            .map_err(|e| DeliveryError::Transient(e.to_string()))
    }
}

/// Classify a failed send. Only a dead-token answer is permanent.
pub fn classify_failure(status: StatusCode, body: &str) -> DeliveryError {
    if status == StatusCode::NOT_FOUND || DEAD_TOKEN_MARKERS.iter().any(|m| body.contains(m)) {
        DeliveryError::Unregistered(format!("HTTP {status}"))
    } else {
        DeliveryError::Transient(format!("HTTP {status}: {body}"))
    }
}

#[async_trait]
impl PushClient for FcmClient {
    async fn send(&self, token: &str, message: &PushMessage) -> Result<(), DeliveryError> {
        let mut data = message.data.clone();
        data.insert("title".into(), message.title.clone());
        data.insert("body".into(), message.body.clone());

        let payload = json!({
            "message": {
                "token": token,
                "data": data,
                "webpush": { "headers": { "Urgency": "high" } }
            }
        });

        let mut resp = self.post(&payload).await?;
        if resp.status() == StatusCode::UNAUTHORIZED {
            warn!("FCM rejected the access token, minting a new one");
            self.auth.invalidate().await;
            resp = self.post(&payload).await?;
        }

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        Err(classify_failure(status, &body))
    }
}
