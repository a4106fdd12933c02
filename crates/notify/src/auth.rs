use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::sha2::Sha256;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::RsaPrivateKey;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::info;

use common::{Error, Result};

pub const FCM_SCOPE: &str = "https://www.googleapis.com/auth/firebase.messaging";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
/// Cached tokens are replaced this long before they expire.
const REFRESH_MARGIN_SECS: i64 = 300;

/// The fields of a Google service-account JSON key that token minting needs.
#[derive(Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub project_id: Option<String>,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl ServiceAccountKey {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: &str) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read service account key '{path}': {e}")))?;
        Self::from_json(&text)
    }
}

struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    ASSERTION_LIFETIME_SECS
}

/// OAuth2 access tokens for FCM, minted from a service-account key with
/// the JWT bearer grant and cached until shortly before they expire.
pub struct ServiceAccountAuth {
    client_email: String,
    token_uri: String,
    signing_key: SigningKey<Sha256>,
    http: Client,
    cached: Mutex<Option<CachedToken>>,
}

impl std::fmt::Debug for ServiceAccountAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountAuth")
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .field("signing_key", &"[REDACTED]")
            .finish()
    }
}

impl ServiceAccountAuth {
    pub fn new(key: &ServiceAccountKey) -> Result<Self> {
        let private_key = RsaPrivateKey::from_pkcs8_pem(&key.private_key)
            .map_err(|e| Error::Config(format!("invalid service account private key: {e}")))?;
        let http = Client::builder()
            .use_rustls_tls()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self {
            client_email: key.client_email.clone(),
            token_uri: key.token_uri.clone(),
            signing_key: SigningKey::<Sha256>::new(private_key),
            http,
            cached: Mutex::new(None),
        })
    }

    /// Signed RS256 JWT asserting the service account's identity.
    pub fn assertion(&self, now: DateTime<Utc>) -> Result<String> {
        let header = json!({ "alg": "RS256", "typ": "JWT" });
        let iat = now.timestamp();
        let claims = json!({
            "iss": self.client_email,
            "scope": FCM_SCOPE,
            "aud": self.token_uri,
            "iat": iat,
            "exp": iat + ASSERTION_LIFETIME_SECS,
        });
        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?),
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?)
        );
        let signature = self.signing_key.sign(signing_input.as_bytes());
        Ok(format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(signature.to_bytes())))
    }

    /// The cached access token, or a newly minted one when none is cached
    /// or the cached one is close to expiry.
    pub async fn token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;
        let now = Utc::now();
        if let Some(token) = cached.as_ref() {
            if token.expires_at - chrono::Duration::seconds(REFRESH_MARGIN_SECS) > now {
                return Ok(token.value.clone());
            }
        }
        let fresh = self.exchange(now).await?;
        let value = fresh.value.clone();
        *cached = Some(fresh);
        Ok(value)
    }

    /// Drop the cached token so the next call mints a new one.
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }

    async fn exchange(&self, now: DateTime<Utc>) -> Result<CachedToken> {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", JWT_BEARER_GRANT)
            .append_pair("assertion", &self.assertion(now)?)
            .finish();
        let resp = self
            .http
            .post(&self.token_uri)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::Auth(format!("token endpoint returned HTTP {status}: {text}")));
        }
        let token: TokenResponse = resp.json().await.map_err(|e| Error::Http(e.to_string()))?;
        info!(expires_in = token.expires_in, "Minted FCM access token");
        Ok(CachedToken {
            value: token.access_token,
            expires_at: now + chrono::Duration::seconds(token.expires_in),
        })
    }
}
