use std::time::Duration;

use crate::{Error, Result};

const DEFAULT_GCP_REGION: &str = "us-central1";
const DEFAULT_SCORER_MODEL: &str = "gemini-2.5-flash-lite";

/// All configuration loaded from environment variables at startup.
///
/// Only the upstream API key and the database URL are required. Every other
/// value is optional: a missing scorer key means neutral scores, missing push
/// credentials mean notifications are skipped.
#[derive(Debug, Clone)]
pub struct Config {
    // Upstream market data
    pub polygon_api_key: String,

    // Database
    pub database_url: String,

    // External scorer
    pub scorer_api_key: Option<String>,
    pub scorer_endpoint: Option<String>,
    pub scorer_timeout: Duration,

    // Push notifications
    pub fcm_project_id: Option<String>,
    /// Path to a service-account JSON key.
    pub fcm_credentials_path: Option<String>,
    pub discord_webhook_url: Option<String>,

    // Symbol selection
    pub max_price: f64,
    pub top_n: usize,
    pub focus_top_n: usize,
    pub min_data_req: usize,

    // Scheduling
    pub scan_interval: Duration,
    pub focus_interval: Duration,
    pub reconnect_delay: Duration,
    pub keepalive_interval: Duration,
    pub signal_cooldown: Duration,

    // Strategy tuning file
    pub strategy_config_path: Option<String>,
}

impl Config {
    /// Load all configuration from environment variables.
    /// Loads `.env` if present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // ignore error if .env not present

        let scorer_endpoint = optional_env("SCORER_ENDPOINT").or_else(|| {
            optional_env("GCP_PROJECT_ID").map(|project| {
                let region =
                    optional_env("GCP_REGION").unwrap_or_else(|| DEFAULT_GCP_REGION.to_string());
                vertex_endpoint(&project, &region)
            })
        });

        Ok(Config {
            polygon_api_key: required_env("POLYGON_API_KEY")?,
            database_url: required_env("DATABASE_URL")?,
            scorer_api_key: optional_env("GEMINI_API_KEY"),
            scorer_endpoint,
            scorer_timeout: secs_env("SCORER_TIMEOUT_SECS", 10)?,
            fcm_project_id: optional_env("FCM_PROJECT_ID"),
            fcm_credentials_path: optional_env("FCM_CREDENTIALS")
                .or_else(|| optional_env("GOOGLE_APPLICATION_CREDENTIALS")),
            discord_webhook_url: optional_env("DISCORD_WEBHOOK_URL"),
            max_price: parsed_env("MAX_PRICE", 20.0)?,
            top_n: parsed_env("TOP_N", 100)?,
            focus_top_n: parsed_env("FOCUS_TOP_N", 3)?,
            min_data_req: parsed_env("MIN_DATA_REQ", 20)?,
            scan_interval: secs_env("SCAN_INTERVAL_SECS", 180)?,
            focus_interval: secs_env("FOCUS_RECONCILE_SECS", 60)?,
            reconnect_delay: secs_env("RECONNECT_DELAY_SECS", 10)?,
            keepalive_interval: secs_env("KEEPALIVE_INTERVAL_SECS", 20)?,
            signal_cooldown: secs_env("SIGNAL_COOLDOWN_SECS", 60)?,
            strategy_config_path: optional_env("STRATEGY_CONFIG_PATH"),
        })
    }
}

/// Vertex AI `generateContent` URL for the default scoring model.
pub fn vertex_endpoint(project: &str, region: &str) -> String {
    format!(
        "https://{region}-aiplatform.googleapis.com/v1/projects/{project}/locations/{region}/publishers/google/models/{DEFAULT_SCORER_MODEL}:generateContent"
    )
}

fn required_env(key: &str) -> Result<String> {
    optional_env(key).ok_or_else(|| {
        Error::Config(format!(
            "Required environment variable '{key}' is not set. Check your .env file."
        ))
    })
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match optional_env(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("{key} has an invalid value: '{raw}'"))),
    }
}

fn secs_env(key: &str, default_secs: u64) -> Result<Duration> {
    parsed_env(key, default_secs).map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_endpoint_embeds_project_and_region() {
        let url = vertex_endpoint("proj-1", "europe-west4");
        assert!(url.starts_with("https://europe-west4-aiplatform.googleapis.com/v1/projects/proj-1/"));
        assert!(url.ends_with("gemini-2.5-flash-lite:generateContent"));
    }

    #[test]
    fn parsed_env_rejects_garbage() {
        std::env::set_var("SCANNER_TEST_TOP_N", "lots");
        let err = parsed_env::<usize>("SCANNER_TEST_TOP_N", 100).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        std::env::remove_var("SCANNER_TEST_TOP_N");
    }

    #[test]
    fn parsed_env_falls_back_to_default_when_blank() {
        std::env::set_var("SCANNER_TEST_MAX_PRICE", "  ");
        assert_eq!(parsed_env("SCANNER_TEST_MAX_PRICE", 20.0).unwrap(), 20.0);
        std::env::remove_var("SCANNER_TEST_MAX_PRICE");
    }
}
