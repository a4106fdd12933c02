use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use common::{Error, MarketSession, Result, ScoreResult, Scorer, Signal};

use crate::features::{build_prompt, FeatureSnapshot};

/// Scores signals with a `generateContent` language-model endpoint.
pub struct GeminiScorer {
    endpoint: String,
    api_key: String,
    timeout: Duration,
    http: Client,
}

impl GeminiScorer {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder()
            .use_rustls_tls()
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            timeout,
            http,
        })
    }

    async fn request(&self, signal: &Signal) -> Result<ScoreResult> {
        let features = FeatureSnapshot::from_signal(signal, MarketSession::at(Utc::now()));
        let prompt = build_prompt(&signal.symbol, &features)?;
        let payload = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": { "responseMimeType": "application/json" }
        });

        let resp = self
            .http
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&payload)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Error::Scorer(e.to_string()))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| Error::Scorer(e.to_string()))?;
        if !status.is_success() {
            return Err(Error::Scorer(format!("HTTP {status}: {body}")));
        }
        parse_response(&body)
    }
}

#[async_trait]
impl Scorer for GeminiScorer {
    async fn score(&self, signal: &Signal) -> ScoreResult {
        match self.request(signal).await {
            Ok(result) => {
                info!(symbol = %signal.symbol, score = result.score, reasoning = %result.reasoning, "Signal scored");
                result
            }
            Err(e) => {
                warn!(symbol = %signal.symbol, error = %e, "Scoring failed, using neutral score");
                ScoreResult::neutral(e.to_string())
            }
        }
    }
}

// ─── Response parsing ────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct GenerateResponse {
    candidates: Option<Vec<Candidate>>,
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct ScorePayload {
    probability_score: f64,
    #[serde(default)]
    reasoning: String,
}

/// Extract `{probability_score, reasoning}` from a `generateContent` body.
pub fn parse_response(body: &str) -> Result<ScoreResult> {
    let resp: GenerateResponse = serde_json::from_str(body)?;
    if let Some(err) = resp.error {
        return Err(Error::Scorer(format!("provider error: {}", err.message)));
    }
    let text = resp
        .candidates
        .and_then(|c| c.into_iter().next())
        .and_then(|c| c.content)
        .and_then(|c| c.parts.into_iter().next())
        .and_then(|p| p.text)
        .ok_or_else(|| Error::Scorer("response has no candidate text".into()))?;

    let json_text = unwrap_fences(&text);
    if !json_text.starts_with('{') {
        return Err(Error::Scorer(format!("answer is not a JSON object: {json_text}")));
    }
    let payload: ScorePayload = serde_json::from_str(json_text)?;
    if !payload.probability_score.is_finite() {
        return Err(Error::Scorer("probability_score is not a number".into()));
    }
    Ok(ScoreResult {
        score: payload.probability_score.round().clamp(0.0, 100.0) as u8,
        reasoning: payload.reasoning,
        fallback: false,
    })
}

/// Strip a markdown code fence around a JSON object, if there is one.
pub fn unwrap_fences(text: &str) -> &str {
    let trimmed = text.trim();
    if !trimmed.contains("```") {
        return trimmed;
    }
    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if end > start => &trimmed[start..=end],
        _ => trimmed,
    }
}
