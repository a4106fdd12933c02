use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use common::{Bar, Error, MarketDataSource, Result};

pub const DEFAULT_BASE_URL: &str = "https://api.polygon.io";
const SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(10);
const AGGS_TIMEOUT: Duration = Duration::from_secs(5);
const HISTORY_DAYS: i64 = 7;

/// REST client for the candidate snapshot and historical minute bars.
pub struct PolygonRest {
    api_key: String,
    base_url: String,
    http: Client,
}

impl PolygonRest {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .use_rustls_tls()
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self {
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        timeout: Duration,
    ) -> Result<T> {
        let url = format!("{}{path}", self.base_url);
        let resp = self
            .http
            .get(&url)
            .query(query)
            .query(&[("apiKey", self.api_key.as_str())])
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;
        if !status.is_success() {
            return Err(Error::Http(format!("HTTP {status} from {path}: {body}")));
        }
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl MarketDataSource for PolygonRest {
    async fn candidates(&self, max_price: f64, limit: usize) -> Result<Vec<String>> {
        let snapshot: GainersResponse = self
            .get_json("/v2/snapshot/locale/us/markets/stocks/gainers", &[], SNAPSHOT_TIMEOUT)
            .await?;
        if snapshot.status != "OK" {
            return Err(Error::Http(format!("gainers snapshot status {}", snapshot.status)));
        }

        let mut picked: Vec<String> = Vec::new();
        for t in snapshot.tickers {
            if picked.len() >= limit {
                break;
            }
            let price = t.last_trade.map(|lt| lt.p);
            match price {
                Some(p) if p <= max_price && !t.ticker.is_empty() => {
                    if !picked.contains(&t.ticker) {
                        picked.push(t.ticker);
                    }
                }
                _ => {}
            }
        }
        debug!(count = picked.len(), "Candidate snapshot fetched");
        Ok(picked)
    }

    async fn minute_bars(&self, symbol: &str, limit: usize) -> Result<Vec<Bar>> {
        let end = Utc::now().date_naive();
        let start = end - chrono::Duration::days(HISTORY_DAYS);
        let path = format!(
            "/v2/aggs/ticker/{symbol}/range/1/minute/{}/{}",
            start.format("%Y-%m-%d"),
            end.format("%Y-%m-%d")
        );
        let query = [
            ("adjusted", "true".to_string()),
            ("sort", "desc".to_string()),
            ("limit", limit.to_string()),
        ];
        let resp: AggsResponse = self.get_json(&path, &query, AGGS_TIMEOUT).await?;

        let mut bars = resp
            .results
            .unwrap_or_default()
            .into_iter()
            .filter_map(|r| {
                let open_time = Utc.timestamp_millis_opt(r.t).single()?;
                Some(Bar {
                    symbol: symbol.to_string(),
                    open_time,
                    open: r.o,
                    high: r.h,
                    low: r.l,
                    close: r.c,
                    volume: r.v,
                })
            })
            .collect::<Vec<_>>();
        bars.sort_by_key(|b| b.open_time);
        Ok(bars)
    }
}

// ─── Response types ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct GainersResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    tickers: Vec<SnapshotTicker>,
}

#[derive(Deserialize)]
struct SnapshotTicker {
    #[serde(default)]
    ticker: String,
    #[serde(rename = "lastTrade")]
    last_trade: Option<LastTrade>,
}

#[derive(Deserialize)]
struct LastTrade {
    p: f64,
}

#[derive(Deserialize)]
struct AggsResponse {
    results: Option<Vec<AggResult>>,
}

#[derive(Deserialize)]
struct AggResult {
    t: i64,
    o: f64,
    h: f64,
    l: f64,
    c: f64,
    v: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, path_regex, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn candidates_filter_by_price_and_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/snapshot/locale/us/markets/stocks/gainers"))
            .and(query_param("apiKey", "KEY"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "OK",
                "tickers": [
                    {"ticker": "AAA", "lastTrade": {"p": 4.5}},
                    {"ticker": "BIG", "lastTrade": {"p": 250.0}},
                    {"ticker": "NOP"},
                    {"ticker": "BBB", "lastTrade": {"p": 20.0}},
                    {"ticker": "CCC", "lastTrade": {"p": 1.0}}
                ]
            })))
            .mount(&server)
            .await;

        let rest = PolygonRest::with_base_url("KEY", server.uri()).unwrap();
        let all = rest.candidates(20.0, 100).await.unwrap();
        assert_eq!(all, vec!["AAA", "BBB", "CCC"]);

        let capped = rest.candidates(20.0, 2).await.unwrap();
        assert_eq!(capped, vec!["AAA", "BBB"]);
    }

    #[tokio::test]
    async fn candidates_error_on_http_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;
        let rest = PolygonRest::with_base_url("KEY", server.uri()).unwrap();
        assert!(matches!(rest.candidates(20.0, 10).await, Err(Error::Http(_))));
    }

    #[tokio::test]
    async fn minute_bars_are_sorted_ascending() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/v2/aggs/ticker/ABC/range/1/minute/\d{4}-\d{2}-\d{2}/\d{4}-\d{2}-\d{2}$"))
            .and(query_param("sort", "desc"))
            .and(query_param("limit", "200"))
            .and(query_param("adjusted", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "OK",
                "results": [
                    {"t": 1772463720000i64, "o": 1.2, "h": 1.3, "l": 1.1, "c": 1.25, "v": 900},
                    {"t": 1772463660000i64, "o": 1.1, "h": 1.2, "l": 1.0, "c": 1.2, "v": 800},
                    {"t": 1772463600000i64, "o": 1.0, "h": 1.1, "l": 0.9, "c": 1.1, "v": 700}
                ]
            })))
            .mount(&server)
            .await;

        let rest = PolygonRest::with_base_url("KEY", server.uri()).unwrap();
        let bars = rest.minute_bars("ABC", 200).await.unwrap();
        assert_eq!(bars.len(), 3);
        assert!(bars.windows(2).all(|w| w[0].open_time < w[1].open_time));
        assert_eq!(bars[0].close, 1.1);
        assert_eq!(bars[2].volume, 900.0);
    }

    #[tokio::test]
    async fn minute_bars_empty_when_no_results() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "OK", "resultsCount": 0})))
            .mount(&server)
            .await;
        let rest = PolygonRest::with_base_url("KEY", server.uri()).unwrap();
        assert!(rest.minute_bars("ABC", 200).await.unwrap().is_empty());
    }
}
