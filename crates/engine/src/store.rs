use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::{debug, info};

use common::{Error, Recommendation, Result, Signal, StrategyType, Subscriber, SubscriberStore, WatchStatus};

const STATUS_KEY: &str = "status_data";

/// Persistence for signals, recommendations, subscribers and process status.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) the database at `url` and run migrations.
    pub async fn connect(url: &str) -> Result<Self> {
        let opts = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new().max_connections(4).connect_with(opts).await?;
        let store = Self::new(pool);
        store.migrate().await?;
        info!("Database ready");
        Ok(store)
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(e.into()))
    }

    pub async fn record_signal(&self, signal: &Signal) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO signals (id, ticker, price, strategy, time)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(&signal.id)
        .bind(&signal.symbol)
        .bind(signal.price)
        .bind(signal.strategy.to_string())
        .bind(signal.timestamp.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Insert a recommendation unless one already exists for the ticker.
    /// Returns `true` only when a new row was written.
    pub async fn insert_recommendation(&self, rec: &Recommendation) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO recommendations (ticker, price, time, probability_score, strategy)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(ticker) DO NOTHING
            "#,
        )
        .bind(&rec.symbol)
        .bind(rec.price)
        .bind(rec.time.to_rfc3339())
        .bind(i64::from(rec.score))
        .bind(rec.strategy.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn recommendations(&self) -> Result<Vec<Recommendation>> {
        let rows: Vec<(String, f64, String, i64, String)> = sqlx::query_as(
            "SELECT ticker, price, time, probability_score, strategy FROM recommendations ORDER BY time",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(symbol, price, time, score, strategy)| {
                Ok(Recommendation {
                    symbol,
                    price,
                    score: score.clamp(0, 100) as u8,
                    strategy: parse_strategy(&strategy)?,
                    time: parse_time(&time)?,
                })
            })
            .collect()
    }

    pub async fn signal_count(&self) -> Result<i64> {
        let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM signals").fetch_one(&self.pool).await?;
        Ok(n)
    }

    /// Start a new scan epoch: signals and recommendations from the previous
    /// epoch are discarded so a symbol can be recommended again.
    pub async fn begin_epoch(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM signals").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM recommendations").execute(&mut *tx).await?;
        tx.commit().await?;
        debug!("Scan epoch started");
        Ok(())
    }

    pub async fn save_status(&self, status: &WatchStatus) -> Result<()> {
        let value = serde_json::to_string(status)?;
        sqlx::query(
            r#"
            INSERT INTO status (key, value, last_updated)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, last_updated = excluded.last_updated
            "#,
        )
        .bind(STATUS_KEY)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn load_status(&self) -> Result<Option<WatchStatus>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM status WHERE key = ?1")
            .bind(STATUS_KEY)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some((value,)) => Ok(Some(serde_json::from_str(&value)?)),
            None => Ok(None),
        }
    }

    /// Register or update a subscriber. `None` stores the default threshold.
    pub async fn add_subscriber(&self, token: &str, min_score: Option<i64>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO fcm_tokens (token, min_score)
            VALUES (?1, ?2)
            ON CONFLICT(token) DO UPDATE SET min_score = excluded.min_score
            "#,
        )
        .bind(token)
        .bind(min_score.unwrap_or(0))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl SubscriberStore for Store {
    async fn subscribers(&self) -> Result<Vec<Subscriber>> {
        let rows: Vec<(String, Option<i64>)> = sqlx::query_as("SELECT token, min_score FROM fcm_tokens")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|(token, min_score)| Subscriber { token, min_score: min_score.unwrap_or(0) })
            .collect())
    }

    async fn remove_subscribers(&self, tokens: &[String]) -> Result<u64> {
        if tokens.is_empty() {
            return Ok(0);
        }
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("DELETE FROM fcm_tokens WHERE token IN (");
        let mut list = qb.separated(", ");
        for token in tokens {
            list.push_bind(token);
        }
        list.push_unseparated(")");
        let result = qb.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

fn parse_strategy(raw: &str) -> Result<StrategyType> {
    Ok(serde_json::from_value(serde_json::Value::String(raw.to_string()))?)
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::Database(sqlx::Error::Decode(Box::new(e))))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use common::WatchedTicker;

    pub(crate) async fn memory_store() -> Store {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = Store::new(pool);
        store.migrate().await.unwrap();
        store
    }

    fn rec(symbol: &str, score: u8) -> Recommendation {
        Recommendation {
            symbol: symbol.into(),
            price: 4.2,
            score,
            strategy: StrategyType::PreBreakout,
            time: Utc::now(),
        }
    }

    #[tokio::test]
    async fn duplicate_recommendation_is_a_no_op() {
        let store = memory_store().await;
        assert!(store.insert_recommendation(&rec("ABC", 70)).await.unwrap());
        assert!(!store.insert_recommendation(&rec("ABC", 90)).await.unwrap());

        let rows = store.recommendations().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].score, 70);
        assert_eq!(rows[0].strategy, StrategyType::PreBreakout);
    }

    #[tokio::test]
    async fn new_epoch_allows_the_symbol_again() {
        let store = memory_store().await;
        assert!(store.insert_recommendation(&rec("ABC", 70)).await.unwrap());
        store.begin_epoch().await.unwrap();
        assert!(store.recommendations().await.unwrap().is_empty());
        assert!(store.insert_recommendation(&rec("ABC", 75)).await.unwrap());
    }

    #[tokio::test]
    async fn subscribers_default_threshold_and_batch_removal() {
        let store = memory_store().await;
        store.add_subscriber("t1", None).await.unwrap();
        store.add_subscriber("t2", Some(80)).await.unwrap();
        store.add_subscriber("t3", Some(10)).await.unwrap();

        let mut subs = store.subscribers().await.unwrap();
        subs.sort_by(|a, b| a.token.cmp(&b.token));
        assert_eq!(subs[0], Subscriber { token: "t1".into(), min_score: 0 });
        assert_eq!(subs[1].min_score, 80);

        let removed = store
            .remove_subscribers(&["t1".to_string(), "t3".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 2);
        let left = store.subscribers().await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].token, "t2");
        assert_eq!(store.remove_subscribers(&[]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn status_is_upserted() {
        let store = memory_store().await;
        assert!(store.load_status().await.unwrap().is_none());

        let mut status = WatchStatus {
            last_scan_time: "2026-03-02 09:31:00".into(),
            watching_count: 1,
            watching_tickers: vec![WatchedTicker { ticker: "ABC".into(), is_new: true }],
        };
        store.save_status(&status).await.unwrap();
        status.watching_count = 0;
        status.watching_tickers.clear();
        store.save_status(&status).await.unwrap();

        assert_eq!(store.load_status().await.unwrap(), Some(status));
    }
}
