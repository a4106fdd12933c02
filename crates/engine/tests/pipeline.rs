use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use tokio::sync::mpsc;

use common::{Bar, DeliveryError, PushClient, PushMessage, StrategyType};
use engine::{ConnectionHandle, Consumer, ConsumerSettings, RegistryCommand, Store, StreamQueue};
use notify::NotificationDispatcher;
use scorer::GeminiScorer;
use strategy::{RegistrySettings, StateRegistry, StrategyConfig};

#[derive(Default)]
struct RecordingPush {
    sent: Mutex<Vec<(String, PushMessage)>>,
}

#[async_trait]
impl PushClient for RecordingPush {
    async fn send(&self, token: &str, message: &PushMessage) -> Result<(), DeliveryError> {
        self.sent.lock().unwrap().push((token.to_string(), message.clone()));
        Ok(())
    }
}

/// Sixty bars climbing in a zig-zag: a steady rise with alternating up and
/// down closes, strong volume on up bars. One late bar wicks down so the
/// kijun sits under the tenkan only on the final bar, which lands a fresh
/// bullish cross above a thick cloud.
fn standard_setup(symbol: &str) -> Vec<Bar> {
    let t0 = Utc.with_ymd_and_hms(2026, 3, 2, 14, 30, 0).unwrap();
    let closes: Vec<f64> = (0..60)
        .map(|i| 10.0 + 0.06 * i as f64 + if i % 2 == 0 { 0.08 } else { -0.08 })
        .collect();

    let mut bars: Vec<Bar> = closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Bar {
                symbol: symbol.into(),
                open_time: t0 + ChronoDuration::minutes(i as i64),
                open,
                high: open.max(close) + 0.02,
                low: open.min(close) - 0.08,
                close,
                volume: if close > open { 3000.0 } else { 1000.0 },
            }
        })
        .collect();
    bars[57].low -= 0.3;
    bars[59].volume = 1800.0;
    bars
}

async fn memory_store() -> Store {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    let store = Store::new(pool);
    store.migrate().await.unwrap();
    store
}

#[tokio::test]
async fn seeded_setup_raises_one_standard_recommendation() {
    let store = memory_store().await;
    store.add_subscriber("device-0", None).await.unwrap();

    let push = Arc::new(RecordingPush::default());
    let notifier = NotificationDispatcher::new(Arc::new(store.clone()), Some(push.clone()));
    let scorer = GeminiScorer::new("http://127.0.0.1:1/", "KEY", Duration::from_secs(2)).unwrap();

    let (cmd_tx, cmd_rx) = mpsc::channel(8);
    let (out_tx, _out_rx) = mpsc::channel(8);
    let mut consumer = Consumer::new(
        StateRegistry::new(StrategyConfig::default(), RegistrySettings::default()),
        Arc::new(StreamQueue::new()),
        cmd_rx,
        ConnectionHandle::new(out_tx),
        store.clone(),
        Arc::new(scorer),
        Arc::new(notifier),
        ConsumerSettings::default(),
    );

    cmd_tx
        .send(RegistryCommand::Attach { symbol: "DNSO".into(), bars: standard_setup("DNSO") })
        .await
        .unwrap();
    let fresh = consumer.apply_commands().await;

    assert_eq!(fresh.len(), 1);
    assert_eq!(fresh[0].symbol, "DNSO");
    assert_eq!(fresh[0].strategy, StrategyType::Standard);
    assert_eq!(fresh[0].score, 50);

    assert_eq!(store.signal_count().await.unwrap(), 1);
    let rows = store.recommendations().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].score, 50);
    assert_eq!(rows[0].strategy, StrategyType::Standard);

    let sent = push.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "device-0");
    assert_eq!(sent[0].1.data["ticker"], "DNSO");
    assert_eq!(sent[0].1.data["strategy"], "Standard");
}

#[tokio::test]
async fn duplicate_within_epoch_is_not_notified_twice() {
    let store = memory_store().await;
    store.add_subscriber("device-0", None).await.unwrap();

    let push = Arc::new(RecordingPush::default());
    let notifier = NotificationDispatcher::new(Arc::new(store.clone()), Some(push.clone()));
    let (cmd_tx, cmd_rx) = mpsc::channel(8);
    let (out_tx, _out_rx) = mpsc::channel(8);
    let settings = RegistrySettings { signal_cooldown: ChronoDuration::zero(), ..Default::default() };
    let mut consumer = Consumer::new(
        StateRegistry::new(StrategyConfig::default(), settings),
        Arc::new(StreamQueue::new()),
        cmd_rx,
        ConnectionHandle::new(out_tx),
        store.clone(),
        Arc::new(common::NeutralScorer),
        Arc::new(notifier),
        ConsumerSettings::default(),
    );

    for _ in 0..2 {
        cmd_tx
            .send(RegistryCommand::Attach { symbol: "DNSO".into(), bars: standard_setup("DNSO") })
            .await
            .unwrap();
    }
    let fresh = consumer.apply_commands().await;

    assert_eq!(fresh.len(), 1);
    assert_eq!(store.signal_count().await.unwrap(), 2);
    assert_eq!(store.recommendations().await.unwrap().len(), 1);
    assert_eq!(push.sent.lock().unwrap().len(), 1);
}
