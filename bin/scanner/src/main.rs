use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use common::{Config, Error, NeutralScorer, PushClient, Result, Scorer};
use engine::{
    Consumer, ConsumerSettings, Engine, EngineSettings, PolygonRest, Store, StreamQueue,
    SubscriptionManager, SubscriptionSettings,
};
use notify::{FcmClient, NotificationDispatcher, ServiceAccountAuth, ServiceAccountKey, WebhookNotifier};
use scorer::GeminiScorer;
use strategy::{RegistrySettings, StateRegistry, StrategyConfig};

const COMMAND_CAPACITY: usize = 256;

#[tokio::main]
async fn main() {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = run().await {
        error!(error = %e, "Scanner stopped");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // ── Config ────────────────────────────────────────────────────────────────
    let cfg = Config::from_env()?;
    let mut strategy_cfg = StrategyConfig::load(cfg.strategy_config_path.as_deref())?;
    strategy_cfg.min_bars = strategy_cfg.min_bars.max(cfg.min_data_req);
    info!(
        max_price = cfg.max_price,
        top_n = cfg.top_n,
        required_bars = strategy_cfg.required_bars(),
        "Scanner starting"
    );

    // ── Database ──────────────────────────────────────────────────────────────
    let store = Store::connect(&cfg.database_url).await?;

    // ── Notifications ─────────────────────────────────────────────────────────
    let push: Option<Arc<dyn PushClient>> = match &cfg.fcm_credentials_path {
        Some(path) => {
            let key = ServiceAccountKey::from_file(path)?;
            let project = cfg
                .fcm_project_id
                .clone()
                .or_else(|| key.project_id.clone())
                .ok_or_else(|| Error::Config("FCM_PROJECT_ID is not set and the key has no project_id".into()))?;
            let auth = ServiceAccountAuth::new(&key)?;
            Some(Arc::new(FcmClient::new(&project, auth)?))
        }
        None => {
            warn!("FCM_CREDENTIALS not set, push notifications disabled");
            None
        }
    };
    let mut dispatcher = NotificationDispatcher::new(Arc::new(store.clone()), push);
    if let Some(url) = &cfg.discord_webhook_url {
        dispatcher = dispatcher.with_webhook(WebhookNotifier::new(url.clone())?);
    }

    if std::env::args().nth(1).as_deref() == Some("test") {
        let report = dispatcher.send_test().await;
        info!(
            delivered = report.delivered,
            failed = report.failed,
            removed = report.removed,
            "Test notification sent"
        );
        return Ok(());
    }

    // ── Scorer ────────────────────────────────────────────────────────────────
    let scorer: Arc<dyn Scorer> = match (&cfg.scorer_endpoint, &cfg.scorer_api_key) {
        (Some(endpoint), Some(key)) => {
            Arc::new(GeminiScorer::new(endpoint.clone(), key.clone(), cfg.scorer_timeout)?)
        }
        _ => {
            warn!("Scorer credentials not set, every signal gets the neutral score");
            Arc::new(NeutralScorer)
        }
    };

    // ── Engine ────────────────────────────────────────────────────────────────
    let queue = Arc::new(StreamQueue::new());
    let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);

    let rest = Arc::new(PolygonRest::new(cfg.polygon_api_key.clone())?);
    let manager = SubscriptionManager::new(
        rest,
        store.clone(),
        command_tx,
        SubscriptionSettings {
            max_price: cfg.max_price,
            top_n: cfg.top_n,
            scan_interval: cfg.scan_interval,
        },
    );

    let mut engine_settings = EngineSettings::new(cfg.polygon_api_key.clone());
    engine_settings.reconnect_delay = cfg.reconnect_delay;
    engine_settings.keepalive_interval = cfg.keepalive_interval;
    let (engine, engine_handle) = Engine::new(engine_settings, queue.clone(), manager);

    // ── Consumer ──────────────────────────────────────────────────────────────
    let signal_cooldown = chrono::Duration::from_std(cfg.signal_cooldown)
        .map_err(|e| Error::Config(format!("SIGNAL_COOLDOWN_SECS out of range: {e}")))?;
    let registry = StateRegistry::new(
        strategy_cfg,
        RegistrySettings {
            signal_cooldown,
            focus_top_n: cfg.focus_top_n,
            ..Default::default()
        },
    );
    let consumer = Consumer::new(
        registry,
        queue,
        command_rx,
        engine_handle.connection(),
        store,
        scorer,
        Arc::new(dispatcher),
        ConsumerSettings {
            poll_timeout: Duration::from_secs(1),
            focus_interval: cfg.focus_interval,
            gc_interval: Duration::from_secs(300),
        },
    );

    tokio::spawn(engine.run());
    tokio::spawn(consumer.run());
    info!("Scanner running. Press Ctrl-C to stop.");

    tokio::signal::ctrl_c().await?;
    info!(
        state = ?engine_handle.state().await,
        sessions = engine_handle.sessions(),
        "Shutting down"
    );
    Ok(())
}
