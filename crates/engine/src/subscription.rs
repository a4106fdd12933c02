use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info, warn};

use common::{Bar, Error, MarketDataSource, Result, WatchStatus, WatchedTicker};

use crate::polygon::{bar_topics, ConnectionHandle};
use crate::store::Store;

pub const SEED_BARS: usize = 200;

/// Instructions from the subscription manager to the state registry owner.
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryCommand {
    /// Create state for a newly subscribed symbol from historical bars.
    Attach { symbol: String, bars: Vec<Bar> },
    /// Destroy all state for an unsubscribed symbol.
    Detach(String),
    /// First cycle of a fresh connection: this is the complete active set.
    Sync(HashSet<String>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionDiff {
    pub to_add: Vec<String>,
    pub to_remove: Vec<String>,
}

impl SubscriptionDiff {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// Symbols in `target` but not `current` are added (in target order);
/// symbols in `current` but not `target` are removed (sorted).
pub fn diff(current: &HashSet<String>, target: &[String]) -> SubscriptionDiff {
    let mut seen = HashSet::new();
    let to_add = target
        .iter()
        .filter(|s| !current.contains(*s) && seen.insert(s.as_str()))
        .cloned()
        .collect();
    let wanted: HashSet<&str> = target.iter().map(String::as_str).collect();
    let mut to_remove: Vec<String> =
        current.iter().filter(|s| !wanted.contains(s.as_str())).cloned().collect();
    to_remove.sort();
    SubscriptionDiff { to_add, to_remove }
}

#[derive(Debug, Clone)]
pub struct SubscriptionSettings {
    pub max_price: f64,
    pub top_n: usize,
    pub scan_interval: Duration,
}

impl Default for SubscriptionSettings {
    fn default() -> Self {
        Self {
            max_price: 20.0,
            top_n: 100,
            scan_interval: Duration::from_secs(180),
        }
    }
}

/// Per-connection subscription bookkeeping. A new session starts empty so
/// the first cycle re-subscribes everything.
#[derive(Debug, Default)]
pub struct SessionSubscriptions {
    subscribed: HashSet<String>,
    synced: bool,
}

impl SessionSubscriptions {
    pub fn subscribed(&self) -> &HashSet<String> {
        &self.subscribed
    }
}

/// Periodically recomputes the active symbol set and reconciles the stream
/// subscriptions and the registry against it.
pub struct SubscriptionManager {
    source: Arc<dyn MarketDataSource>,
    store: Store,
    commands: mpsc::Sender<RegistryCommand>,
    settings: SubscriptionSettings,
    /// Target set from the last successful candidate fetch.
    last_target: Mutex<Vec<String>>,
}

impl SubscriptionManager {
    pub fn new(
        source: Arc<dyn MarketDataSource>,
        store: Store,
        commands: mpsc::Sender<RegistryCommand>,
        settings: SubscriptionSettings,
    ) -> Self {
        Self { source, store, commands, settings, last_target: Mutex::new(Vec::new()) }
    }

    /// Run reconciliation cycles for one connection until a send fails.
    pub async fn run(self: Arc<Self>, conn: ConnectionHandle) -> Result<()> {
        let mut session = SessionSubscriptions::default();
        let mut ticker = tokio::time::interval(self.settings.scan_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.reconcile(&mut session, &conn).await?;
        }
    }

    /// One reconciliation cycle. Only transport and command-channel failures
    /// are returned; everything else is logged and the cycle carries on.
    ///
    /// A failed candidate fetch keeps the current subscriptions. On the first
    /// cycle of a new connection there are none, so the last known target set
    /// is restored instead, without starting a new scan epoch.
    pub async fn reconcile(
        &self,
        session: &mut SessionSubscriptions,
        conn: &ConnectionHandle,
    ) -> Result<SubscriptionDiff> {
        let (target, fresh_scan) =
            match self.source.candidates(self.settings.max_price, self.settings.top_n).await {
                Ok(t) => {
                    *self.last_target.lock().await = t.clone();
                    (t, true)
                }
                Err(e) => {
                    let known = self.last_target.lock().await.clone();
                    if session.synced || known.is_empty() {
                        warn!(error = %e, "Candidate fetch failed, keeping current subscriptions");
                        return Ok(SubscriptionDiff::default());
                    }
                    warn!(error = %e, count = known.len(), "Candidate fetch failed on a new connection, restoring last known symbols");
                    (known, false)
                }
            };

        if fresh_scan {
            if let Err(e) = self.store.begin_epoch().await {
                error!(error = %e, "Failed to clear previous scan epoch");
            }
        }

        let change = diff(&session.subscribed, &target);

        for symbol in &change.to_remove {
            conn.unsubscribe(&bar_topics(symbol)).await?;
            self.command(RegistryCommand::Detach(symbol.clone())).await?;
            session.subscribed.remove(symbol);
        }
        if !change.to_remove.is_empty() {
            info!(count = change.to_remove.len(), "Unsubscribed dropped symbols");
        }

        for symbol in &change.to_add {
            let bars = match self.source.minute_bars(symbol, SEED_BARS).await {
                Ok(b) => b,
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "Seeding failed, starting cold");
                    Vec::new()
                }
            };
            // Seed before subscribing so no live bar lands on an empty state.
            self.command(RegistryCommand::Attach { symbol: symbol.clone(), bars }).await?;
            conn.subscribe(&bar_topics(symbol)).await?;
            session.subscribed.insert(symbol.clone());
        }
        if !change.to_add.is_empty() {
            info!(count = change.to_add.len(), "Subscribed and seeded new symbols");
        }

        if !session.synced {
            self.command(RegistryCommand::Sync(session.subscribed.clone())).await?;
            session.synced = true;
        }

        if fresh_scan {
            let status = watch_status(&target, &change);
            if let Err(e) = self.store.save_status(&status).await {
                error!(error = %e, "Failed to save watch status");
            }
            info!(watching = status.watching_count, "Scan cycle complete");
        }
        Ok(change)
    }

    async fn command(&self, cmd: RegistryCommand) -> Result<()> {
        self.commands
            .send(cmd)
            .await
            .map_err(|_| Error::Transport("registry command channel closed".into()))
    }
}

fn watch_status(target: &[String], change: &SubscriptionDiff) -> WatchStatus {
    let added: HashSet<&str> = change.to_add.iter().map(String::as_str).collect();
    let mut seen = HashSet::new();
    let watching_tickers: Vec<WatchedTicker> = target
        .iter()
        .filter(|t| seen.insert(t.as_str()))
        .map(|t| WatchedTicker { ticker: t.clone(), is_new: added.contains(t.as_str()) })
        .collect();
    WatchStatus {
        last_scan_time: Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        watching_count: watching_tickers.len(),
        watching_tickers,
    }
}
