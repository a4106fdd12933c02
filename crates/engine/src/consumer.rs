use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use common::{Notifier, Recommendation, Scorer, Signal};
use strategy::{FocusChange, StateRegistry};

use crate::polygon::{parse_frame, quote_topics, ConnectionHandle, ControlFrame, Outbound};
use crate::queue::StreamQueue;
use crate::store::Store;
use crate::subscription::RegistryCommand;

#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    /// How long one queue pop may block before periodic work runs.
    pub poll_timeout: Duration,
    pub focus_interval: Duration,
    pub gc_interval: Duration,
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_secs(1),
            focus_interval: Duration::from_secs(60),
            gc_interval: Duration::from_secs(300),
        }
    }
}

/// The single owner of all per-symbol state.
///
/// Dequeues raw frames, applies them to the registry and pushes any raised
/// signal through scoring, persistence and notification before taking the
/// next frame. Periodic focus reconciliation and garbage collection run on
/// the same loop between pops.
pub struct Consumer {
    registry: StateRegistry,
    queue: Arc<StreamQueue>,
    commands: mpsc::Receiver<RegistryCommand>,
    connection: ConnectionHandle,
    store: Store,
    scorer: Arc<dyn Scorer>,
    notifier: Arc<dyn Notifier>,
    settings: ConsumerSettings,
    next_focus: Instant,
    next_gc: Instant,
}

impl Consumer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: StateRegistry,
        queue: Arc<StreamQueue>,
        commands: mpsc::Receiver<RegistryCommand>,
        connection: ConnectionHandle,
        store: Store,
        scorer: Arc<dyn Scorer>,
        notifier: Arc<dyn Notifier>,
        settings: ConsumerSettings,
    ) -> Self {
        let now = Instant::now();
        Self {
            registry,
            queue,
            commands,
            connection,
            store,
            scorer,
            notifier,
            next_focus: now + settings.focus_interval,
            next_gc: now + settings.gc_interval,
            settings,
        }
    }

    pub fn registry(&self) -> &StateRegistry {
        &self.registry
    }

    /// Run forever. Call from `tokio::spawn`.
    pub async fn run(mut self) {
        info!("Consumer loop running");
        loop {
            self.step().await;
        }
    }

    /// One loop iteration: registry commands, at most one frame, then any
    /// periodic work that is due.
    pub async fn step(&mut self) {
        self.apply_commands().await;

        if let Some(text) = self.queue.pop(self.settings.poll_timeout).await {
            // An Attach always precedes the subscribe that makes its bars flow.
            self.apply_commands().await;
            self.handle_text(&text).await;
        }

        let now = Instant::now();
        if now >= self.next_focus {
            self.next_focus = now + self.settings.focus_interval;
            self.reconcile_focus();
        }
        if now >= self.next_gc {
            self.next_gc = now + self.settings.gc_interval;
            self.registry.collect_garbage(Utc::now());
        }
    }

    /// Apply every pending registry command. Newly attached symbols get an
    /// initial evaluation so a setup already present in the seed history is
    /// not missed. Returns the recommendations that were newly persisted.
    pub async fn apply_commands(&mut self) -> Vec<Recommendation> {
        let mut fresh = Vec::new();
        loop {
            let cmd = match self.commands.try_recv() {
                Ok(cmd) => cmd,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    debug!("Registry command channel closed");
                    break;
                }
            };
            match cmd {
                RegistryCommand::Attach { symbol, bars } => {
                    self.registry.attach(&symbol, bars, Utc::now());
                    if let Some(signal) = self.registry.evaluate(&symbol, Utc::now()) {
                        fresh.extend(self.handle_signal(signal).await);
                    }
                }
                RegistryCommand::Detach(symbol) => {
                    if self.registry.detach(&symbol) {
                        self.send_quote_frame(ControlFrame::unsubscribe(&quote_topics(&symbol)));
                    }
                }
                RegistryCommand::Sync(active) => self.sync(&active),
            }
        }
        fresh
    }

    /// A new connection starts with no quote subscriptions, so focused
    /// symbols that survive the sync are subscribed again.
    fn sync(&mut self, active: &HashSet<String>) {
        let dropped = self.registry.retain(active);
        if !dropped.is_empty() {
            info!(count = dropped.len(), "Dropped state for symbols outside the new session");
        }
        let mut focused: Vec<String> = self.registry.focus().focused().into_iter().collect();
        focused.sort();
        for symbol in focused {
            self.send_quote_frame(ControlFrame::subscribe(&quote_topics(&symbol)));
        }
    }

    /// Decode one raw frame and run every event through the registry.
    pub async fn handle_text(&mut self, text: &str) -> Vec<Recommendation> {
        let events = match parse_frame(text) {
            Ok(events) => events,
            Err(e) => {
                warn!(error = %e, "Skipping malformed frame");
                return Vec::new();
            }
        };

        let mut fresh = Vec::new();
        for event in events {
            if let Some(signal) = self.registry.apply(event, Utc::now()) {
                fresh.extend(self.handle_signal(signal).await);
            }
        }
        fresh
    }

    /// Persist, score, de-duplicate and dispatch one signal.
    async fn handle_signal(&mut self, signal: Signal) -> Option<Recommendation> {
        if let Err(e) = self.store.record_signal(&signal).await {
            error!(symbol = %signal.symbol, error = %e, "Failed to record signal");
        }

        let score = self.scorer.score(&signal).await;
        if score.fallback {
            debug!(symbol = %signal.symbol, reason = %score.reasoning, "Neutral score used");
        }
        let rec = Recommendation {
            symbol: signal.symbol.clone(),
            price: signal.price,
            score: score.score,
            strategy: signal.strategy,
            time: signal.timestamp,
        };

        match self.store.insert_recommendation(&rec).await {
            Ok(true) => {
                info!(symbol = %rec.symbol, score = rec.score, strategy = %rec.strategy, "New recommendation");
                let report = self.notifier.notify(&rec).await;
                info!(
                    symbol = %rec.symbol,
                    delivered = report.delivered,
                    filtered = report.filtered,
                    failed = report.failed,
                    removed = report.removed,
                    "Notification fan-out complete"
                );
                Some(rec)
            }
            Ok(false) => {
                debug!(symbol = %rec.symbol, "Duplicate recommendation suppressed");
                None
            }
            Err(e) => {
                error!(symbol = %rec.symbol, error = %e, "Failed to persist recommendation");
                None
            }
        }
    }

    pub fn reconcile_focus(&mut self) -> FocusChange {
        let change = self.registry.reconcile_focus(Utc::now());
        for symbol in &change.detach {
            self.send_quote_frame(ControlFrame::unsubscribe(&quote_topics(symbol)));
        }
        for symbol in &change.attach {
            self.send_quote_frame(ControlFrame::subscribe(&quote_topics(symbol)));
        }
        change
    }

    fn send_quote_frame(&self, frame: ControlFrame) {
        if let Err(e) = self.connection.try_send(Outbound::Control(frame)) {
            warn!(error = %e, "Could not queue quote subscription change");
        }
    }
}
