use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use common::{AggregateKind, Bar, Error, Signal, StreamEvent};

use crate::config::StrategyConfig;
use crate::decision::SignalDecisionEngine;
use crate::focus::{FocusChange, FocusTracker};
use crate::snapshot::IndicatorEngine;
use crate::state::SymbolState;

/// Tunables for the registry that do not belong to the indicator set.
#[derive(Debug, Clone)]
pub struct RegistrySettings {
    pub signal_cooldown: Duration,
    pub focus_top_n: usize,
    pub focus_min_hold: Duration,
    pub gc_ttl: Duration,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            signal_cooldown: Duration::seconds(60),
            focus_top_n: 3,
            focus_min_hold: Duration::seconds(60),
            gc_ttl: Duration::seconds(600),
        }
    }
}

/// Owns every per-symbol state entry and runs the evaluation pipeline on it.
///
/// Only the consumer loop holds a registry, so no symbol is ever mutated
/// from two places at once.
pub struct StateRegistry {
    states: HashMap<String, SymbolState>,
    cooldowns: HashMap<String, DateTime<Utc>>,
    indicators: IndicatorEngine,
    decisions: SignalDecisionEngine,
    focus: FocusTracker,
    signal_cooldown: Duration,
}

impl StateRegistry {
    pub fn new(cfg: StrategyConfig, settings: RegistrySettings) -> Self {
        Self {
            states: HashMap::new(),
            cooldowns: HashMap::new(),
            indicators: IndicatorEngine::new(cfg.clone()),
            decisions: SignalDecisionEngine::new(cfg),
            focus: FocusTracker::new(
                settings.focus_top_n,
                settings.focus_min_hold,
                settings.gc_ttl,
            ),
            signal_cooldown: settings.signal_cooldown,
        }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.states.contains_key(symbol)
    }

    pub fn get(&self, symbol: &str) -> Option<&SymbolState> {
        self.states.get(symbol)
    }

    pub fn symbols(&self) -> HashSet<String> {
        self.states.keys().cloned().collect()
    }

    pub fn focus(&self) -> &FocusTracker {
        &self.focus
    }

    /// Create (or replace) the state for `symbol` from historical bars.
    pub fn attach(&mut self, symbol: &str, seed: Vec<Bar>, now: DateTime<Utc>) {
        let state = SymbolState::seeded(symbol, seed, now);
        info!(symbol, bars = state.bars().len(), "Symbol attached");
        self.states.insert(symbol.to_string(), state);
    }

    /// Destroy all state for `symbol`. Returns `true` if it was focused,
    /// in which case the caller must drop its quote subscription.
    pub fn detach(&mut self, symbol: &str) -> bool {
        if self.states.remove(symbol).is_some() {
            info!(symbol, "Symbol detached");
        }
        self.cooldowns.remove(symbol);
        self.focus.forget(symbol)
    }

    /// Detach every symbol not in `active`. Returns the detached symbols.
    pub fn retain(&mut self, active: &HashSet<String>) -> Vec<String> {
        let mut gone: Vec<String> =
            self.states.keys().filter(|s| !active.contains(*s)).cloned().collect();
        gone.sort();
        for sym in &gone {
            self.detach(sym);
        }
        gone
    }

    /// Apply one decoded event. Minute aggregates trigger an evaluation of
    /// the symbol; everything else only updates state. Events for symbols
    /// that are not attached are ignored.
    pub fn apply(&mut self, event: StreamEvent, now: DateTime<Utc>) -> Option<Signal> {
        match event {
            StreamEvent::Aggregate { kind, bar } => {
                if !self.states.contains_key(&bar.symbol) {
                    return None;
                }
                self.focus.observe(&bar, now);
                if kind != AggregateKind::Minute {
                    return None;
                }
                let symbol = bar.symbol.clone();
                if let Some(state) = self.states.get_mut(&symbol) {
                    state.apply_bar(bar, now);
                }
                self.evaluate(&symbol, now)
            }
            StreamEvent::Trade(tick) => {
                if let Some(ev) = self.focus.evaluator_mut(&tick.symbol) {
                    ev.on_trade(&tick);
                }
                if let Some(state) = self.states.get_mut(&tick.symbol) {
                    state.push_tick(tick, now);
                }
                None
            }
            StreamEvent::Quote(quote) => {
                if let Some(ev) = self.focus.evaluator_mut(&quote.symbol) {
                    ev.on_quote(&quote);
                }
                None
            }
            StreamEvent::Status { status, message } => {
                debug!(%status, %message, "Upstream status");
                None
            }
        }
    }

    /// Evaluate `symbol` on its current history. Returns a signal when a
    /// rule fires and the symbol is not cooling down.
    pub fn evaluate(&mut self, symbol: &str, now: DateTime<Utc>) -> Option<Signal> {
        let state = self.states.get(symbol)?;
        if let Some(until) = self.cooldowns.get(symbol) {
            if now < *until {
                return None;
            }
        }

        let frame = state.evaluation_frame();
        let snapshot = match self.indicators.snapshot(&frame) {
            Ok(s) => s,
            Err(Error::InsufficientData { have, need }) => {
                debug!(symbol, have, need, "Not enough history yet");
                return None;
            }
            Err(e) => {
                warn!(symbol, error = %e, "Indicator computation failed, skipping symbol");
                return None;
            }
        };

        let mut signal = self.decisions.decide(symbol, snapshot)?;
        signal.focus = self.focus.metrics(symbol);
        signal.timestamp = now;
        self.cooldowns.insert(symbol.to_string(), now + self.signal_cooldown);
        info!(symbol, strategy = %signal.strategy, price = signal.price, "Signal raised");
        Some(signal)
    }

    /// Recompute the focus set from the attached symbols.
    pub fn reconcile_focus(&mut self, now: DateTime<Utc>) -> FocusChange {
        let active = self.symbols();
        let change = self.focus.reconcile(&active, now);
        for sym in &change.attach {
            info!(symbol = %sym, "Focus attached");
        }
        for sym in &change.detach {
            info!(symbol = %sym, "Focus detached");
        }
        change
    }

    /// Drop stale activity and expired cooldowns.
    pub fn collect_garbage(&mut self, now: DateTime<Utc>) -> usize {
        self.cooldowns.retain(|_, until| *until > now);
        let dropped = self.focus.collect_garbage(now);
        if dropped > 0 {
            debug!(dropped, remaining = self.focus.tracked(), "Garbage collected");
        }
        dropped
    }
}
