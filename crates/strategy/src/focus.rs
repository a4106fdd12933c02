//! Focus set selection and per-tick microstructure for the few symbols
//! that get heavier processing.

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Duration, Utc};

use common::{Bar, FocusMetrics, Quote, Tick};

const GAINER_CANDIDATES: usize = 10;
const MIN_WINDOW_VOLUME: f64 = 1000.0;
const STALE_AFTER_SECS: i64 = 600;
const TICK_SPEED_WINDOW_MS: i64 = 1000;
const MAX_RECENT_TICKS: usize = 3000;

/// Running change and volume since a symbol was first seen.
#[derive(Debug, Clone)]
struct Activity {
    start_price: f64,
    last_price: f64,
    volume: f64,
    last_updated: DateTime<Utc>,
}

impl Activity {
    fn change_pct(&self) -> f64 {
        if self.start_price > 0.0 {
            (self.last_price - self.start_price) / self.start_price * 100.0
        } else {
            0.0
        }
    }
}

/// Trade-driven state of one focused symbol.
#[derive(Debug, Clone)]
pub struct FocusEvaluator {
    attached_at: DateTime<Utc>,
    pv_sum: f64,
    volume_sum: f64,
    recent: VecDeque<Tick>,
    quote: Option<Quote>,
}

impl FocusEvaluator {
    pub fn new(attached_at: DateTime<Utc>) -> Self {
        Self {
            attached_at,
            pv_sum: 0.0,
            volume_sum: 0.0,
            recent: VecDeque::new(),
            quote: None,
        }
    }

    pub fn attached_at(&self) -> DateTime<Utc> {
        self.attached_at
    }

    pub fn on_trade(&mut self, tick: &Tick) {
        if !(tick.price.is_finite() && tick.size.is_finite()) || tick.size <= 0.0 {
            return;
        }
        self.pv_sum += tick.price * tick.size;
        self.volume_sum += tick.size;
        self.recent.push_back(tick.clone());
        while self.recent.len() > MAX_RECENT_TICKS {
            self.recent.pop_front();
        }
    }

    pub fn on_quote(&mut self, quote: &Quote) {
        self.quote = Some(quote.clone());
    }

    /// `None` until at least one trade has been seen.
    pub fn metrics(&self) -> Option<FocusMetrics> {
        let last = self.recent.back()?;
        let vwap = self.pv_sum / self.volume_sum;
        let vwap_dist_pct = if vwap > 0.0 { (last.price - vwap) / vwap * 100.0 } else { 0.0 };
        let since = last.timestamp - Duration::milliseconds(TICK_SPEED_WINDOW_MS);
        let tick_speed = self.recent.iter().rev().take_while(|t| t.timestamp > since).count();
        let spread_pct = self
            .quote
            .as_ref()
            .filter(|q| q.bid > 0.0 && q.ask >= q.bid)
            .map(|q| (q.ask - q.bid) / q.bid * 100.0);
        Some(FocusMetrics { vwap, vwap_dist_pct, tick_speed, spread_pct })
    }
}

/// What a focus reconciliation decided.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FocusChange {
    pub attach: Vec<String>,
    pub detach: Vec<String>,
}

impl FocusChange {
    pub fn is_empty(&self) -> bool {
        self.attach.is_empty() && self.detach.is_empty()
    }
}

/// Picks the focus set from aggregate activity and owns its evaluators.
#[derive(Debug)]
pub struct FocusTracker {
    top_n: usize,
    min_hold: Duration,
    gc_ttl: Duration,
    activity: HashMap<String, Activity>,
    evaluators: HashMap<String, FocusEvaluator>,
}

impl FocusTracker {
    pub fn new(top_n: usize, min_hold: Duration, gc_ttl: Duration) -> Self {
        Self {
            top_n,
            min_hold,
            gc_ttl,
            activity: HashMap::new(),
            evaluators: HashMap::new(),
        }
    }

    pub fn observe(&mut self, bar: &Bar, now: DateTime<Utc>) {
        if !bar.close.is_finite() || !bar.volume.is_finite() {
            return;
        }
        let entry = self.activity.entry(bar.symbol.clone()).or_insert_with(|| Activity {
            start_price: bar.open,
            last_price: bar.close,
            volume: 0.0,
            last_updated: now,
        });
        entry.last_price = bar.close;
        entry.volume += bar.volume;
        entry.last_updated = now;
    }

    pub fn evaluator_mut(&mut self, symbol: &str) -> Option<&mut FocusEvaluator> {
        self.evaluators.get_mut(symbol)
    }

    pub fn metrics(&self, symbol: &str) -> Option<FocusMetrics> {
        self.evaluators.get(symbol)?.metrics()
    }

    pub fn focused(&self) -> HashSet<String> {
        self.evaluators.keys().cloned().collect()
    }

    /// Top gainers by window change among fresh, liquid, active symbols,
    /// then the `top_n` of those with the most volume.
    pub fn select(&self, active: &HashSet<String>, now: DateTime<Utc>) -> Vec<String> {
        let stale = Duration::seconds(STALE_AFTER_SECS);
        let mut gainers: Vec<(&String, &Activity)> = self
            .activity
            .iter()
            .filter(|(sym, a)| {
                active.contains(*sym) && now - a.last_updated <= stale && a.volume >= MIN_WINDOW_VOLUME
            })
            .collect();
        gainers.sort_by(|a, b| b.1.change_pct().total_cmp(&a.1.change_pct()).then(a.0.cmp(b.0)));
        gainers.truncate(GAINER_CANDIDATES);
        gainers.sort_by(|a, b| b.1.volume.total_cmp(&a.1.volume).then(a.0.cmp(b.0)));
        gainers.into_iter().take(self.top_n).map(|(s, _)| s.clone()).collect()
    }

    /// Attach newly selected symbols and detach the rest once they have
    /// been held for the minimum time. Symbols that left the active set
    /// are detached immediately.
    pub fn reconcile(&mut self, active: &HashSet<String>, now: DateTime<Utc>) -> FocusChange {
        let wanted: HashSet<String> = self.select(active, now).into_iter().collect();
        let mut change = FocusChange::default();

        let mut current: Vec<String> = self.evaluators.keys().cloned().collect();
        current.sort();
        for sym in current {
            if wanted.contains(&sym) {
                continue;
            }
            let held_long_enough = self
                .evaluators
                .get(&sym)
                .map(|e| now - e.attached_at() >= self.min_hold)
                .unwrap_or(true);
            if !active.contains(&sym) || held_long_enough {
                self.evaluators.remove(&sym);
                change.detach.push(sym);
            }
        }

        let mut added: Vec<String> = wanted
            .into_iter()
            .filter(|s| !self.evaluators.contains_key(s))
            .collect();
        added.sort();
        for sym in added {
            self.evaluators.insert(sym.clone(), FocusEvaluator::new(now));
            change.attach.push(sym);
        }
        change
    }

    /// Drop an unsubscribed symbol. Returns `true` if it was focused.
    pub fn forget(&mut self, symbol: &str) -> bool {
        self.activity.remove(symbol);
        self.evaluators.remove(symbol).is_some()
    }

    /// Remove activity not updated within the TTL. Returns how many were dropped.
    pub fn collect_garbage(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.activity.len();
        let ttl = self.gc_ttl;
        self.activity.retain(|_, a| now - a.last_updated <= ttl);
        before - self.activity.len()
    }

    pub fn tracked(&self) -> usize {
        self.activity.len()
    }
}
