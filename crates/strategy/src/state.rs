use std::collections::VecDeque;

use chrono::{DateTime, Duration, DurationRound, Utc};

use common::{Bar, Tick};

pub const MAX_BARS: usize = 200;
pub const MAX_TICKS: usize = 1000;

/// Bounded bar and tick history for one symbol.
///
/// Bars are kept sorted by `open_time` with at most one bar per minute
/// bucket. Ticks are kept in arrival order.
#[derive(Debug, Clone)]
pub struct SymbolState {
    symbol: String,
    bars: VecDeque<Bar>,
    ticks: VecDeque<Tick>,
    last_update: DateTime<Utc>,
}

/// Start of the one-minute bucket containing `t`.
pub fn minute_bucket(t: DateTime<Utc>) -> DateTime<Utc> {
    t.duration_trunc(Duration::minutes(1)).unwrap_or(t)
}

impl SymbolState {
    pub fn new(symbol: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.into(),
            bars: VecDeque::with_capacity(MAX_BARS + 1),
            ticks: VecDeque::with_capacity(MAX_TICKS + 1),
            last_update: now,
        }
    }

    /// State pre-filled with historical bars (any order).
    pub fn seeded(symbol: impl Into<String>, bars: Vec<Bar>, now: DateTime<Utc>) -> Self {
        let mut state = Self::new(symbol, now);
        for bar in bars {
            state.insert_bar(bar);
        }
        state
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn bars(&self) -> &VecDeque<Bar> {
        &self.bars
    }

    pub fn ticks(&self) -> &VecDeque<Tick> {
        &self.ticks
    }

    pub fn last_update(&self) -> DateTime<Utc> {
        self.last_update
    }

    /// Insert or replace the bar for its minute bucket, evicting the oldest
    /// bars beyond [`MAX_BARS`].
    pub fn apply_bar(&mut self, bar: Bar, now: DateTime<Utc>) {
        self.insert_bar(bar);
        self.last_update = now;
    }

    pub fn push_tick(&mut self, tick: Tick, now: DateTime<Utc>) {
        self.ticks.push_back(tick);
        while self.ticks.len() > MAX_TICKS {
            self.ticks.pop_front();
        }
        self.last_update = now;
    }

    fn insert_bar(&mut self, mut bar: Bar) {
        bar.open_time = minute_bucket(bar.open_time);
        match self.bars.binary_search_by(|b| b.open_time.cmp(&bar.open_time)) {
            Ok(i) => self.bars[i] = bar,
            Err(i) => self.bars.insert(i, bar),
        }
        while self.bars.len() > MAX_BARS {
            self.bars.pop_front();
        }
    }

    /// One-row-per-minute view of the history used for indicator evaluation.
    ///
    /// Spans every stored bar, so filled minutes can make it longer than
    /// [`MAX_BARS`]. Non-finite fields are forward- then back-filled, missing minutes are
    /// filled with flat zero-volume bars at the previous close, and ticks
    /// newer than the last closed bar are folded into it.
    pub fn evaluation_frame(&self) -> Vec<Bar> {
        let mut bars: Vec<Bar> = self.bars.iter().cloned().collect();
        if bars.is_empty() {
            return bars;
        }
        sanitize(&mut bars);

        let step = Duration::minutes(1);
        let mut frame: Vec<Bar> = Vec::with_capacity(bars.len());
        for bar in bars {
            if let Some(prev) = frame.last() {
                let mut t = prev.open_time + step;
                let fill_close = prev.close;
                while t < bar.open_time {
                    frame.push(Bar {
                        symbol: bar.symbol.clone(),
                        open_time: t,
                        open: fill_close,
                        high: fill_close,
                        low: fill_close,
                        close: fill_close,
                        volume: 0.0,
                    });
                    t += step;
                }
            }
            frame.push(bar);
        }

        if let Some(last) = frame.last_mut() {
            let cutoff = last.open_time + step;
            let live: Vec<&Tick> = self
                .ticks
                .iter()
                .filter(|t| t.timestamp >= cutoff && t.price.is_finite() && t.size.is_finite())
                .collect();
            if let Some(latest) = live.last() {
                for t in &live {
                    last.high = last.high.max(t.price);
                    last.low = last.low.min(t.price);
                    last.volume += t.size;
                }
                last.close = latest.price;
            }
        }
        frame
    }

    /// Percent change from the first open to the last close in the window.
    pub fn window_change_pct(&self) -> Option<f64> {
        let first = self.bars.front()?.open;
        let last = self.bars.back()?.close;
        (first > 0.0).then(|| (last - first) / first * 100.0)
    }
}

fn field_mut(bar: &mut Bar, idx: usize) -> &mut f64 {
    match idx {
        0 => &mut bar.open,
        1 => &mut bar.high,
        2 => &mut bar.low,
        3 => &mut bar.close,
        _ => &mut bar.volume,
    }
}

fn sanitize(bars: &mut [Bar]) {
    for idx in 0..5 {
        let mut last: Option<f64> = None;
        for bar in bars.iter_mut() {
            let v = field_mut(bar, idx);
            if v.is_finite() {
                last = Some(*v);
            } else if let Some(prev) = last {
                *v = prev;
            }
        }
        let mut next: Option<f64> = None;
        for bar in bars.iter_mut().rev() {
            let v = field_mut(bar, idx);
            if v.is_finite() {
                next = Some(*v);
            } else if let Some(n) = next {
                *v = n;
            }
        }
    }
}
