use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One-minute OHLCV aggregate for a symbol.
/// Bars for a symbol are unique per `open_time` bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: String,
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// A single trade print. Only used to synthesize the still-open bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub size: f64,
}

/// Top-of-book quote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub bid: f64,
    pub bid_size: f64,
    pub ask: f64,
    pub ask_size: f64,
}

/// Granularity of an aggregate event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregateKind {
    Second,
    Minute,
}

/// A decoded upstream event.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Aggregate { kind: AggregateKind, bar: Bar },
    Trade(Tick),
    Quote(Quote),
    Status { status: String, message: String },
}

impl StreamEvent {
    pub fn symbol(&self) -> Option<&str> {
        match self {
            StreamEvent::Aggregate { bar, .. } => Some(&bar.symbol),
            StreamEvent::Trade(t) => Some(&t.symbol),
            StreamEvent::Quote(q) => Some(&q.symbol),
            StreamEvent::Status { .. } => None,
        }
    }
}

/// Which decision rule produced a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrategyType {
    Explosion,
    #[serde(rename = "Pre-Breakout")]
    PreBreakout,
    Standard,
}

impl std::fmt::Display for StrategyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StrategyType::Explosion => write!(f, "Explosion"),
            StrategyType::PreBreakout => write!(f, "Pre-Breakout"),
            StrategyType::Standard => write!(f, "Standard"),
        }
    }
}

/// Indicator values for the latest closed bar of one symbol.
///
/// Built from scratch on every evaluation and never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub bar_time: DateTime<Utc>,
    pub bar_count: usize,
    pub close: f64,
    pub volume: f64,

    // Momentum construct
    pub macd: f64,
    pub macd_prev: f64,
    pub macd_signal: f64,
    pub trend_value: f64,
    pub bb_upper: f64,
    pub bb_lower: f64,
    pub explosion_band: f64,
    pub atr: f64,
    pub atr_avg5: f64,
    pub dead_zone: f64,

    // Oscillators / volume
    pub rsi: f64,
    pub cmf: f64,
    pub obv: f64,
    pub obv_rising: bool,

    // Ichimoku
    pub tenkan: f64,
    pub kijun: f64,
    pub senkou_a: f64,
    pub senkou_b: f64,
    pub cloud_top: f64,
    pub cloud_bottom: f64,
    pub tk_cross_bullish: bool,
    pub chikou_above: bool,
    pub above_cloud: bool,
    pub cloud_thickness_pct: f64,
    pub cloud_distance_pct: f64,

    // Derived features
    pub pump5_pct: f64,
    pub pullback_pct: f64,
    pub daily_change_pct: f64,
    pub squeeze_ratio: f64,
    pub squeeze: bool,
    pub volume_avg5: f64,
    pub volume_ratio: f64,
    pub volume_dry: bool,
}

/// Result of evaluating each decision rule on one snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RuleOutcome {
    pub explosion: bool,
    pub standard: bool,
    pub pre_breakout: bool,
}

impl RuleOutcome {
    pub fn any(&self) -> bool {
        self.explosion || self.standard || self.pre_breakout
    }

    /// Label precedence: Explosion, then Pre-Breakout, then Standard.
    pub fn label(&self) -> Option<StrategyType> {
        if self.explosion {
            Some(StrategyType::Explosion)
        } else if self.pre_breakout {
            Some(StrategyType::PreBreakout)
        } else if self.standard {
            Some(StrategyType::Standard)
        } else {
            None
        }
    }
}

/// Per-tick microstructure readings for a focused symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FocusMetrics {
    pub vwap: f64,
    pub vwap_dist_pct: f64,
    pub tick_speed: usize,
    pub spread_pct: Option<f64>,
}

/// A candidate trade signal raised by the decision engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub id: String,
    pub symbol: String,
    pub price: f64,
    pub strategy: StrategyType,
    pub rules: RuleOutcome,
    pub snapshot: IndicatorSnapshot,
    pub focus: Option<FocusMetrics>,
    pub timestamp: DateTime<Utc>,
}

impl Signal {
    pub fn new(
        symbol: impl Into<String>,
        strategy: StrategyType,
        rules: RuleOutcome,
        snapshot: IndicatorSnapshot,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            symbol: symbol.into(),
            price: snapshot.close,
            strategy,
            rules,
            snapshot,
            focus: None,
            timestamp: Utc::now(),
        }
    }
}

/// A signal that has been scored and persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub symbol: String,
    pub price: f64,
    pub score: u8,
    pub strategy: StrategyType,
    pub time: DateTime<Utc>,
}

/// A registered push recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscriber {
    pub token: String,
    /// Minimum score to be alerted. `0` receives everything.
    pub min_score: i64,
}

impl Subscriber {
    pub fn accepts(&self, score: u8) -> bool {
        i64::from(score) >= self.min_score
    }
}

/// One entry of the published watch list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchedTicker {
    pub ticker: String,
    pub is_new: bool,
}

/// Process status persisted for the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchStatus {
    pub last_scan_time: String,
    pub watching_count: usize,
    pub watching_tickers: Vec<WatchedTicker>,
}
