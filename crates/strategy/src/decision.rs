use common::{IndicatorSnapshot, RuleOutcome, Signal};

use crate::config::StrategyConfig;
use crate::indicators::RsiIndicator;

/// Momentum holds when the trend value clears both the explosion band and
/// the ATR dead zone. Both comparisons are strict.
pub fn momentum_condition(trend_value: f64, explosion_band: f64, dead_zone: f64) -> bool {
    trend_value > explosion_band && trend_value > dead_zone
}

/// Evaluates the three entry rules on a snapshot and labels the result.
#[derive(Debug, Clone)]
pub struct SignalDecisionEngine {
    cfg: StrategyConfig,
    rsi: RsiIndicator,
}

impl SignalDecisionEngine {
    pub fn new(cfg: StrategyConfig) -> Self {
        let rsi = RsiIndicator::new(cfg.rsi.period, cfg.rsi.lower, cfg.rsi.upper);
        Self { cfg, rsi }
    }

    pub fn explosion(&self, s: &IndicatorSnapshot) -> bool {
        momentum_condition(s.trend_value, s.explosion_band, s.dead_zone) && self.rsi.in_band(s.rsi)
    }

    pub fn standard(&self, s: &IndicatorSnapshot) -> bool {
        let cloud = &self.cfg.cloud;
        s.above_cloud
            && s.tk_cross_bullish
            && s.cloud_thickness_pct >= cloud.min_thickness_pct
            && (0.0..=cloud.max_distance_pct).contains(&s.cloud_distance_pct)
            && s.chikou_above
            && s.cmf > 0.0
            && s.obv_rising
            && self.rsi.in_band(s.rsi)
    }

    pub fn pre_breakout(&self, s: &IndicatorSnapshot) -> bool {
        let contracting = s.atr < s.atr_avg5 || s.squeeze;
        contracting
            && s.volume_dry
            && s.above_cloud
            && s.pump5_pct < self.cfg.pre_breakout.max_pump_pct
    }

    pub fn evaluate(&self, s: &IndicatorSnapshot) -> RuleOutcome {
        RuleOutcome {
            explosion: self.explosion(s),
            standard: self.standard(s),
            pre_breakout: self.pre_breakout(s),
        }
    }

    /// At most one signal per snapshot, labelled by rule precedence.
    pub fn decide(&self, symbol: &str, snapshot: IndicatorSnapshot) -> Option<Signal> {
        let rules = self.evaluate(&snapshot);
        let strategy = rules.label()?;
        Some(Signal::new(symbol, strategy, rules, snapshot))
    }
}
