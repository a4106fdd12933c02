use serde::{Deserialize, Serialize};

use common::{Error, Result};

/// Indicator and rule tuning constants (TOML).
///
/// Every section and field is optional; omitted values keep their defaults.
///
/// Example `config/strategy.toml`:
/// ```toml
/// [momentum]
/// sensitivity = 150.0
///
/// [rsi]
/// period = 5
/// lower = 40.0
/// upper = 70.0
///
/// [cloud]
/// min_thickness_pct = 0.5
/// max_distance_pct = 20.0
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct StrategyConfig {
    pub momentum: MomentumParams,
    pub squeeze: BandParams,
    pub rsi: RsiParams,
    pub ichimoku: IchimokuParams,
    pub cloud: CloudParams,
    pub volume: VolumeParams,
    pub pre_breakout: PreBreakoutParams,
    /// Bars required before any evaluation runs. The effective minimum is
    /// the larger of this and `ichimoku.warmup`.
    pub min_bars: usize,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct MomentumParams {
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub sensitivity: f64,
    pub bb_period: usize,
    pub bb_mult: f64,
    pub atr_period: usize,
    pub atr_mult: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct BandParams {
    pub period: usize,
    pub mult: f64,
    /// Window for the rolling mean of band width.
    pub width_window: usize,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct RsiParams {
    pub period: usize,
    pub lower: f64,
    pub upper: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct IchimokuParams {
    pub tenkan: usize,
    pub kijun: usize,
    pub senkou_b: usize,
    pub warmup: usize,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CloudParams {
    pub min_thickness_pct: f64,
    pub max_distance_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct VolumeParams {
    pub cmf_period: usize,
    pub obv_lookback: usize,
    pub dry_factor: f64,
    pub dry_window: usize,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PreBreakoutParams {
    pub max_pump_pct: f64,
    pub atr_avg_window: usize,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            momentum: MomentumParams::default(),
            squeeze: BandParams::default(),
            rsi: RsiParams::default(),
            ichimoku: IchimokuParams::default(),
            cloud: CloudParams::default(),
            volume: VolumeParams::default(),
            pre_breakout: PreBreakoutParams::default(),
            min_bars: 20,
        }
    }
}

impl Default for MomentumParams {
    fn default() -> Self {
        Self {
            macd_fast: 2,
            macd_slow: 3,
            macd_signal: 4,
            sensitivity: 150.0,
            bb_period: 5,
            bb_mult: 1.5,
            atr_period: 5,
            atr_mult: 1.5,
        }
    }
}

impl Default for BandParams {
    fn default() -> Self {
        Self { period: 20, mult: 2.0, width_window: 20 }
    }
}

impl Default for RsiParams {
    fn default() -> Self {
        Self { period: 5, lower: 40.0, upper: 70.0 }
    }
}

impl Default for IchimokuParams {
    fn default() -> Self {
        Self { tenkan: 2, kijun: 3, senkou_b: 5, warmup: 52 }
    }
}

impl Default for CloudParams {
    fn default() -> Self {
        Self { min_thickness_pct: 0.5, max_distance_pct: 20.0 }
    }
}

impl Default for VolumeParams {
    fn default() -> Self {
        Self { cmf_period: 5, obv_lookback: 3, dry_factor: 0.7, dry_window: 5 }
    }
}

impl Default for PreBreakoutParams {
    fn default() -> Self {
        Self { max_pump_pct: 2.0, atr_avg_window: 5 }
    }
}

impl StrategyConfig {
    /// Load from a TOML file, or defaults when no path is given.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read strategy config at '{path}': {e}")))?;
        Self::from_toml(&content)
            .map_err(|e| Error::Config(format!("Invalid strategy config at '{path}': {e}")))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Effective minimum history before indicators are computed.
    pub fn required_bars(&self) -> usize {
        self.min_bars.max(self.ichimoku.warmup)
    }

    pub fn validate(&self) -> Result<()> {
        let m = &self.momentum;
        if m.macd_fast == 0 || m.macd_fast >= m.macd_slow || m.macd_signal == 0 {
            return Err(Error::Config("momentum: require 0 < macd_fast < macd_slow and macd_signal > 0".into()));
        }
        if m.bb_period < 2 || self.squeeze.period < 2 || self.squeeze.width_window == 0 {
            return Err(Error::Config("band periods must be >= 2".into()));
        }
        if m.atr_period == 0 || self.pre_breakout.atr_avg_window == 0 {
            return Err(Error::Config("ATR windows must be > 0".into()));
        }
        if self.rsi.period < 2 || self.rsi.lower >= self.rsi.upper {
            return Err(Error::Config("rsi: require period >= 2 and lower < upper".into()));
        }
        let i = &self.ichimoku;
        if i.tenkan == 0 || i.kijun == 0 || i.senkou_b == 0 {
            return Err(Error::Config("ichimoku periods must be > 0".into()));
        }
        let v = &self.volume;
        if v.cmf_period == 0 || v.obv_lookback == 0 || v.dry_window == 0 {
            return Err(Error::Config("volume windows must be > 0".into()));
        }
        Ok(())
    }
}
