use common::{Bar, Error, IndicatorSnapshot, Result};

use crate::config::StrategyConfig;
use crate::indicators::{
    chaikin_money_flow, on_balance_volume, trailing_mean, AtrIndicator, BollingerBands, Ichimoku,
    MacdIndicator, RsiIndicator,
};

/// Computes the fixed indicator set for the last bar of an evaluation frame.
#[derive(Debug, Clone)]
pub struct IndicatorEngine {
    cfg: StrategyConfig,
    macd: MacdIndicator,
    momentum_bb: BollingerBands,
    squeeze_bb: BollingerBands,
    atr: AtrIndicator,
    rsi: RsiIndicator,
    ichimoku: Ichimoku,
}

impl IndicatorEngine {
    pub fn new(cfg: StrategyConfig) -> Self {
        let m = &cfg.momentum;
        Self {
            macd: MacdIndicator::new(m.macd_fast, m.macd_slow, m.macd_signal),
            momentum_bb: BollingerBands::new(m.bb_period, m.bb_mult),
            squeeze_bb: BollingerBands::new(cfg.squeeze.period, cfg.squeeze.mult),
            atr: AtrIndicator::new(m.atr_period),
            rsi: RsiIndicator::new(cfg.rsi.period, cfg.rsi.lower, cfg.rsi.upper),
            ichimoku: Ichimoku::new(cfg.ichimoku.tenkan, cfg.ichimoku.kijun, cfg.ichimoku.senkou_b),
            cfg,
        }
    }

    /// Snapshot of the last bar in `frame` (sorted, one bar per minute).
    ///
    /// Returns [`Error::InsufficientData`] below the required history and
    /// [`Error::Indicator`] when a value the rules depend on is undefined.
    pub fn snapshot(&self, frame: &[Bar]) -> Result<IndicatorSnapshot> {
        let need = self.cfg.required_bars().max(2);
        if frame.len() < need {
            return Err(Error::InsufficientData { have: frame.len(), need });
        }

        let n = frame.len();
        let last = n - 1;
        let opens: Vec<f64> = frame.iter().map(|b| b.open).collect();
        let highs: Vec<f64> = frame.iter().map(|b| b.high).collect();
        let lows: Vec<f64> = frame.iter().map(|b| b.low).collect();
        let closes: Vec<f64> = frame.iter().map(|b| b.close).collect();
        let volumes: Vec<f64> = frame.iter().map(|b| b.volume).collect();
        let close = closes[last];
        let volume = volumes[last];

        // Momentum construct
        let macd = self.macd.compute(&closes);
        let macd_now = finite("macd", macd.line[last])?;
        let macd_prev = finite("macd_prev", macd.line[last - 1])?;
        let macd_signal = finite("macd_signal", macd.signal[last])?;
        let trend_value = (macd_now - macd_prev) * self.cfg.momentum.sensitivity;

        let bb = self.momentum_bb.compute(&closes);
        let bb_upper = finite("bb_upper", bb.upper[last])?;
        let bb_lower = finite("bb_lower", bb.lower[last])?;

        let atr_series = self.atr.compute(&highs, &lows, &closes);
        let atr = finite("atr", atr_series[last])?;
        let atr_avg5 = trailing_mean(&atr_series, last, self.cfg.pre_breakout.atr_avg_window)
            .ok_or_else(|| Error::Indicator("atr average undefined".into()))?;

        // Oscillators and volume
        let rsi = self
            .rsi
            .compute(&closes)
            .ok_or_else(|| Error::Indicator("rsi undefined".into()))?;
        let cmf = finite(
            "cmf",
            chaikin_money_flow(&highs, &lows, &closes, &volumes, self.cfg.volume.cmf_period)[last],
        )?;
        let obv_series = on_balance_volume(&closes, &volumes);
        let lookback = self.cfg.volume.obv_lookback;
        let obv = obv_series[last];
        let obv_rising = last >= lookback && obv > obv_series[last - lookback];

        // Ichimoku
        let ich = self.ichimoku.compute(&highs, &lows);
        let tenkan = finite("tenkan", ich.tenkan[last])?;
        let kijun = finite("kijun", ich.kijun[last])?;
        let cloud = ich
            .cloud_at(last)
            .ok_or_else(|| Error::Indicator("ichimoku cloud undefined".into()))?;
        let (cloud_top, cloud_bottom) = (cloud.top(), cloud.bottom());
        let displacement = ich.displacement;
        let chikou_above = last >= displacement && close > closes[last - displacement];
        let above_cloud = close > cloud_top;
        let (cloud_thickness_pct, cloud_distance_pct) = if close > 0.0 {
            (
                (cloud.span_a - cloud.span_b).abs() / close * 100.0,
                (close - cloud_top) / close * 100.0,
            )
        } else {
            (0.0, 0.0)
        };

        // Derived features
        let pump5_pct = pct_change(closes[last.saturating_sub(5)], close);
        let max_high = highs.iter().copied().fold(f64::MIN, f64::max);
        let pullback_pct = if max_high > 0.0 { (max_high - close) * 100.0 / max_high } else { 0.0 };
        let daily_change_pct = pct_change(opens[0], close);

        let squeeze = self.squeeze_bb.compute(&closes);
        let widths = squeeze.width(&closes);
        let width_now = widths[last];
        let squeeze_ratio = match trailing_mean(&widths, last, self.cfg.squeeze.width_window) {
            Some(avg) if avg > 0.0 && width_now.is_finite() => width_now / avg,
            _ => 1.0,
        };

        let dry_window = self.cfg.volume.dry_window;
        let volume_avg5 = if last >= dry_window {
            volumes[last - dry_window..last].iter().sum::<f64>() / dry_window as f64
        } else {
            0.0
        };
        let (volume_ratio, volume_dry) = if volume_avg5 > 0.0 {
            (volume / volume_avg5, volume < self.cfg.volume.dry_factor * volume_avg5)
        } else {
            (0.0, false)
        };

        Ok(IndicatorSnapshot {
            bar_time: frame[last].open_time,
            bar_count: n,
            close,
            volume,
            macd: macd_now,
            macd_prev,
            macd_signal,
            trend_value,
            bb_upper,
            bb_lower,
            explosion_band: bb_upper - bb_lower,
            atr,
            atr_avg5,
            dead_zone: atr * self.cfg.momentum.atr_mult,
            rsi,
            cmf,
            obv,
            obv_rising,
            tenkan,
            kijun,
            senkou_a: cloud.span_a,
            senkou_b: cloud.span_b,
            cloud_top,
            cloud_bottom,
            tk_cross_bullish: ich.bullish_cross_at(last),
            chikou_above,
            above_cloud,
            cloud_thickness_pct,
            cloud_distance_pct,
            pump5_pct,
            pullback_pct,
            daily_change_pct,
            squeeze_ratio,
            squeeze: squeeze_ratio < 1.0,
            volume_avg5,
            volume_ratio,
            volume_dry,
        })
    }
}

fn finite(name: &str, v: f64) -> Result<f64> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(Error::Indicator(format!("{name} undefined")))
    }
}

fn pct_change(from: f64, to: f64) -> f64 {
    if from > 0.0 {
        (to - from) / from * 100.0
    } else {
        0.0
    }
}
