//! Series indicators over bar history.
//!
//! Every function returns a series aligned with its input (same length,
//! oldest first). Positions without enough history hold `f64::NAN`.

pub mod atr;
pub mod bollinger;
pub mod ichimoku;
pub mod macd;
pub mod rsi;
pub mod volume;

pub use atr::AtrIndicator;
pub use bollinger::{BollingerBands, BollingerSeries};
pub use ichimoku::{Cloud, Ichimoku, IchimokuSeries};
pub use macd::{MacdIndicator, MacdSeries};
pub use rsi::RsiIndicator;
pub use volume::{chaikin_money_flow, on_balance_volume};

/// Simple moving average.
pub fn sma(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }
    let mut sum: f64 = values[..period].iter().sum();
    out[period - 1] = sum / period as f64;
    for i in period..values.len() {
        sum += values[i] - values[i - period];
        out[i] = sum / period as f64;
    }
    out
}

/// Exponential moving average seeded with the SMA of the first `period` values.
pub fn ema(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }
    let k = 2.0 / (period as f64 + 1.0);
    let mut ema_val: f64 = values[..period].iter().sum::<f64>() / period as f64;
    out[period - 1] = ema_val;
    for i in period..values.len() {
        ema_val = values[i] * k + ema_val * (1.0 - k);
        out[i] = ema_val;
    }
    out
}

/// Rolling population standard deviation.
pub fn rolling_std(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }
    for i in period - 1..values.len() {
        let window = &values[i + 1 - period..=i];
        let mean = window.iter().sum::<f64>() / period as f64;
        let var = window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / period as f64;
        out[i] = var.sqrt();
    }
    out
}

/// Midpoint of the highest high and lowest low over `period` bars.
pub fn donchian_mid(highs: &[f64], lows: &[f64], period: usize) -> Vec<f64> {
    let len = highs.len().min(lows.len());
    let mut out = vec![f64::NAN; len];
    if period == 0 || len < period {
        return out;
    }
    for i in period - 1..len {
        let hi = highs[i + 1 - period..=i].iter().copied().fold(f64::MIN, f64::max);
        let lo = lows[i + 1 - period..=i].iter().copied().fold(f64::MAX, f64::min);
        out[i] = (hi + lo) / 2.0;
    }
    out
}

/// Mean of the last `n` finite values ending at (and including) `end`.
/// Returns `None` if any of them is not finite or there are fewer than `n`.
pub fn trailing_mean(values: &[f64], end: usize, n: usize) -> Option<f64> {
    if n == 0 || end >= values.len() || end + 1 < n {
        return None;
    }
    let window = &values[end + 1 - n..=end];
    if window.iter().any(|v| !v.is_finite()) {
        return None;
    }
    Some(window.iter().sum::<f64>() / n as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sma_warmup_is_nan() {
        let out = sma(&[1.0, 2.0, 3.0, 4.0], 3);
        assert!(out[0].is_nan() && out[1].is_nan());
        assert_eq!(out[2], 2.0);
        assert_eq!(out[3], 3.0);
    }

    #[test]
    fn ema_of_constant_is_constant() {
        let out = ema(&[5.0; 10], 4);
        assert!(out[2].is_nan());
        for v in &out[3..] {
            assert!((v - 5.0).abs() < 1e-12);
        }
    }

    #[test]
    fn rolling_std_of_constant_is_zero() {
        let out = rolling_std(&[2.0; 6], 3);
        assert_eq!(out[5], 0.0);
    }

    #[test]
    fn donchian_mid_uses_extremes() {
        let highs = [10.0, 12.0, 11.0];
        let lows = [9.0, 8.0, 10.0];
        let out = donchian_mid(&highs, &lows, 2);
        assert!(out[0].is_nan());
        assert_eq!(out[1], 10.0); // (12 + 8) / 2
        assert_eq!(out[2], 10.0); // (12 + 8) / 2
    }

    #[test]
    fn trailing_mean_requires_full_window() {
        let values = [f64::NAN, 1.0, 2.0, 3.0];
        assert_eq!(trailing_mean(&values, 3, 3), Some(2.0));
        assert_eq!(trailing_mean(&values, 3, 4), None);
        assert_eq!(trailing_mean(&values, 1, 3), None);
    }
}
