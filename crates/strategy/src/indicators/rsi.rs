/// RSI (Relative Strength Index) with Wilder smoothing.
///
/// `band` is the open interval a reading must fall inside for the
/// momentum and cloud rules to accept it.
#[derive(Debug, Clone)]
pub struct RsiIndicator {
    pub period: usize,
    pub band: (f64, f64),
}

impl RsiIndicator {
    pub fn new(period: usize, lower: f64, upper: f64) -> Self {
        assert!(period >= 2, "RSI period must be >= 2");
        assert!(lower < upper, "RSI band must be non-empty");
        Self { period, band: (lower, upper) }
    }

    /// RSI of the last close. `None` with fewer than `period + 1` closes
    /// or when any close is not finite.
    pub fn compute(&self, closes: &[f64]) -> Option<f64> {
        if closes.len() < self.period + 1 || closes.iter().any(|c| !c.is_finite()) {
            return None;
        }

        let changes: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();
        let initial = &changes[..self.period];

        let mut avg_gain = initial.iter().filter(|&&c| c > 0.0).sum::<f64>() / self.period as f64;
        let mut avg_loss = initial.iter().filter(|&&c| c < 0.0).map(|c| c.abs()).sum::<f64>()
            / self.period as f64;

        for &change in &changes[self.period..] {
            let gain = change.max(0.0);
            let loss = (-change).max(0.0);
            avg_gain = (avg_gain * (self.period - 1) as f64 + gain) / self.period as f64;
            avg_loss = (avg_loss * (self.period - 1) as f64 + loss) / self.period as f64;
        }

        if avg_loss == 0.0 {
            // Flat series reads as neutral rather than overbought.
            return Some(if avg_gain == 0.0 { 50.0 } else { 100.0 });
        }

        let rs = avg_gain / avg_loss;
        Some(100.0 - 100.0 / (1.0 + rs))
    }

    /// Strictly inside the configured band.
    pub fn in_band(&self, value: f64) -> bool {
        value > self.band.0 && value < self.band.1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rsi_returns_none_when_insufficient_data() {
        let rsi = RsiIndicator::new(5, 40.0, 70.0);
        let prices = vec![100.0; 5];
        assert!(rsi.compute(&prices).is_none());
    }

    #[test]
    fn rsi_returns_some_with_exactly_period_plus_one() {
        let rsi = RsiIndicator::new(5, 40.0, 70.0);
        let prices: Vec<f64> = (0..6).map(|i| 100.0 + i as f64).collect();
        assert!(rsi.compute(&prices).is_some());
    }

    #[test]
    fn rsi_all_gains_returns_100() {
        let rsi = RsiIndicator::new(3, 40.0, 70.0);
        let value = rsi.compute(&[10.0, 11.0, 12.0, 13.0, 14.0]).unwrap();
        assert!((value - 100.0).abs() < 1e-6, "Expected ~100, got {value}");
    }

    #[test]
    fn rsi_all_losses_returns_0() {
        let rsi = RsiIndicator::new(3, 40.0, 70.0);
        let value = rsi.compute(&[14.0, 13.0, 12.0, 11.0, 10.0]).unwrap();
        assert!(value.abs() < 1e-6, "Expected ~0, got {value}");
    }

    #[test]
    fn rsi_flat_series_is_neutral() {
        let rsi = RsiIndicator::new(3, 40.0, 70.0);
        assert_eq!(rsi.compute(&[5.0; 8]), Some(50.0));
    }

    #[test]
    fn zig_zag_uptrend_reads_between_extremes() {
        let rsi = RsiIndicator::new(5, 40.0, 70.0);
        let closes: Vec<f64> = (0..16)
            .map(|i| 2.0 + 0.05 * i as f64 + if i % 2 == 0 { 0.04 } else { -0.04 })
            .collect();
        let v = rsi.compute(&closes).unwrap();
        assert!(v > 50.0 && v < 100.0, "unexpected RSI {v}");
    }

    #[test]
    fn rsi_rejects_non_finite_input() {
        let rsi = RsiIndicator::new(3, 40.0, 70.0);
        assert!(rsi.compute(&[1.0, f64::NAN, 2.0, 3.0, 4.0]).is_none());
    }

    #[test]
    fn band_is_exclusive() {
        let rsi = RsiIndicator::new(5, 40.0, 70.0);
        assert!(!rsi.in_band(40.0));
        assert!(rsi.in_band(40.01));
        assert!(rsi.in_band(69.99));
        assert!(!rsi.in_band(70.0));
    }
}
