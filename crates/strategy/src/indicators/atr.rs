/// Average True Range with Wilder smoothing, seeded by the SMA of the first
/// `period` true ranges.
#[derive(Debug, Clone)]
pub struct AtrIndicator {
    pub period: usize,
}

impl AtrIndicator {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "ATR period must be >= 1");
        Self { period }
    }

    /// True range per bar. The first bar has no previous close and uses
    /// `high - low`.
    pub fn true_range(highs: &[f64], lows: &[f64], closes: &[f64]) -> Vec<f64> {
        let len = highs.len().min(lows.len()).min(closes.len());
        (0..len)
            .map(|i| {
                let hl = highs[i] - lows[i];
                if i == 0 {
                    hl
                } else {
                    let prev = closes[i - 1];
                    hl.max((highs[i] - prev).abs()).max((lows[i] - prev).abs())
                }
            })
            .collect()
    }

    pub fn compute(&self, highs: &[f64], lows: &[f64], closes: &[f64]) -> Vec<f64> {
        let tr = Self::true_range(highs, lows, closes);
        let mut out = vec![f64::NAN; tr.len()];
        if tr.len() < self.period {
            return out;
        }
        let p = self.period as f64;
        let mut atr = tr[..self.period].iter().sum::<f64>() / p;
        out[self.period - 1] = atr;
        for i in self.period..tr.len() {
            atr = (atr * (p - 1.0) + tr[i]) / p;
            out[i] = atr;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn true_range_uses_gaps_from_previous_close() {
        let highs = [10.0, 12.0];
        let lows = [9.0, 11.5];
        let closes = [9.5, 12.0];
        let tr = AtrIndicator::true_range(&highs, &lows, &closes);
        assert_eq!(tr, vec![1.0, 2.5]);
    }

    #[test]
    fn atr_of_constant_range_is_that_range() {
        let highs = vec![11.0; 12];
        let lows = vec![10.0; 12];
        let closes = vec![10.5; 12];
        let atr = AtrIndicator::new(5).compute(&highs, &lows, &closes);
        assert!(atr[3].is_nan());
        for v in &atr[4..] {
            assert!((v - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn atr_short_input_is_all_nan() {
        let atr = AtrIndicator::new(5).compute(&[1.0; 3], &[0.5; 3], &[0.7; 3]);
        assert!(atr.iter().all(|v| v.is_nan()));
    }
}
