use super::{rolling_std, sma};

/// Bollinger Bands: SMA(period) ± mult × population standard deviation.
#[derive(Debug, Clone)]
pub struct BollingerBands {
    pub period: usize,
    pub mult: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BollingerSeries {
    pub mid: Vec<f64>,
    pub upper: Vec<f64>,
    pub lower: Vec<f64>,
}

impl BollingerSeries {
    /// Band width normalised by price: `(upper - lower) / close`.
    pub fn width(&self, closes: &[f64]) -> Vec<f64> {
        self.upper
            .iter()
            .zip(&self.lower)
            .zip(closes)
            .map(|((u, l), c)| if *c != 0.0 { (u - l) / c } else { f64::NAN })
            .collect()
    }
}

impl BollingerBands {
    pub fn new(period: usize, mult: f64) -> Self {
        assert!(period >= 2, "Bollinger period must be >= 2");
        Self { period, mult }
    }

    pub fn compute(&self, closes: &[f64]) -> BollingerSeries {
        let mid = sma(closes, self.period);
        let std = rolling_std(closes, self.period);
        let upper = mid.iter().zip(&std).map(|(m, s)| m + self.mult * s).collect();
        let lower = mid.iter().zip(&std).map(|(m, s)| m - self.mult * s).collect();
        BollingerSeries { mid, upper, lower }
    }
}
