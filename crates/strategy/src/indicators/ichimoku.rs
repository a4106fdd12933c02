use super::donchian_mid;

/// Ichimoku Kinko Hyo with configurable (short) lookbacks.
///
/// Leading spans are stored unshifted: the cloud that applies to bar `i` is
/// built from the spans at `i - displacement`.
#[derive(Debug, Clone)]
pub struct Ichimoku {
    pub tenkan: usize,
    pub kijun: usize,
    pub senkou_b: usize,
    pub displacement: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IchimokuSeries {
    pub tenkan: Vec<f64>,
    pub kijun: Vec<f64>,
    pub span_a: Vec<f64>,
    pub span_b: Vec<f64>,
    pub displacement: usize,
}

/// Cloud boundaries in effect at one bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cloud {
    pub span_a: f64,
    pub span_b: f64,
}

impl Cloud {
    pub fn top(&self) -> f64 {
        self.span_a.max(self.span_b)
    }

    pub fn bottom(&self) -> f64 {
        self.span_a.min(self.span_b)
    }
}

impl Ichimoku {
    /// Displacement defaults to the kijun period.
    pub fn new(tenkan: usize, kijun: usize, senkou_b: usize) -> Self {
        assert!(tenkan >= 1 && kijun >= 1 && senkou_b >= 1, "Ichimoku periods must be >= 1");
        Self { tenkan, kijun, senkou_b, displacement: kijun }
    }

    pub fn compute(&self, highs: &[f64], lows: &[f64]) -> IchimokuSeries {
        let tenkan = donchian_mid(highs, lows, self.tenkan);
        let kijun = donchian_mid(highs, lows, self.kijun);
        let span_a = tenkan.iter().zip(&kijun).map(|(t, k)| (t + k) / 2.0).collect();
        let span_b = donchian_mid(highs, lows, self.senkou_b);
        IchimokuSeries { tenkan, kijun, span_a, span_b, displacement: self.displacement }
    }
}

impl IchimokuSeries {
    /// Cloud projected onto bar `i`, or `None` while either span is undefined.
    pub fn cloud_at(&self, i: usize) -> Option<Cloud> {
        let src = i.checked_sub(self.displacement)?;
        let a = *self.span_a.get(src)?;
        let b = *self.span_b.get(src)?;
        (a.is_finite() && b.is_finite()).then_some(Cloud { span_a: a, span_b: b })
    }

    /// Tenkan crossed above kijun between bar `i - 1` and bar `i`.
    pub fn bullish_cross_at(&self, i: usize) -> bool {
        if i == 0 || i >= self.tenkan.len() {
            return false;
        }
        let (t0, k0, t1, k1) = (self.tenkan[i - 1], self.kijun[i - 1], self.tenkan[i], self.kijun[i]);
        [t0, k0, t1, k1].iter().all(|v| v.is_finite()) && t0 <= k0 && t1 > k1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cloud_is_displaced_by_kijun_period() {
        let highs: Vec<f64> = (0..10).map(|i| 10.0 + i as f64).collect();
        let lows: Vec<f64> = highs.iter().map(|h| h - 1.0).collect();
        let ich = Ichimoku::new(2, 3, 5);
        let series = ich.compute(&highs, &lows);

        // span_b first defined at index 4, so the cloud starts at 4 + 3.
        assert!(series.cloud_at(6).is_none());
        let cloud = series.cloud_at(7).unwrap();
        assert_eq!(cloud.span_a, series.span_a[4]);
        assert_eq!(cloud.span_b, series.span_b[4]);
        assert!(cloud.top() >= cloud.bottom());
    }

    #[test]
    fn detects_bullish_cross() {
        let series = IchimokuSeries {
            tenkan: vec![9.0, 10.0, 11.0],
            kijun: vec![10.0, 10.0, 10.5],
            span_a: vec![],
            span_b: vec![],
            displacement: 3,
        };
        assert!(!series.bullish_cross_at(1));
        assert!(series.bullish_cross_at(2));
        assert!(!series.bullish_cross_at(0));
    }
}
