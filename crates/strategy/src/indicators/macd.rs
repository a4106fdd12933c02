use super::ema;

/// MACD (Moving Average Convergence/Divergence) indicator.
///
/// Computes: MACD line = EMA(fast) − EMA(slow), Signal = EMA(macd_line, signal_period).
#[derive(Debug, Clone)]
pub struct MacdIndicator {
    pub fast: usize,
    pub slow: usize,
    pub signal: usize,
}

/// MACD line and its signal line, aligned with the input closes.
#[derive(Debug, Clone, PartialEq)]
pub struct MacdSeries {
    pub line: Vec<f64>,
    pub signal: Vec<f64>,
}

impl MacdIndicator {
    pub fn new(fast: usize, slow: usize, signal: usize) -> Self {
        assert!(fast < slow, "MACD fast period must be less than slow period");
        assert!(signal >= 1, "MACD signal period must be >= 1");
        Self { fast, slow, signal }
    }

    /// Bars needed before the signal line has its first value.
    pub fn warmup(&self) -> usize {
        self.slow + self.signal - 1
    }

    /// Compute the MACD series from close prices (oldest first).
    pub fn compute(&self, closes: &[f64]) -> MacdSeries {
        let fast = ema(closes, self.fast);
        let slow = ema(closes, self.slow);
        let line: Vec<f64> = fast.iter().zip(&slow).map(|(f, s)| f - s).collect();

        // The signal EMA starts where the MACD line becomes defined.
        let mut signal = vec![f64::NAN; closes.len()];
        if closes.len() >= self.slow {
            let defined = &line[self.slow - 1..];
            for (i, v) in ema(defined, self.signal).into_iter().enumerate() {
                signal[self.slow - 1 + i] = v;
            }
        }

        MacdSeries { line, signal }
    }
}
