/// Chaikin Money Flow over `period` bars.
///
/// A bar with `high == low` contributes zero money-flow volume. A window with
/// zero total volume yields `0.0`.
pub fn chaikin_money_flow(
    highs: &[f64],
    lows: &[f64],
    closes: &[f64],
    volumes: &[f64],
    period: usize,
) -> Vec<f64> {
    let len = highs.len().min(lows.len()).min(closes.len()).min(volumes.len());
    let mut out = vec![f64::NAN; len];
    if period == 0 || len < period {
        return out;
    }

    let mfv: Vec<f64> = (0..len)
        .map(|i| {
            let range = highs[i] - lows[i];
            if range == 0.0 {
                0.0
            } else {
                ((closes[i] - lows[i]) - (highs[i] - closes[i])) / range * volumes[i]
            }
        })
        .collect();

    for i in period - 1..len {
        let flow: f64 = mfv[i + 1 - period..=i].iter().sum();
        let vol: f64 = volumes[i + 1 - period..=i].iter().sum();
        out[i] = if vol == 0.0 { 0.0 } else { flow / vol };
    }
    out
}

/// Cumulative On-Balance Volume, starting at zero on the first bar.
pub fn on_balance_volume(closes: &[f64], volumes: &[f64]) -> Vec<f64> {
    let len = closes.len().min(volumes.len());
    let mut out = Vec::with_capacity(len);
    let mut obv = 0.0;
    for i in 0..len {
        if i > 0 {
            if closes[i] > closes[i - 1] {
                obv += volumes[i];
            } else if closes[i] < closes[i - 1] {
                obv -= volumes[i];
            }
        }
        out.push(obv);
    }
    out
}
