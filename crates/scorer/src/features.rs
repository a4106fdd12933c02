use serde::Serialize;

use common::{FocusMetrics, MarketSession, Signal, StrategyType};

/// The derived features the scorer sees for one signal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureSnapshot {
    pub session_type: MarketSession,
    pub strategy: StrategyType,
    pub price: f64,
    pub volume_ratio: f64,
    pub pump: f64,
    pub pullback: f64,
    pub daily_change: f64,
    pub squeeze: f64,
    pub volume_dry: bool,
    pub explosion_pass: bool,
    pub standard_pass: bool,
    pub pre_breakout_pass: bool,
    pub rsi: f64,
    pub cmf: f64,
    pub cloud_distance: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focus: Option<FocusMetrics>,
}

impl FeatureSnapshot {
    pub fn from_signal(signal: &Signal, session: MarketSession) -> Self {
        let s = &signal.snapshot;
        Self {
            session_type: session,
            strategy: signal.strategy,
            price: signal.price,
            volume_ratio: round2(s.volume_ratio),
            pump: round2(s.pump5_pct),
            pullback: round2(s.pullback_pct),
            daily_change: round2(s.daily_change_pct),
            squeeze: round2(s.squeeze_ratio),
            volume_dry: s.volume_dry,
            explosion_pass: signal.rules.explosion,
            standard_pass: signal.rules.standard,
            pre_breakout_pass: signal.rules.pre_breakout,
            rsi: round2(s.rsi),
            cmf: round2(s.cmf),
            cloud_distance: round2(s.cloud_distance_pct),
            focus: signal.focus.clone(),
        }
    }
}

fn round2(v: f64) -> f64 {
    if v.is_finite() {
        (v * 100.0).round() / 100.0
    } else {
        0.0
    }
}

const INSTRUCTIONS: &str = r#"You rate intraday long setups on low-priced US equities.
Estimate the probability (0-100) that the price gains at least 3% within the next 10 minutes.

How to read the features:
- volume_ratio: current volume over the recent average. Above 1.5 confirms participation.
- pump: percent move over the last 5 bars. 2 to 5 is healthy, above 10 is chasing.
- pullback: percent below the window high. Under 5 is required, 0 to 2 is ideal.
- squeeze: Bollinger width over its average. Below 1 means the range is compressing.
- volume_dry: true when volume has dried up ahead of a possible breakout.
- rsi, cmf, cloud_distance: momentum, money flow and distance above the Ichimoku cloud.
- *_pass: which rule families fired on this bar.
- focus (optional): vwap, vwap_dist_pct, tick_speed and spread_pct from live ticks.

Scoring guide:
- 90-99: textbook setup with strong volume, tight pullback and compression.
- 80-89: strong momentum with volume behind it.
- 60-79: acceptable but late or thin.
- 0-59: weak volume, deep pullback or an exhausted move.

Respond ONLY with JSON:
{"probability_score": <int>, "reasoning": "<one or two sentences>"}"#;

/// Full prompt text for one signal.
pub fn build_prompt(symbol: &str, features: &FeatureSnapshot) -> serde_json::Result<String> {
    let body = serde_json::to_string_pretty(features)?;
    Ok(format!(
        "{INSTRUCTIONS}\n\nTicker: {symbol}\nSession: {}\nVolume ratio: {}\n\nFeatures:\n{body}\n",
        features.session_type, features.volume_ratio
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{IndicatorSnapshot, RuleOutcome};

    fn signal() -> Signal {
        let snapshot = IndicatorSnapshot {
            close: 4.2,
            volume_ratio: 2.346,
            pump5_pct: 3.21,
            pullback_pct: f64::NAN,
            rsi: 61.0,
            ..Default::default()
        };
        let rules = RuleOutcome { standard: true, ..Default::default() };
        Signal::new("ABC", StrategyType::Standard, rules, snapshot)
    }

    #[test]
    fn features_follow_the_signal() {
        let f = FeatureSnapshot::from_signal(&signal(), MarketSession::Premarket);
        assert_eq!(f.volume_ratio, 2.35);
        assert_eq!(f.pump, 3.21);
        assert_eq!(f.pullback, 0.0);
        assert!(f.standard_pass && !f.explosion_pass);

        let json = serde_json::to_value(&f).unwrap();
        assert_eq!(json["session_type"], "premarket");
        assert_eq!(json["strategy"], "Standard");
        assert!(json.get("focus").is_none());
    }

    #[test]
    fn prompt_carries_ticker_and_features() {
        let f = FeatureSnapshot::from_signal(&signal(), MarketSession::Regular);
        let prompt = build_prompt("ABC", &f).unwrap();
        assert!(prompt.contains("Ticker: ABC"));
        assert!(prompt.contains("Session: regular"));
        assert!(prompt.contains("\"rsi\": 61.0"));
        assert!(prompt.contains("probability_score"));
    }
}
