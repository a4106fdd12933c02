use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;

use common::{AggregateKind, Bar, StreamEvent, Tick};
use strategy::{IndicatorEngine, RegistrySettings, StateRegistry, StrategyConfig, SymbolState, MAX_BARS, MAX_TICKS};

#[derive(Debug, Clone)]
enum Update {
    Bar { minute: i64, close: f64, volume: f64 },
    Tick { secs: i64, price: f64, size: f64 },
}

fn update() -> impl Strategy<Value = Update> {
    prop_oneof![
        (0i64..600, 0.01f64..500.0, 0.0f64..1e7)
            .prop_map(|(minute, close, volume)| Update::Bar { minute, close, volume }),
        (0i64..36_000, 0.01f64..500.0, 0.0f64..1e5)
            .prop_map(|(secs, price, size)| Update::Tick { secs, price, size }),
    ]
}

fn price() -> impl Strategy<Value = f64> {
    prop_oneof![
        8 => 0.01f64..1000.0,
        1 => Just(0.0),
        1 => Just(f64::NAN),
    ]
}

proptest! {
    /// Bar and tick buffers stay bounded after any sequence of updates.
    #[test]
    fn history_never_exceeds_bounds(updates in prop::collection::vec(update(), 0..2500)) {
        let t0 = Utc.with_ymd_and_hms(2026, 3, 2, 13, 0, 0).unwrap();
        let mut state = SymbolState::new("ABC", t0);
        for u in updates {
            match u {
                Update::Bar { minute, close, volume } => state.apply_bar(
                    Bar {
                        symbol: "ABC".into(),
                        open_time: t0 + Duration::minutes(minute),
                        open: close,
                        high: close,
                        low: close,
                        close,
                        volume,
                    },
                    t0,
                ),
                Update::Tick { secs, price, size } => state.push_tick(
                    Tick { symbol: "ABC".into(), timestamp: t0 + Duration::seconds(secs), price, size },
                    t0,
                ),
            }
            prop_assert!(state.bars().len() <= MAX_BARS);
            prop_assert!(state.ticks().len() <= MAX_TICKS);
        }
        let frame = state.evaluation_frame();
        prop_assert!(frame.len() >= state.bars().len());
        prop_assert_eq!(frame.first().map(|b| b.open_time), state.bars().front().map(|b| b.open_time));
        prop_assert_eq!(frame.last().map(|b| b.open_time), state.bars().back().map(|b| b.open_time));
        prop_assert!(frame.windows(2).all(|w| w[1].open_time - w[0].open_time == Duration::minutes(1)));
    }

    /// Snapshots never panic, and below the required history they always
    /// report insufficient data.
    #[test]
    fn snapshot_never_panics(
        closes in prop::collection::vec(price(), 0..120),
        volumes in prop::collection::vec(0.0f64..1e6, 120),
    ) {
        let t0 = Utc.with_ymd_and_hms(2026, 3, 2, 13, 0, 0).unwrap();
        let bars: Vec<Bar> = closes
            .iter()
            .zip(&volumes)
            .enumerate()
            .map(|(i, (&c, &v))| Bar {
                symbol: "ABC".into(),
                open_time: t0 + Duration::minutes(i as i64),
                open: c,
                high: c * 1.01,
                low: c * 0.99,
                close: c,
                volume: v,
            })
            .collect();
        let cfg = StrategyConfig::default();
        let need = cfg.required_bars();
        let engine = IndicatorEngine::new(cfg.clone());
        let result = engine.snapshot(&bars);
        if bars.len() < need {
            let insufficient = matches!(result, Err(common::Error::InsufficientData { .. }));
            prop_assert!(insufficient, "short history must be reported as insufficient");
        }

        let mut registry = StateRegistry::new(cfg, RegistrySettings::default());
        registry.attach("ABC", bars.clone(), t0);
        if let Some(last) = bars.last() {
            let mut next = last.clone();
            next.open_time += Duration::minutes(1);
            let _ = registry.apply(StreamEvent::Aggregate { kind: AggregateKind::Minute, bar: next }, t0);
        }
        prop_assert!(registry.get("ABC").map(|s| s.bars().len() <= MAX_BARS).unwrap_or(false));
    }
}
