//! Property-based tests using proptest.
//!
//! These tests verify invariants that must hold for every candle sequence and event set.

use proptest::prelude::*;

use engulfing_odds::{
    analysis::Event,
    candle::Candle,
    outliers::OutlierFilter,
    probability::build_curves,
    EngineBuilder, Increment,
};

// ==================== Test Data Generators ====================

/// Random candles with consistent OHLC ranges and positive volume
fn arb_candles(min_len: usize, max_len: usize) -> impl Strategy<Value = Vec<Candle>> {
    prop::collection::vec(
        (50.0..150.0_f64, -5.0..5.0_f64, 0.0..3.0_f64, 0.0..3.0_f64, 1.0..1000.0_f64),
        min_len..=max_len,
    )
    .prop_map(|rows| {
        rows.into_iter()
            .enumerate()
            .map(|(i, (open, body, top, bottom, volume))| {
                let close = open + body;
                Candle {
                    time: i as i64 * 60,
                    open,
                    high: open.max(close) + top,
                    low: open.min(close) - bottom,
                    close,
                    volume,
                }
            })
            .collect()
    })
}

/// Random events with finite metrics, indexed by position
fn arb_events(max_len: usize) -> impl Strategy<Value = Vec<Event>> {
    prop::collection::vec(
        (-0.2..0.5_f64, -0.5..0.2_f64, -1.0..5.0_f64, any::<bool>()),
        0..=max_len,
    )
    .prop_map(|rows| {
        rows.into_iter()
            .enumerate()
            .map(|(index, (max, min, volume, engulfing))| Event {
                index,
                price: 100.0,
                time: String::new(),
                pct_volume_change: volume,
                max_pct_price_change: max,
                min_pct_price_change: min,
                is_bullish_engulfing: engulfing,
            })
            .collect()
    })
}

// ==================== Classifier Properties ====================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// A candle that did not close above its open is never bullish engulfing
    #[test]
    fn prop_non_positive_height_never_qualifies(
        candles in arb_candles(2, 60),
        lookback in 1usize..=6,
        ratio in 0.0..=1.0_f64,
    ) {
        let engine = EngineBuilder::new()
            .lookback_candles(lookback)
            .allowed_wick_to_body_ratio(ratio)
            .build()
            .unwrap();
        for stats in engine.iter(&candles) {
            let stats = stats.unwrap();
            if stats.height <= 0.0 {
                prop_assert!(!stats.is_bullish_engulfing, "index {}", stats.index);
            }
        }
    }

    /// Classifying the same candles twice yields the same result
    #[test]
    fn prop_classification_is_deterministic(candles in arb_candles(1, 60), lookback in 1usize..=6) {
        let engine = EngineBuilder::new().lookback_candles(lookback).build().unwrap();
        prop_assert_eq!(engine.classify(&candles).unwrap(), engine.classify(&candles).unwrap());
    }

    /// Qualifying candles strictly exceed every body and volume in their lookback window
    #[test]
    fn prop_qualifying_candles_dominate_window(candles in arb_candles(2, 60), lookback in 1usize..=6) {
        let engine = EngineBuilder::new()
            .lookback_candles(lookback)
            .allowed_wick_to_body_ratio(1.0)
            .build()
            .unwrap();
        for stats in engine.iter(&candles) {
            let stats = stats.unwrap();
            if !stats.is_bullish_engulfing {
                continue;
            }
            let candle = &candles[stats.index];
            for prior in &candles[stats.index - lookback..stats.index] {
                prop_assert!(stats.height > (prior.close - prior.open).abs());
                prop_assert!(candle.volume > prior.volume);
            }
        }
    }
}

// ==================== Outlier Filter Properties ====================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// The filter partitions its input without inventing or duplicating events
    #[test]
    fn prop_filter_output_is_subset(events in arb_events(40)) {
        let outcome = OutlierFilter::default().apply(events.clone());
        prop_assert_eq!(outcome.kept.len() + outcome.removed.len(), events.len());
        for kept in &outcome.kept {
            prop_assert_eq!(kept, &events[kept.index]);
        }
        prop_assert!(outcome.kept.windows(2).all(|w| w[0].index < w[1].index));
    }

    /// Fewer than four events pass through unchanged
    #[test]
    fn prop_small_inputs_unfiltered(events in arb_events(3)) {
        let outcome = OutlierFilter::default().apply(events.clone());
        prop_assert_eq!(outcome.kept, events);
        prop_assert!(outcome.removed.is_empty());
    }
}

// ==================== Probability Properties ====================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Stricter thresholds can only lower the exceedance probability
    #[test]
    fn prop_curves_non_increasing(events in arb_events(40), step in 0.001..0.05_f64) {
        let curves = build_curves(&events, Increment::new(step).unwrap());
        for curve in [&curves.pattern, &curves.control] {
            for pair in curve.windows(2) {
                prop_assert!(pair[0].pct_price_change < pair[1].pct_price_change);
                prop_assert!(pair[1].probability <= pair[0].probability);
            }
            for point in curve.iter() {
                prop_assert!((0.0..=1.0).contains(&point.probability));
                prop_assert!(point.pct_price_change >= 0.0);
            }
        }
    }
}
