//! End-to-end tests: train on a price history, persist, then raise alerts from a live feed.

use std::thread;

use engulfing_odds::prelude::*;

/// Raw exchange rows (time, low, high, open, close, volume), newest first like the exchange
fn exchange_rows(n: usize) -> Vec<RawCandle> {
    let mut rows = Vec::with_capacity(n);
    let mut price = 100.0;
    for i in 0..n {
        let change = ((i * 7 + 13) % 100) as f64 / 50.0 - 1.0;
        let burst = if i % 9 == 0 { 3.0 } else { 1.0 };
        let open = price;
        let close = price + change * burst;
        let high = open.max(close) + 0.2;
        let low = open.min(close) - 0.2;
        let volume = 100.0 + ((i * 17) % 40) as f64 * burst;
        rows.push(vec![1_514_764_800.0 + i as f64 * 3_600.0, low, high, open, close, volume]);
        price = close;
    }
    rows.reverse();
    rows
}

fn assert_close(a: &[ProbabilityPoint], b: &[ProbabilityPoint]) {
    assert_eq!(a.len(), b.len());
    for (x, y) in a.iter().zip(b) {
        assert!((x.pct_price_change - y.pct_price_change).abs() < 1e-12);
        assert!((x.probability - y.probability).abs() < 1e-12);
    }
}

fn engine() -> Engine {
    EngineBuilder::new()
        .lookback_candles(2)
        .lookahead_candles(3)
        .allowed_wick_to_body_ratio(0.5)
        .build()
        .unwrap()
}

fn history() -> PriceHistory {
    let json = serde_json::json!({
        "product": "BTC-USD",
        "candleSize": "1-hour",
        "candles": exchange_rows(400),
    });
    PriceHistory::from_json_str(&json.to_string()).unwrap()
}

#[test]
fn test_train_then_infer_over_channel() {
    let trainer = Trainer::new("BTC-USD", CandleSize::OneHour, engine());
    let mut store = MemoryStore::new();
    let record = trainer.train_history(&history(), &mut store).unwrap();
    assert_eq!(store.len(), 1);
    assert_eq!(record.identity(), trainer.identity());
    assert!(record.result.has_pattern_probabilities());

    let inferrer = Inferrer::from_store(&store, &trainer.identity()).unwrap();

    // replay the history as a growing feed, one batch per new candle
    let candles = history().normalized_candles().unwrap();
    let expected = engine()
        .classify(&candles)
        .unwrap()
        .iter()
        .filter(|s| s.is_bullish_engulfing)
        .count();

    let (batch_tx, batch_rx) = crossbeam::channel::unbounded::<Vec<RawCandle>>();
    let (alert_tx, alert_rx) = crossbeam::channel::unbounded::<Alert>();
    let producer = thread::spawn(move || {
        for end in 1..=candles.len() {
            let batch = candles[..end].iter().map(Candle::to_row).collect();
            batch_tx.send(batch).unwrap();
        }
    });

    let mut sink = alert_tx;
    let raised = inferrer.run(&batch_rx, &mut sink);
    producer.join().unwrap();
    drop(sink);

    let alerts: Vec<Alert> = alert_rx.iter().collect();
    assert_eq!(raised, expected);
    assert_eq!(alerts.len(), expected);
    for alert in &alerts {
        assert!(alert.stats.is_bullish_engulfing);
        assert_eq!(alert.probabilities, record.result.probabilities);
        assert_eq!(alert.identity.product, "BTC-USD");
    }
}

#[test]
fn test_closure_sink() {
    let mut store = MemoryStore::new();
    let trainer = Trainer::new("ETH-USD", CandleSize::OneHour, engine());
    trainer.train_history(&history(), &mut store).unwrap();
    let inferrer = Inferrer::from_store(&store, &trainer.identity()).unwrap();

    let (tx, rx) = crossbeam::channel::unbounded::<Vec<RawCandle>>();
    let candles = history().normalized_candles().unwrap();
    for end in 1..=candles.len() {
        tx.send(candles[..end].iter().map(Candle::to_row).collect()).unwrap();
    }
    drop(tx);

    let mut times = Vec::new();
    let raised = inferrer.run(&rx, &mut FnSink(|alert: Alert| times.push(alert.candle.time)));
    assert_eq!(raised, times.len());
    assert!(times.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_json_file_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("training.json");

    let trainer = Trainer::new("BTC-USD", CandleSize::OneHour, engine());
    let record = {
        let mut store = JsonFileStore::new(&path);
        trainer.train_history(&history(), &mut store).unwrap()
    };

    let reopened = JsonFileStore::new(&path);
    let loaded = reopened.find(&trainer.identity()).unwrap().unwrap();
    assert_eq!(loaded.result.status, record.result.status);
    assert_close(&loaded.result.probabilities, &record.result.probabilities);
    assert_close(&loaded.result.control_probabilities, &record.result.control_probabilities);
    assert_eq!(loaded.result.events.len(), record.result.events.len());

    let other = TrainingIdentity::new("BTC-USD", CandleSize::OneDay, engine().parameters());
    assert!(reopened.find(&other).unwrap().is_none());
}

#[test]
fn test_inferrer_requires_training() {
    let store = MemoryStore::new();
    let identity = Trainer::new("BTC-USD", CandleSize::OneHour, engine()).identity();
    assert!(matches!(
        Inferrer::from_store(&store, &identity),
        Err(AnalysisError::NotTrained(_))
    ));
}

#[test]
fn test_unknown_candle_size_lists_valid_names() {
    let err = "2-hour".parse::<CandleSize>().unwrap_err();
    let message = err.to_string();
    assert!(message.contains("2-hour"));
    assert!(message.contains("1-minute"));
    assert!(message.contains("1-day"));
}
