//! Live inference against a stored training result
//!
//! An [`Inferrer`] holds the engine and probability curves of one [`TrainingRecord`]. Each
//! incoming candle batch is normalized and its latest candle classified; a bullish engulfing
//! candle produces an [`Alert`] carrying the trained probabilities.

use crossbeam::channel::{Receiver, Sender};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    candle::{normalize_rows, Candle, RawCandle},
    detectors::CandleStats,
    probability::ProbabilityPoint,
    training::{TrainingIdentity, TrainingRecord, TrainingStore},
    AnalysisError, Engine, Result,
};

/// A bullish engulfing candle seen live
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub identity: TrainingIdentity,
    pub candle: Candle,
    pub stats: CandleStats,
    pub probabilities: Vec<ProbabilityPoint>,
    pub control_probabilities: Vec<ProbabilityPoint>,
}

impl Alert {
    /// Trained probability of exceeding the first threshold at or above `pct_price_change`
    pub fn probability_of(&self, pct_price_change: f64) -> Option<f64> {
        self.probabilities
            .iter()
            .find(|p| p.pct_price_change >= pct_price_change)
            .map(|p| p.probability)
    }
}

/// Receiver of alerts
pub trait AlertSink {
    fn notify(&mut self, alert: Alert);
}

/// Sink calling a closure for every alert
pub struct FnSink<F>(pub F);

impl<F: FnMut(Alert)> AlertSink for FnSink<F> {
    fn notify(&mut self, alert: Alert) {
        (self.0)(alert)
    }
}

impl AlertSink for Vec<Alert> {
    fn notify(&mut self, alert: Alert) {
        self.push(alert);
    }
}

impl AlertSink for Sender<Alert> {
    fn notify(&mut self, alert: Alert) {
        if self.send(alert).is_err() {
            warn!("alert receiver disconnected, dropping alert");
        }
    }
}

/// Classifies live candles with the parameters of a training record
#[derive(Debug, Clone)]
pub struct Inferrer {
    identity: TrainingIdentity,
    engine: Engine,
    probabilities: Vec<ProbabilityPoint>,
    control_probabilities: Vec<ProbabilityPoint>,
}

impl Inferrer {
    pub fn new(record: &TrainingRecord) -> Self {
        Self {
            identity: record.identity(),
            engine: Engine::new(record.result.parameters()),
            probabilities: record.result.probabilities.clone(),
            control_probabilities: record.result.control_probabilities.clone(),
        }
    }

    /// Load the record for `identity`, failing when it was never trained
    pub fn from_store<S: TrainingStore>(store: &S, identity: &TrainingIdentity) -> Result<Self> {
        let record = store
            .find(identity)?
            .ok_or_else(|| AnalysisError::NotTrained(identity.to_string()))?;
        if !record.result.has_pattern_probabilities() {
            warn!(%identity, status = ?record.result.status, "training has no pattern probabilities");
        }
        Ok(Self::new(&record))
    }

    #[inline]
    pub fn identity(&self) -> &TrainingIdentity {
        &self.identity
    }

    #[inline]
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Classify the latest of ascending candles. Too short a history yields no alert.
    pub fn inspect(&self, candles: &[Candle]) -> Result<Option<Alert>> {
        let Some(candle) = candles.last() else {
            return Ok(None);
        };
        let stats = match self.engine.classify_latest(candles) {
            Ok(stats) => stats,
            Err(AnalysisError::InsufficientData { need, got }) => {
                debug!(need, got, "batch too short to classify");
                return Ok(None);
            },
            Err(err) => return Err(err),
        };
        if !stats.is_bullish_engulfing {
            return Ok(None);
        }
        Ok(Some(Alert {
            identity: self.identity.clone(),
            candle: *candle,
            stats,
            probabilities: self.probabilities.clone(),
            control_probabilities: self.control_probabilities.clone(),
        }))
    }

    /// Normalize a raw exchange batch and inspect it
    pub fn on_batch<R: AsRef<[f64]>>(&self, rows: &[R]) -> Result<Option<Alert>> {
        let candles = normalize_rows(rows)?;
        self.inspect(&candles)
    }

    /// Consume batches until the channel disconnects. Returns the number of alerts raised.
    pub fn run<S: AlertSink>(&self, batches: &Receiver<Vec<RawCandle>>, sink: &mut S) -> usize {
        let mut alerts = 0;
        for batch in batches.iter() {
            match self.on_batch(&batch) {
                Ok(Some(alert)) => {
                    info!(
                        identity = %self.identity,
                        time = alert.candle.time,
                        price = alert.candle.close,
                        "bullish engulfing candle"
                    );
                    sink.notify(alert);
                    alerts += 1;
                },
                Ok(None) => {},
                Err(err) => warn!(error = %err, "skipping candle batch"),
            }
        }
        alerts
    }
}
