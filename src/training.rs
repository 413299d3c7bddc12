//! Batch training and persistence of analysis results
//!
//! A [`Trainer`] analyzes a price history and upserts the outcome into a [`TrainingStore`],
//! keyed by a [`TrainingIdentity`]. The live inferrer later looks the record up by the same
//! identity.

use std::{
    collections::HashMap,
    fmt,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    analysis::AggregateResult,
    candle::{CandleSize, PriceHistory},
    params::Parameters,
    Engine, Period, Ratio, Result, OHLCV,
};

/// Key under which a training result is stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingIdentity {
    pub product: String,
    pub candle_size: CandleSize,
    pub lookback_candles: Period,
    pub lookahead_candles: Period,
    pub allowed_wick_to_body_ratio: Ratio,
}

impl TrainingIdentity {
    pub fn new(product: impl Into<String>, candle_size: CandleSize, params: &Parameters) -> Self {
        Self {
            product: product.into(),
            candle_size,
            lookback_candles: params.lookback_candles,
            lookahead_candles: params.lookahead_candles,
            allowed_wick_to_body_ratio: params.allowed_wick_to_body_ratio,
        }
    }

    /// Stable string form, usable as a map key
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for TrainingIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/lookback={}/lookahead={}/wick={}",
            self.product,
            self.candle_size,
            self.lookback_candles.get(),
            self.lookahead_candles.get(),
            self.allowed_wick_to_body_ratio.get()
        )
    }
}

/// Stored training document: product, candle size and the flattened analysis result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingRecord {
    pub product: String,
    pub candle_size: CandleSize,
    #[serde(flatten)]
    pub result: AggregateResult,
}

impl TrainingRecord {
    pub fn identity(&self) -> TrainingIdentity {
        TrainingIdentity::new(
            self.product.clone(),
            self.candle_size,
            &self.result.parameters(),
        )
    }
}

/// Persistence collaborator for training records
pub trait TrainingStore {
    /// Insert the record, replacing any record with the same identity
    fn upsert(&mut self, record: TrainingRecord) -> Result<()>;

    fn find(&self, identity: &TrainingIdentity) -> Result<Option<TrainingRecord>>;
}

/// In-process store
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: HashMap<String, TrainingRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl TrainingStore for MemoryStore {
    fn upsert(&mut self, record: TrainingRecord) -> Result<()> {
        self.records.insert(record.identity().key(), record);
        Ok(())
    }

    fn find(&self, identity: &TrainingIdentity) -> Result<Option<TrainingRecord>> {
        Ok(self.records.get(&identity.key()).cloned())
    }
}

/// Store keeping every record in one JSON array file
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All records; a missing file is an empty store
    pub fn load(&self) -> Result<Vec<TrainingRecord>> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(err) => Err(err.into()),
        }
    }

    fn save(&self, records: &[TrainingRecord]) -> Result<()> {
        let json = serde_json::to_string_pretty(records)?;
        fs::write(&self.path, json)?;
        Ok(())
    }
}

impl TrainingStore for JsonFileStore {
    fn upsert(&mut self, record: TrainingRecord) -> Result<()> {
        let mut records = self.load()?;
        let key = record.identity().key();
        match records.iter_mut().find(|r| r.identity().key() == key) {
            Some(existing) => *existing = record,
            None => records.push(record),
        }
        self.save(&records)
    }

    fn find(&self, identity: &TrainingIdentity) -> Result<Option<TrainingRecord>> {
        let key = identity.key();
        Ok(self
            .load()?
            .into_iter()
            .find(|r| r.identity().key() == key))
    }
}

/// Batch driver: analyze a price history and persist the result
#[derive(Debug, Clone)]
pub struct Trainer {
    product: String,
    candle_size: CandleSize,
    engine: Engine,
}

impl Trainer {
    pub fn new(product: impl Into<String>, candle_size: CandleSize, engine: Engine) -> Self {
        Self {
            product: product.into(),
            candle_size,
            engine,
        }
    }

    pub fn identity(&self) -> TrainingIdentity {
        TrainingIdentity::new(self.product.clone(), self.candle_size, self.engine.parameters())
    }

    /// Analyze ascending candles and upsert the record
    pub fn train<T: OHLCV, S: TrainingStore>(
        &self,
        bars: &[T],
        store: &mut S,
    ) -> Result<TrainingRecord> {
        let result = self.engine.analyze(bars)?;
        let record = TrainingRecord {
            product: self.product.clone(),
            candle_size: self.candle_size,
            result,
        };
        store.upsert(record.clone())?;
        info!(
            identity = %record.identity(),
            events = record.result.events.len(),
            bullish_engulfing = record.result.bullish_engulfing_event_count,
            status = ?record.result.status,
            "stored training result"
        );
        Ok(record)
    }

    /// Normalize the history's rows, then train on them
    pub fn train_history<S: TrainingStore>(
        &self,
        history: &PriceHistory,
        store: &mut S,
    ) -> Result<TrainingRecord> {
        let candles = history.normalized_candles()?;
        self.train(&candles, store)
    }
}
