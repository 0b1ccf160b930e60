use async_trait::async_trait;
use std::path::{Path, PathBuf};

use super::candle_buffer::CandleBuffer;
use crate::error::{EngineError, EngineResult};
use crate::models::Candle;

/// Candles requested on every refresh; overlaps the buffer tail so a
/// still-forming bar is replaced
pub const REFRESH_LOOKBACK: usize = 80;

/// Where candles and quotes come from
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Most recent `lookback` candles, oldest first
    async fn fetch(
        &self,
        instrument: &str,
        lookback: usize,
        interval_minutes: u32,
    ) -> EngineResult<Vec<Candle>>;

    async fn current_price(&self, instrument: &str) -> EngineResult<f64>;

    /// Fetch a short overlapping window and merge it into `buffer`
    async fn refresh(
        &self,
        buffer: &mut CandleBuffer,
        instrument: &str,
        interval_minutes: u32,
    ) -> EngineResult<usize> {
        let fresh = self
            .fetch(instrument, REFRESH_LOOKBACK, interval_minutes)
            .await?;
        let added = buffer.merge(fresh);
        tracing::debug!(instrument, added, held = buffer.len(), "🔄 Candles refreshed");
        Ok(added)
    }
}

/// Read a candle CSV (`timestamp,open,high,low,close,volume`, RFC 3339 timestamps)
pub fn load_candles(path: impl AsRef<Path>) -> EngineResult<Vec<Candle>> {
    let mut reader = csv::Reader::from_path(path.as_ref())?;
    let mut candles = reader
        .deserialize()
        .collect::<Result<Vec<Candle>, csv::Error>>()?;
    candles.sort_by_key(|c| c.timestamp);
    candles.dedup_by_key(|c| c.timestamp);
    Ok(candles)
}

pub fn write_candles(path: impl AsRef<Path>, candles: &[Candle]) -> EngineResult<()> {
    let mut writer = csv::Writer::from_path(path.as_ref())?;
    for candle in candles {
        writer.serialize(candle)?;
    }
    writer.flush()?;
    Ok(())
}

/// Candle file that an external recorder keeps appending to
///
/// Every call re-reads the file, so the latest partial bar is always the one
/// on disk.
#[derive(Debug, Clone)]
pub struct CsvCandleSource {
    path: PathBuf,
    interval_minutes: u32,
}

impl CsvCandleSource {
    pub fn new(path: impl AsRef<Path>, interval_minutes: u32) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            interval_minutes,
        }
    }

    fn read(&self, interval_minutes: u32) -> EngineResult<Vec<Candle>> {
        if interval_minutes != self.interval_minutes {
            return Err(EngineError::MarketData(format!(
                "{} holds {}-minute candles, {}-minute requested",
                self.path.display(),
                self.interval_minutes,
                interval_minutes
            )));
        }
        load_candles(&self.path)
    }
}

#[async_trait]
impl MarketDataSource for CsvCandleSource {
    async fn fetch(
        &self,
        _instrument: &str,
        lookback: usize,
        interval_minutes: u32,
    ) -> EngineResult<Vec<Candle>> {
        let mut candles = self.read(interval_minutes)?;
        let skip = candles.len().saturating_sub(lookback);
        Ok(candles.split_off(skip))
    }

    async fn current_price(&self, instrument: &str) -> EngineResult<f64> {
        let candles = self.read(self.interval_minutes)?;
        candles.last().map(|c| c.close).ok_or_else(|| {
            EngineError::MarketData(format!("no candles for {} in {}", instrument, self.path.display()))
        })
    }
}
