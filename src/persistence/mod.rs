use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::EngineResult;
use crate::models::TradeSide;

/// One row of the append-only trade log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeLogEntry {
    pub timestamp: DateTime<Utc>,
    pub side: TradeSide,
    pub price: f64,
    pub quantity: u64,
    /// Fee-adjusted return, sells only
    pub net_return_pct: Option<f64>,
    pub reason: String,
}

/// Append-only trade record sink
#[async_trait]
pub trait TradeLog: Send + Sync {
    async fn append(&self, entry: &TradeLogEntry) -> EngineResult<()>;

    /// Entry price and quantity when the newest record is a buy, else (0, 0)
    async fn last_unclosed(&self) -> EngineResult<(f64, u64)>;
}

/// Trade log kept as a CSV file with a header row
///
/// # Example
/// ```no_run
/// # async fn demo() -> scalpbot::error::EngineResult<()> {
/// use scalpbot::persistence::{CsvTradeLog, TradeLog};
/// let log = CsvTradeLog::new("trades.csv");
/// let (entry_price, quantity) = log.last_unclosed().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct CsvTradeLog {
    path: PathBuf,
}

impl CsvTradeLog {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every record in file order; a missing file is an empty log
    pub fn read_all(&self) -> EngineResult<Vec<TradeLogEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let mut reader = csv::Reader::from_path(&self.path)?;
        let entries = reader
            .deserialize()
            .collect::<Result<Vec<TradeLogEntry>, csv::Error>>()?;
        Ok(entries)
    }
}

#[async_trait]
impl TradeLog for CsvTradeLog {
    async fn append(&self, entry: &TradeLogEntry) -> EngineResult<()> {
        let is_new = !self.path.exists();
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(is_new)
            .from_writer(file);
        writer.serialize(entry)?;
        writer.flush()?;

        tracing::debug!(
            path = %self.path.display(),
            side = %entry.side,
            price = entry.price,
            "📝 Trade logged"
        );
        Ok(())
    }

    async fn last_unclosed(&self) -> EngineResult<(f64, u64)> {
        let entries = self.read_all()?;
        match entries.last() {
            Some(last) if last.side == TradeSide::Buy => Ok((last.price, last.quantity)),
            _ => Ok((0.0, 0)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(side: TradeSide, price: f64, net: Option<f64>) -> TradeLogEntry {
        TradeLogEntry {
            timestamp: Utc.with_ymd_and_hms(2024, 3, 4, 1, 0, 0).unwrap(),
            side,
            price,
            quantity: 12,
            net_return_pct: net,
            reason: "test".to_string(),
        }
    }

    #[tokio::test]
    async fn test_missing_file_has_no_position() {
        let dir = tempfile::tempdir().unwrap();
        let log = CsvTradeLog::new(dir.path().join("trades.csv"));
        assert_eq!(log.last_unclosed().await.unwrap(), (0.0, 0));
        assert!(log.read_all().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_append_and_last_unclosed() {
        let dir = tempfile::tempdir().unwrap();
        let log = CsvTradeLog::new(dir.path().join("trades.csv"));

        log.append(&entry(TradeSide::Buy, 50_000.0, None))
            .await
            .unwrap();
        assert_eq!(log.last_unclosed().await.unwrap(), (50_000.0, 12));

        log.append(&entry(TradeSide::Sell, 50_500.0, Some(0.97)))
            .await
            .unwrap();
        assert_eq!(log.last_unclosed().await.unwrap(), (0.0, 0));

        let entries = log.read_all().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].net_return_pct, None);
        assert_eq!(entries[1].net_return_pct, Some(0.97));

        // Header written once
        let text = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(text.matches("timestamp").count(), 1);
    }
}
