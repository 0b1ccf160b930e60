use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// OHLCV candlestick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// Calendar date of this candle on the exchange's clock
    pub fn session_date(&self, offset: FixedOffset) -> NaiveDate {
        session_date(self.timestamp, offset)
    }

    /// High minus low
    pub fn range(&self) -> f64 {
        self.high - self.low
    }
}

/// Calendar date of a UTC timestamp in a fixed UTC offset
pub fn session_date(timestamp: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    timestamp.with_timezone(&offset).date_naive()
}

/// Build a `FixedOffset` from seconds east of UTC, falling back to UTC when out of range
pub fn offset_from_secs(utc_offset_secs: i32) -> FixedOffset {
    FixedOffset::east_opt(utc_offset_secs).unwrap_or_else(|| Utc.fix())
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TradeSide {
    Buy,
    Sell,
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeSide::Buy => write!(f, "BUY"),
            TradeSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Why a position went flat. Only the first matching exit rule is recorded.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    TrailingStop,
    SignalReversal,
    /// Session boundary reached while holding
    ForcedLiquidation,
    /// Backtest ran out of candles while holding
    EndOfData,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ExitReason::TakeProfit => "take-profit",
            ExitReason::StopLoss => "stop-loss",
            ExitReason::TrailingStop => "trailing-stop",
            ExitReason::SignalReversal => "signal-reversal",
            ExitReason::ForcedLiquidation => "forced-liquidation",
            ExitReason::EndOfData => "end-of-data",
        };
        f.write_str(label)
    }
}

/// Completed round trip. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Trade {
    pub id: Uuid,
    pub entry_time: Option<DateTime<Utc>>,
    pub exit_time: Option<DateTime<Utc>>,
    pub entry_price: f64,
    pub exit_price: f64,
    pub quantity: u64,
    pub exit_reason: ExitReason,
}

impl Trade {
    /// Raw price return of the round trip
    pub fn is_win(&self) -> bool {
        self.exit_price > self.entry_price
    }
}

/// Buy and sell fee rates, applied to notional
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct FeeSchedule {
    pub buy_fee: f64,
    pub sell_fee: f64,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            buy_fee: 0.00014,
            sell_fee: 0.00014,
        }
    }
}

impl FeeSchedule {
    pub fn zero() -> Self {
        Self {
            buy_fee: 0.0,
            sell_fee: 0.0,
        }
    }

    /// Net return after both fees: exit·(1−sell_fee) / (entry·(1+buy_fee)) − 1
    pub fn net_return(&self, entry_price: f64, exit_price: f64) -> f64 {
        (exit_price * (1.0 - self.sell_fee)) / (entry_price * (1.0 + self.buy_fee)) - 1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_session_date_uses_offset() {
        // 2024-03-04 23:30 UTC is already 2024-03-05 in KST
        let ts = Utc.with_ymd_and_hms(2024, 3, 4, 23, 30, 0).unwrap();
        let kst = offset_from_secs(9 * 3600);
        assert_eq!(
            session_date(ts, kst),
            NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()
        );
        assert_eq!(
            session_date(ts, offset_from_secs(0)),
            NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()
        );
    }

    #[test]
    fn test_net_return_with_fees() {
        let fees = FeeSchedule {
            buy_fee: 0.001,
            sell_fee: 0.001,
        };
        let net = fees.net_return(100.0, 101.0);
        assert!((net - (101.0 * 0.999 / 100.1 - 1.0)).abs() < 1e-12);
        assert_eq!(FeeSchedule::zero().net_return(100.0, 100.0), 0.0);
    }

    #[test]
    fn test_trade_win() {
        let trade = Trade {
            id: Uuid::new_v4(),
            entry_time: None,
            exit_time: None,
            entry_price: 100.0,
            exit_price: 101.2,
            quantity: 10,
            exit_reason: ExitReason::TakeProfit,
        };
        assert!(trade.is_win());
        assert_eq!(trade.exit_reason.to_string(), "take-profit");
    }
}
