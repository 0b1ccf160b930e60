use crate::error::{EngineError, EngineResult};
use crate::models::{FeeSchedule, Trade};
use crate::strategy::Fill;

/// Cash and share bookkeeping for a single-instrument replay
#[derive(Debug, Clone)]
pub struct Ledger {
    initial_cash: f64,
    cash: f64,
    holdings: u64,
    fees: FeeSchedule,
    trades: Vec<Trade>,
    win_count: usize,
}

impl Ledger {
    pub fn new(initial_cash: f64, fees: FeeSchedule) -> Self {
        Self {
            initial_cash,
            cash: initial_cash,
            holdings: 0,
            fees,
            trades: Vec::new(),
            win_count: 0,
        }
    }

    pub fn initial_cash(&self) -> f64 {
        self.initial_cash
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn holdings(&self) -> u64 {
        self.holdings
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn win_count(&self) -> usize {
        self.win_count
    }

    /// Mark-to-market value at `price`, before exit fees
    pub fn equity(&self, price: f64) -> f64 {
        self.cash + self.holdings as f64 * price
    }

    /// Final return on the starting cash
    pub fn buy(&mut self, fill: &Fill) -> EngineResult<()> {
        if self.holdings > 0 {
            return Err(EngineError::InvalidTransition(
                "ledger already holds a position".to_string(),
            ));
        }
        let cost = fill.quantity as f64 * fill.price * (1.0 + self.fees.buy_fee);
        if cost > self.cash {
            return Err(EngineError::InvalidTransition(format!(
                "buy of {:.2} exceeds cash {:.2}",
                cost, self.cash
            )));
        }
        self.cash -= cost;
        self.holdings = fill.quantity;
        Ok(())
    }

    /// Book the proceeds of a finished trade
    pub fn sell(&mut self, trade: Trade) -> EngineResult<()> {
        if self.holdings != trade.quantity {
            return Err(EngineError::InvalidTransition(format!(
                "selling {} shares while holding {}",
                trade.quantity, self.holdings
            )));
        }
        self.cash += trade.quantity as f64 * trade.exit_price * (1.0 - self.fees.sell_fee);
        self.holdings = 0;
        if trade.is_win() {
            self.win_count += 1;
        }
        self.trades.push(trade);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExitReason;
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn fill(price: f64, quantity: u64) -> Fill {
        Fill {
            price,
            quantity,
            timestamp: Utc.with_ymd_and_hms(2024, 3, 4, 1, 0, 0).unwrap(),
        }
    }

    fn trade(entry: f64, exit: f64, quantity: u64) -> Trade {
        Trade {
            id: Uuid::new_v4(),
            entry_time: None,
            exit_time: None,
            entry_price: entry,
            exit_price: exit,
            quantity,
            exit_reason: ExitReason::TakeProfit,
        }
    }

    #[test]
    fn test_zero_fee_round_trip_is_exact() {
        let mut ledger = Ledger::new(10_000.0, FeeSchedule::zero());
        ledger.buy(&fill(100.0, 80)).unwrap();
        assert_eq!(ledger.cash(), 2_000.0);
        assert_eq!(ledger.holdings(), 80);

        ledger.sell(trade(100.0, 100.0, 80)).unwrap();
        assert_eq!(ledger.cash(), 10_000.0);
        assert_eq!(ledger.trades().len(), 1);
        // Flat exit is not a win
        assert_eq!(ledger.win_count(), 0);
    }

    #[test]
    fn test_fees_applied_both_sides() {
        let fees = FeeSchedule {
            buy_fee: 0.001,
            sell_fee: 0.002,
        };
        let mut ledger = Ledger::new(10_000.0, fees);
        ledger.buy(&fill(100.0, 10)).unwrap();
        assert!((ledger.cash() - (10_000.0 - 1_001.0)).abs() < 1e-9);

        ledger.sell(trade(100.0, 110.0, 10)).unwrap();
        let expected = 10_000.0 - 1_001.0 + 1_100.0 * 0.998;
        assert!((ledger.cash() - expected).abs() < 1e-9);
        assert_eq!(ledger.win_count(), 1);
    }

    #[test]
    fn test_rejects_overspend_and_mismatch() {
        let mut ledger = Ledger::new(1_000.0, FeeSchedule::zero());
        assert!(ledger.buy(&fill(100.0, 11)).is_err());
        assert!(ledger.sell(trade(100.0, 101.0, 5)).is_err());

        ledger.buy(&fill(100.0, 5)).unwrap();
        assert!(ledger.buy(&fill(100.0, 1)).is_err());
        assert_eq!(ledger.equity(120.0), 500.0 + 600.0);
    }
}
