use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

use crate::error::{EngineError, EngineResult};
use crate::models::FeeSchedule;
use crate::strategy::Fill;

/// Broker seam: the engine only ever asks for cash and submits market orders
#[async_trait]
pub trait OrderExecutor: Send + Sync {
    async fn available_cash(&self) -> EngineResult<f64>;

    /// Buy `quantity` at roughly `price`; the fill carries the confirmed price
    async fn submit_buy(&self, instrument: &str, quantity: u64, price: f64) -> EngineResult<Fill>;

    async fn submit_sell(&self, instrument: &str, quantity: u64, price: f64)
        -> EngineResult<Fill>;
}

#[derive(Debug, Clone, Copy)]
struct PaperAccount {
    cash: f64,
    holdings: u64,
}

/// In-memory broker filling every order at the requested price
pub struct PaperBroker {
    account: Mutex<PaperAccount>,
    fees: FeeSchedule,
    reject_orders: AtomicBool,
}

impl PaperBroker {
    pub fn new(initial_cash: f64, fees: FeeSchedule) -> Self {
        Self {
            account: Mutex::new(PaperAccount {
                cash: initial_cash,
                holdings: 0,
            }),
            fees,
            reject_orders: AtomicBool::new(false),
        }
    }

    /// Start with shares already held, e.g. a position restored from the trade log
    pub fn with_position(mut self, holdings: u64) -> Self {
        self.account.get_mut().holdings = holdings;
        self
    }

    /// Make every following order fail, to exercise rejection handling
    pub fn set_reject_orders(&self, reject: bool) {
        self.reject_orders.store(reject, Ordering::SeqCst);
    }

    pub async fn holdings(&self) -> u64 {
        self.account.lock().await.holdings
    }

    fn check_accepting(&self) -> EngineResult<()> {
        if self.reject_orders.load(Ordering::SeqCst) {
            return Err(EngineError::ExecutionFailure(
                "paper broker is rejecting orders".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl OrderExecutor for PaperBroker {
    async fn available_cash(&self) -> EngineResult<f64> {
        Ok(self.account.lock().await.cash)
    }

    async fn submit_buy(&self, instrument: &str, quantity: u64, price: f64) -> EngineResult<Fill> {
        self.check_accepting()?;
        let mut account = self.account.lock().await;

        let cost = quantity as f64 * price * (1.0 + self.fees.buy_fee);
        if quantity == 0 || cost > account.cash {
            return Err(EngineError::ExecutionFailure(format!(
                "cannot buy {} {} @ {:.2} with {:.2} cash",
                quantity, instrument, price, account.cash
            )));
        }

        account.cash -= cost;
        account.holdings += quantity;
        tracing::debug!(instrument, quantity, price, cash = account.cash, "Paper buy filled");

        Ok(Fill {
            price,
            quantity,
            timestamp: Utc::now(),
        })
    }

    async fn submit_sell(
        &self,
        instrument: &str,
        quantity: u64,
        price: f64,
    ) -> EngineResult<Fill> {
        self.check_accepting()?;
        let mut account = self.account.lock().await;

        if quantity == 0 || quantity > account.holdings {
            return Err(EngineError::ExecutionFailure(format!(
                "cannot sell {} {}, holding {}",
                quantity, instrument, account.holdings
            )));
        }

        account.cash += quantity as f64 * price * (1.0 - self.fees.sell_fee);
        account.holdings -= quantity;
        tracing::debug!(instrument, quantity, price, cash = account.cash, "Paper sell filled");

        Ok(Fill {
            price,
            quantity,
            timestamp: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_round_trip_with_fees() {
        let fees = FeeSchedule {
            buy_fee: 0.001,
            sell_fee: 0.001,
        };
        let broker = PaperBroker::new(10_000.0, fees);

        let fill = broker.submit_buy("005930", 10, 100.0).await.unwrap();
        assert_eq!(fill.quantity, 10);
        assert!((broker.available_cash().await.unwrap() - 8_999.0).abs() < 1e-9);

        broker.submit_sell("005930", 10, 110.0).await.unwrap();
        assert!((broker.available_cash().await.unwrap() - 10_097.9).abs() < 1e-9);
        assert_eq!(broker.holdings().await, 0);
    }

    #[tokio::test]
    async fn test_rejects() {
        let broker = PaperBroker::new(500.0, FeeSchedule::zero());
        assert!(broker.submit_buy("X", 10, 100.0).await.is_err());
        assert!(broker.submit_sell("X", 1, 100.0).await.is_err());

        broker.set_reject_orders(true);
        let err = broker.submit_buy("X", 1, 100.0).await.unwrap_err();
        assert!(matches!(err, EngineError::ExecutionFailure(_)));
        assert_eq!(broker.available_cash().await.unwrap(), 500.0);
    }

    #[tokio::test]
    async fn test_with_position_allows_sell() {
        let broker = PaperBroker::new(0.0, FeeSchedule::zero()).with_position(5);
        broker.submit_sell("X", 5, 10.0).await.unwrap();
        assert_eq!(broker.available_cash().await.unwrap(), 50.0);
    }
}
