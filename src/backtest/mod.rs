// Backtest harness
// Replays walk-forward probabilities through the position machine and a cash ledger

pub mod ledger;
pub mod metrics;
pub mod runner;
pub mod sweep;
pub mod synthetic;

pub use ledger::Ledger;
pub use metrics::{BacktestMetrics, TradeRecord};
pub use runner::BacktestRunner;
pub use sweep::{run_sweep, SweepGrid, SweepResult};
pub use synthetic::{MarketScenario, SyntheticDataGenerator};
