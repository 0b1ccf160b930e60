use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::{ExitReason, FeeSchedule, Trade};

/// One closed trade as reported after a backtest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub entry_time: Option<DateTime<Utc>>,
    pub exit_time: Option<DateTime<Utc>>,
    pub entry_price: f64,
    pub exit_price: f64,
    pub quantity: u64,
    pub net_pnl: f64,        // Cash change after both fees
    pub net_return_pct: f64, // Fee-adjusted return
    pub exit_reason: ExitReason,
    pub holding_period_minutes: Option<i64>,
}

impl TradeRecord {
    pub fn from_trade(trade: &Trade, fees: &FeeSchedule) -> Self {
        let quantity = trade.quantity as f64;
        let cost = quantity * trade.entry_price * (1.0 + fees.buy_fee);
        let proceeds = quantity * trade.exit_price * (1.0 - fees.sell_fee);
        let holding_period_minutes = match (trade.entry_time, trade.exit_time) {
            (Some(entry), Some(exit)) => Some((exit - entry).num_minutes()),
            _ => None,
        };

        Self {
            entry_time: trade.entry_time,
            exit_time: trade.exit_time,
            entry_price: trade.entry_price,
            exit_price: trade.exit_price,
            quantity: trade.quantity,
            net_pnl: proceeds - cost,
            net_return_pct: fees.net_return(trade.entry_price, trade.exit_price) * 100.0,
            exit_reason: trade.exit_reason,
            holding_period_minutes,
        }
    }
}

/// Outcome of one strategy replay
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestMetrics {
    pub strategy: String,

    // Cash
    pub initial_cash: f64,
    pub final_cash: f64,
    pub total_return_pct: f64,

    // Trade statistics
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: f64,
    pub avg_win_pct: f64,
    pub avg_loss_pct: f64,
    pub profit_factor: f64, // Gross wins / gross losses

    // Risk, on closed-trade equity
    pub max_drawdown: f64,
    pub max_drawdown_pct: f64,

    // Benchmarks
    pub buy_and_hold_pct: f64,
    pub accuracy: Option<f64>,

    pub exit_reasons: BTreeMap<String, usize>,
    pub trades: Vec<TradeRecord>,
}

impl BacktestMetrics {
    /// Summarise closed trades.
    ///
    /// Wins are trades whose exit price exceeds the entry price, matching the
    /// ledger's win count; P&L figures are net of fees.
    pub fn from_trades(
        strategy: &str,
        trades: &[Trade],
        fees: &FeeSchedule,
        initial_cash: f64,
        final_cash: f64,
        buy_and_hold_pct: f64,
        accuracy: Option<f64>,
    ) -> Self {
        let records: Vec<TradeRecord> = trades
            .iter()
            .map(|t| TradeRecord::from_trade(t, fees))
            .collect();

        let total_trades = records.len();
        let winning_trades = trades.iter().filter(|t| t.is_win()).count();
        let losing_trades = total_trades - winning_trades;
        let win_rate = if total_trades > 0 {
            winning_trades as f64 / total_trades as f64 * 100.0
        } else {
            0.0
        };

        let (wins, losses): (Vec<&TradeRecord>, Vec<&TradeRecord>) =
            records.iter().partition(|r| r.exit_price > r.entry_price);

        let avg_win_pct = mean(wins.iter().map(|r| r.net_return_pct));
        let avg_loss_pct = mean(losses.iter().map(|r| r.net_return_pct));

        let gross_wins: f64 = records.iter().map(|r| r.net_pnl).filter(|p| *p > 0.0).sum();
        let gross_losses: f64 = records
            .iter()
            .map(|r| r.net_pnl)
            .filter(|p| *p < 0.0)
            .map(f64::abs)
            .sum();
        let profit_factor = if gross_losses > 0.0 {
            gross_wins / gross_losses
        } else if gross_wins > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        let (max_drawdown, max_drawdown_pct) = Self::calculate_drawdown(&records, initial_cash);

        let mut exit_reasons = BTreeMap::new();
        for record in &records {
            *exit_reasons
                .entry(record.exit_reason.to_string())
                .or_insert(0) += 1;
        }

        Self {
            strategy: strategy.to_string(),
            initial_cash,
            final_cash,
            total_return_pct: (final_cash / initial_cash - 1.0) * 100.0,
            total_trades,
            winning_trades,
            losing_trades,
            win_rate,
            avg_win_pct,
            avg_loss_pct,
            profit_factor,
            max_drawdown,
            max_drawdown_pct,
            buy_and_hold_pct,
            accuracy,
            exit_reasons,
            trades: records,
        }
    }

    /// Excess return over simply holding through the test window
    pub fn excess_return_pct(&self) -> f64 {
        self.total_return_pct - self.buy_and_hold_pct
    }

    /// Peak-to-trough on the equity after each closed trade
    fn calculate_drawdown(records: &[TradeRecord], initial_cash: f64) -> (f64, f64) {
        let mut peak = initial_cash;
        let mut equity = initial_cash;
        let mut max_dd = 0.0;
        let mut max_dd_pct = 0.0;

        for record in records {
            equity += record.net_pnl;
            if equity > peak {
                peak = equity;
            }
            let drawdown = peak - equity;
            if drawdown > max_dd {
                max_dd = drawdown;
                max_dd_pct = if peak > 0.0 { drawdown / peak * 100.0 } else { 0.0 };
            }
        }

        (max_dd, max_dd_pct)
    }

    /// Print a formatted report to stdout
    pub fn print_report(&self) {
        println!("\n╔═══════════════════════════════════════════════════════╗");
        println!("║              BACKTEST PERFORMANCE REPORT              ║");
        println!("╚═══════════════════════════════════════════════════════╝\n");
        println!("  Strategy:              {}", self.strategy);

        println!("\n📊 RETURN");
        println!("  Initial Cash:          {:.0}", self.initial_cash);
        println!("  Final Cash:            {:.0}", self.final_cash);
        println!("  Strategy Return:       {:+.2}%", self.total_return_pct);
        println!("  Buy & Hold:            {:+.2}%", self.buy_and_hold_pct);
        println!("  Excess:                {:+.2}%p", self.excess_return_pct());
        if let Some(accuracy) = self.accuracy {
            println!("  Model Accuracy:        {:.2}%", accuracy * 100.0);
        }

        println!("\n📈 TRADE STATISTICS");
        println!("  Total Trades:          {}", self.total_trades);
        println!(
            "  Winning Trades:        {} ({:.1}%)",
            self.winning_trades, self.win_rate
        );
        println!("  Losing Trades:         {}", self.losing_trades);

        if self.total_trades > 0 {
            println!("\n💰 WIN/LOSS ANALYSIS");
            println!("  Average Win:           {:+.3}%", self.avg_win_pct);
            println!("  Average Loss:          {:+.3}%", self.avg_loss_pct);
            println!("  Profit Factor:         {:.2}", self.profit_factor);
            println!(
                "  Max Drawdown:          {:.0} ({:.2}%)",
                self.max_drawdown, self.max_drawdown_pct
            );

            println!("\n🚪 EXIT REASONS");
            for (reason, count) in &self.exit_reasons {
                println!("  {:<22} {}", reason, count);
            }
        }

        println!("\n═════════════════════════════════════════════════════════\n");
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}
