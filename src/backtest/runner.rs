use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use std::collections::HashMap;

use crate::backtest::ledger::Ledger;
use crate::backtest::metrics::BacktestMetrics;
use crate::error::{EngineError, EngineResult};
use crate::features::FeatureTable;
use crate::models::{offset_from_secs, session_date, Candle};
use crate::strategy::{session_bars, Decision, Fill, PositionMachine, StrategyParams, Tick};
use crate::walk_forward::WalkForwardReport;

/// Replays a walk-forward probability stream through one strategy variant
#[derive(Debug, Clone)]
pub struct BacktestRunner {
    initial_cash: f64,
    session_offset: FixedOffset,
}

impl Default for BacktestRunner {
    fn default() -> Self {
        Self::new(10_000_000.0, 9 * 3600)
    }
}

impl BacktestRunner {
    /// # Arguments
    /// * `initial_cash` - Starting cash for the ledger
    /// * `utc_offset_secs` - Exchange clock used to split sessions (KST is 32400)
    pub fn new(initial_cash: f64, utc_offset_secs: i32) -> Self {
        Self {
            initial_cash,
            session_offset: offset_from_secs(utc_offset_secs),
        }
    }

    pub fn initial_cash(&self) -> f64 {
        self.initial_cash
    }

    /// Run one strategy over the test rows of `report`
    ///
    /// Each prediction becomes a tick at its row's close. A session change
    /// first gives the machine a chance to force-liquidate at the previous
    /// tick, then sets the next breakout target. Whatever is still held after
    /// the last tick is sold at its close.
    pub fn run(
        &self,
        params: &StrategyParams,
        table: &FeatureTable,
        report: &WalkForwardReport,
    ) -> EngineResult<BacktestMetrics> {
        params.validate()?;

        let (first, last) = match (report.predictions.first(), report.predictions.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => {
                return Err(EngineError::InsufficientData {
                    needed: 1,
                    available: 0,
                })
            }
        };
        let row_at = move |index: usize| {
            table.rows.get(index).ok_or_else(|| {
                EngineError::InvalidConfig(format!(
                    "prediction for row {} outside a table of {} rows",
                    index,
                    table.len()
                ))
            })
        };

        let sessions = SessionIndex::new(table, self.session_offset);
        let mut machine = PositionMachine::new(params.clone());
        let mut ledger = Ledger::new(self.initial_cash, params.fees);
        let mut current_session: Option<NaiveDate> = None;
        let mut last_tick: Option<(f64, DateTime<Utc>)> = None;

        for prediction in &report.predictions {
            let row = row_at(prediction.index)?;
            let date = session_date(row.timestamp, self.session_offset);

            if current_session != Some(date) {
                if let Some((price, timestamp)) = last_tick {
                    let decision = machine.on_session_end(price);
                    apply(&mut machine, &mut ledger, decision, timestamp)?;
                }
                let target = sessions
                    .bounds(date)
                    .and_then(|(open, previous)| machine.breakout_target(open, previous));
                machine.start_session(target);
                current_session = Some(date);
            }

            let tick = Tick {
                price: row.close,
                probability: Some(prediction.probability),
                timestamp: row.timestamp,
                available_cash: ledger.cash(),
            };
            let decision = machine.on_tick(&tick);
            apply(&mut machine, &mut ledger, decision, row.timestamp)?;
            last_tick = Some((row.close, row.timestamp));
        }

        if let Some((price, timestamp)) = last_tick {
            let decision = machine.on_end_of_data(price);
            apply(&mut machine, &mut ledger, decision, timestamp)?;
        }

        let first_close = row_at(first.index)?.close;
        let last_close = row_at(last.index)?.close;
        let buy_and_hold_pct = (last_close / first_close - 1.0) * 100.0;

        let metrics = BacktestMetrics::from_trades(
            &params.name,
            ledger.trades(),
            &params.fees,
            self.initial_cash,
            ledger.cash(),
            buy_and_hold_pct,
            report.accuracy,
        );

        tracing::info!(
            strategy = %params.name,
            trades = metrics.total_trades,
            return_pct = metrics.total_return_pct,
            buy_and_hold_pct,
            "🏁 Backtest complete"
        );

        Ok(metrics)
    }

    /// Run and print the report
    pub fn run_and_report(
        &self,
        params: &StrategyParams,
        table: &FeatureTable,
        report: &WalkForwardReport,
    ) -> EngineResult<BacktestMetrics> {
        println!("\n🔬 Running backtest: {}", params.name);
        println!("   Test rows: {}", report.predictions.len());
        println!("   Initial cash: {:.0}", self.initial_cash);

        let metrics = self.run(params, table, report)?;
        metrics.print_report();
        Ok(metrics)
    }
}

/// Commit a decision to both the machine and the ledger at its decided price
fn apply(
    machine: &mut PositionMachine,
    ledger: &mut Ledger,
    decision: Decision,
    timestamp: DateTime<Utc>,
) -> EngineResult<()> {
    match decision {
        Decision::Buy { quantity, price } => {
            let fill = Fill {
                price,
                quantity,
                timestamp,
            };
            ledger.buy(&fill)?;
            machine.commit_entry(fill)?;
        }
        Decision::Sell { reason, price, .. } => {
            let trade = machine.commit_exit(reason, price, timestamp)?;
            ledger.sell(trade)?;
        }
        Decision::Hold | Decision::Skip(_) => {}
    }
    Ok(())
}

/// Per-session OHLC built from every table row, for breakout targets
struct SessionIndex {
    bars: Vec<Candle>,
    by_date: HashMap<NaiveDate, usize>,
}

impl SessionIndex {
    fn new(table: &FeatureTable, offset: FixedOffset) -> Self {
        let candles: Vec<Candle> = table
            .rows
            .iter()
            .map(|row| Candle {
                timestamp: row.timestamp,
                open: row.open,
                high: row.high,
                low: row.low,
                close: row.close,
                volume: 0.0,
            })
            .collect();
        let bars = session_bars(&candles, offset);
        let by_date = bars
            .iter()
            .enumerate()
            .map(|(i, bar)| (bar.session_date(offset), i))
            .collect();
        Self { bars, by_date }
    }

    /// Session open and the previous session's bar
    fn bounds(&self, date: NaiveDate) -> Option<(f64, Option<&Candle>)> {
        let index = *self.by_date.get(&date)?;
        let previous = index.checked_sub(1).and_then(|i| self.bars.get(i));
        Some((self.bars[index].open, previous))
    }
}
