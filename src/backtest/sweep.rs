//! Grid search over entry and exit thresholds
//!
//! Every combination replays the same walk-forward probability stream, so the
//! classifier is trained once and only the state machine runs per cell.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::backtest::metrics::BacktestMetrics;
use crate::backtest::runner::BacktestRunner;
use crate::error::EngineResult;
use crate::features::FeatureTable;
use crate::strategy::StrategyParams;
use crate::walk_forward::WalkForwardReport;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SweepGrid {
    pub buy_thresholds: Vec<f64>,
    pub take_profits: Vec<f64>,
    pub stop_losses: Vec<f64>,
}

impl Default for SweepGrid {
    fn default() -> Self {
        Self {
            buy_thresholds: vec![0.55, 0.60, 0.65, 0.70],
            take_profits: vec![0.010, 0.015, 0.020, 0.025],
            stop_losses: vec![-0.008, -0.010, -0.012, -0.015],
        }
    }
}

impl SweepGrid {
    pub fn len(&self) -> usize {
        self.buy_thresholds.len() * self.take_profits.len() * self.stop_losses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// One strategy per grid cell, everything else taken from `base`
    pub fn expand(&self, base: &StrategyParams) -> Vec<StrategyParams> {
        let mut cells = Vec::with_capacity(self.len());
        for &buy in &self.buy_thresholds {
            for &tp in &self.take_profits {
                for &sl in &self.stop_losses {
                    cells.push(StrategyParams {
                        name: format!("{} buy={:.2} tp={:.3} sl={:.3}", base.name, buy, tp, sl),
                        buy_threshold: Some(buy),
                        take_profit: Some(tp),
                        stop_loss: Some(sl),
                        ..base.clone()
                    });
                }
            }
        }
        cells
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepResult {
    pub buy_threshold: f64,
    pub take_profit: f64,
    pub stop_loss: f64,
    pub metrics: BacktestMetrics,
}

/// Replay every grid cell in parallel; best total return first
pub fn run_sweep(
    runner: &BacktestRunner,
    base: &StrategyParams,
    grid: &SweepGrid,
    table: &FeatureTable,
    report: &WalkForwardReport,
) -> EngineResult<Vec<SweepResult>> {
    let cells = grid.expand(base);
    tracing::info!(cells = cells.len(), strategy = %base.name, "🔍 Parameter sweep started");

    let mut results = cells
        .par_iter()
        .map(|params| {
            let metrics = runner.run(params, table, report)?;
            Ok(SweepResult {
                buy_threshold: params.buy_threshold.unwrap_or_default(),
                take_profit: params.take_profit.unwrap_or_default(),
                stop_loss: params.stop_loss.unwrap_or_default(),
                metrics,
            })
        })
        .collect::<EngineResult<Vec<_>>>()?;

    results.sort_by(|a, b| {
        b.metrics
            .total_return_pct
            .total_cmp(&a.metrics.total_return_pct)
    });

    if let Some(best) = results.first() {
        tracing::info!(
            buy = best.buy_threshold,
            tp = best.take_profit,
            sl = best.stop_loss,
            return_pct = best.metrics.total_return_pct,
            "🏆 Best sweep cell"
        );
    }
    Ok(results)
}
