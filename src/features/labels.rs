use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::models::Candle;

/// Which price a hypothetical entry at row `i` would get
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LabelMode {
    /// Enter at `close[i]`
    Immediate,
    /// Enter at `open[i + 1]`, the next session's open
    NextOpen,
}

/// Forward-looking binary label definition
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LabelConfig {
    /// Number of future candles inspected (H)
    pub horizon: usize,
    /// Required max-high gain over the entry price
    pub profit_target: f64,
    pub mode: LabelMode,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self::intraday()
    }
}

impl LabelConfig {
    /// 5-minute bars: +0.8% within the next 6 candles, entering at the close
    pub fn intraday() -> Self {
        Self {
            horizon: 6,
            profit_target: 0.008,
            mode: LabelMode::Immediate,
        }
    }

    /// Daily bars: +3% within 5 sessions, entering at the next open
    pub fn daily() -> Self {
        Self {
            horizon: 5,
            profit_target: 0.03,
            mode: LabelMode::NextOpen,
        }
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.horizon == 0 {
            return Err(EngineError::InvalidConfig(
                "label horizon must be at least 1".to_string(),
            ));
        }
        if self.profit_target.is_nan() || self.profit_target <= 0.0 {
            return Err(EngineError::InvalidConfig(format!(
                "profit target must be positive, got {}",
                self.profit_target
            )));
        }
        Ok(())
    }
}

/// Label of row `i`, or `None` when fewer than `horizon` future candles exist
///
/// Reads only `candles[i]` (immediate entry) and `candles[i + 1..=i + horizon]`.
pub fn label_at(candles: &[Candle], i: usize, config: &LabelConfig) -> Option<bool> {
    if i + config.horizon >= candles.len() {
        return None;
    }

    let entry = match config.mode {
        LabelMode::Immediate => candles[i].close,
        LabelMode::NextOpen => candles[i + 1].open,
    };
    if entry <= 0.0 {
        return Some(false);
    }

    let max_high = candles[i + 1..=i + config.horizon]
        .iter()
        .map(|c| c.high)
        .fold(f64::NEG_INFINITY, f64::max);

    Some(max_high / entry - 1.0 >= config.profit_target)
}

/// Labels for every candle, aligned with the input
pub fn compute_labels(candles: &[Candle], config: &LabelConfig) -> Vec<Option<bool>> {
    (0..candles.len())
        .map(|i| label_at(candles, i, config))
        .collect()
}
