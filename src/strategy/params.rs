use serde::{Deserialize, Serialize};

use super::breakout::{BreakoutK, BreakoutParams};
use crate::error::{EngineError, EngineResult};
use crate::models::FeeSchedule;

/// Trailing stop: armed once profit reaches `activate`, fires on a `distance`
/// pullback from the post-entry high
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TrailingStop {
    pub activate: f64,
    pub distance: f64,
}

/// Exit when the up-probability drops below `sell_threshold`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SignalReversal {
    pub sell_threshold: f64,
    /// Only exit on reversal while the position is in profit
    pub requires_profit: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Reentry {
    /// Re-enter on any later tick after an exit
    Unlimited,
    /// One round trip per session
    OncePerSession,
}

/// Strategy variant as configuration
///
/// Every optional rule that is `None` never fires.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StrategyParams {
    pub name: String,
    /// Enter when up-probability ≥ this; `None` ignores the model
    pub buy_threshold: Option<f64>,
    /// Additionally require price ≥ the session's breakout target
    pub breakout: Option<BreakoutParams>,
    pub take_profit: Option<f64>,
    /// Negative return, e.g. -0.012
    pub stop_loss: Option<f64>,
    pub trailing: Option<TrailingStop>,
    pub reversal: Option<SignalReversal>,
    pub reentry: Reentry,
    pub force_exit_at_session_end: bool,
    /// Share of available cash committed per entry
    pub position_ratio: f64,
    pub fees: FeeSchedule,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self::ai_scalper()
    }
}

impl StrategyParams {
    /// 5-minute AI scalping, backtest thresholds; may hold across sessions
    pub fn ai_scalper() -> Self {
        Self {
            name: "ai-scalper".to_string(),
            buy_threshold: Some(0.65),
            breakout: None,
            take_profit: Some(0.015),
            stop_loss: Some(-0.012),
            trailing: Some(TrailingStop {
                activate: 0.01,
                distance: 0.005,
            }),
            reversal: Some(SignalReversal {
                sell_threshold: 0.40,
                requires_profit: true,
            }),
            reentry: Reentry::Unlimited,
            force_exit_at_session_end: false,
            position_ratio: 0.80,
            fees: FeeSchedule::default(),
        }
    }

    /// Live AI scalper: tighter exits, flat by the close
    pub fn ai_scalper_live() -> Self {
        Self {
            name: "ai-scalper-live".to_string(),
            take_profit: Some(0.01),
            stop_loss: Some(-0.01),
            trailing: Some(TrailingStop {
                activate: 0.007,
                distance: 0.003,
            }),
            force_exit_at_session_end: true,
            ..Self::ai_scalper()
        }
    }

    /// Daily-bar AI swing; reversal exits regardless of profit
    pub fn ai_daily() -> Self {
        Self {
            name: "ai-daily".to_string(),
            buy_threshold: Some(0.60),
            breakout: None,
            take_profit: Some(0.03),
            stop_loss: Some(-0.02),
            trailing: None,
            reversal: Some(SignalReversal {
                sell_threshold: 0.40,
                requires_profit: false,
            }),
            reentry: Reentry::Unlimited,
            force_exit_at_session_end: false,
            position_ratio: 0.95,
            fees: FeeSchedule::default(),
        }
    }

    /// Daily model traded live: one entry per day, held overnight until TP or SL
    pub fn ai_daily_live() -> Self {
        Self {
            name: "ai-daily-live".to_string(),
            take_profit: Some(0.01),
            stop_loss: Some(-0.01),
            reversal: None,
            reentry: Reentry::OncePerSession,
            position_ratio: 0.70,
            fees: FeeSchedule {
                buy_fee: 0.00004,
                sell_fee: 0.00004,
            },
            ..Self::ai_daily()
        }
    }

    /// Breakout (fixed K 0.3) confirmed by the model, one entry per session
    pub fn combined() -> Self {
        Self {
            name: "combined".to_string(),
            buy_threshold: Some(0.60),
            breakout: Some(BreakoutParams {
                k: BreakoutK::Fixed { k: 0.3 },
                max_slippage: None,
            }),
            reentry: Reentry::OncePerSession,
            ..Self::ai_scalper_live()
        }
    }

    /// Pure volatility breakout with dynamic K, held until the session cutoff
    pub fn volatility_breakout() -> Self {
        Self {
            name: "volatility-breakout".to_string(),
            buy_threshold: None,
            breakout: Some(BreakoutParams {
                k: BreakoutK::Dynamic {
                    k_min: 0.3,
                    k_max: 0.6,
                },
                max_slippage: Some(0.01),
            }),
            take_profit: None,
            stop_loss: None,
            trailing: None,
            reversal: None,
            reentry: Reentry::OncePerSession,
            force_exit_at_session_end: true,
            position_ratio: 0.70,
            fees: FeeSchedule {
                buy_fee: 0.00004,
                sell_fee: 0.00004,
            },
        }
    }

    /// Preset by name, as used on the command line
    pub fn preset(name: &str) -> EngineResult<Self> {
        match name {
            "ai-scalper" => Ok(Self::ai_scalper()),
            "ai-scalper-live" => Ok(Self::ai_scalper_live()),
            "ai-daily" => Ok(Self::ai_daily()),
            "ai-daily-live" => Ok(Self::ai_daily_live()),
            "combined" => Ok(Self::combined()),
            "volatility-breakout" => Ok(Self::volatility_breakout()),
            other => Err(EngineError::InvalidConfig(format!(
                "unknown strategy preset '{}'",
                other
            ))),
        }
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.buy_threshold.is_none() && self.breakout.is_none() {
            return Err(EngineError::InvalidConfig(format!(
                "{}: needs a buy threshold or a breakout rule",
                self.name
            )));
        }
        if !(self.position_ratio > 0.0 && self.position_ratio <= 1.0) {
            return Err(EngineError::InvalidConfig(format!(
                "{}: position_ratio must be in (0, 1]",
                self.name
            )));
        }
        if self.stop_loss.is_some_and(|sl| sl >= 0.0) {
            return Err(EngineError::InvalidConfig(format!(
                "{}: stop_loss must be negative",
                self.name
            )));
        }
        if self.take_profit.is_some_and(|tp| tp <= 0.0) {
            return Err(EngineError::InvalidConfig(format!(
                "{}: take_profit must be positive",
                self.name
            )));
        }
        if let Some(trailing) = self.trailing {
            if trailing.distance <= 0.0 || trailing.activate < 0.0 {
                return Err(EngineError::InvalidConfig(format!(
                    "{}: trailing stop needs activate ≥ 0 and distance > 0",
                    self.name
                )));
            }
        }
        Ok(())
    }
}
