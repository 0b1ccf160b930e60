use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::params::{Reentry, StrategyParams};
use crate::error::{EngineError, EngineResult};
use crate::models::{Candle, ExitReason, Trade};

/// Open position bookkeeping
#[derive(Debug, Clone, PartialEq)]
pub struct Holding {
    pub entry_price: f64,
    pub quantity: u64,
    pub highest_price: f64, // High-water mark since entry
    pub trailing_armed: bool,
    pub entry_time: Option<DateTime<Utc>>, // None when restored from the trade log
}

impl Holding {
    pub fn profit_rate(&self, price: f64) -> f64 {
        (price - self.entry_price) / self.entry_price
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PositionState {
    Flat,
    Holding(Holding),
    /// No further entries this session
    Done,
}

/// One evaluation step
#[derive(Debug, Clone, Copy)]
pub struct Tick {
    pub price: f64,
    /// Last known up-probability; may be up to one refresh interval old
    pub probability: Option<f64>,
    pub timestamp: DateTime<Utc>,
    pub available_cash: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    InsufficientFunds,
    SlippageExceeded,
}

/// Intent produced by a tick; nothing changes until it is committed
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    Buy { quantity: u64, price: f64 },
    Sell {
        reason: ExitReason,
        quantity: u64,
        price: f64,
    },
    Hold,
    Skip(SkipReason),
}

/// Confirmed execution
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fill {
    pub price: f64,
    pub quantity: u64,
    pub timestamp: DateTime<Utc>,
}

/// Shares affordable with `cash × ratio` once the buy fee is included
pub fn entry_quantity(cash: f64, position_ratio: f64, price: f64, buy_fee: f64) -> u64 {
    if cash <= 0.0 || price <= 0.0 {
        return 0;
    }
    (cash * position_ratio / (price * (1.0 + buy_fee))).floor() as u64
}

/// Flat/Holding/Done state machine shared by every strategy variant
///
/// `on_tick` only proposes; the caller executes the order and then calls
/// `commit_entry` or `commit_exit`. An order that fails is never committed,
/// which leaves the state exactly as it was.
#[derive(Debug, Clone)]
pub struct PositionMachine {
    params: StrategyParams,
    state: PositionState,
    session_target: Option<f64>,
}

impl PositionMachine {
    pub fn new(params: StrategyParams) -> Self {
        Self {
            params,
            state: PositionState::Flat,
            session_target: None,
        }
    }

    pub fn params(&self) -> &StrategyParams {
        &self.params
    }

    pub fn state(&self) -> &PositionState {
        &self.state
    }

    pub fn holding(&self) -> Option<&Holding> {
        match &self.state {
            PositionState::Holding(holding) => Some(holding),
            _ => None,
        }
    }

    pub fn is_holding(&self) -> bool {
        self.holding().is_some()
    }

    pub fn session_target(&self) -> Option<f64> {
        self.session_target
    }

    /// Net return of a round trip under this strategy's fees
    pub fn net_return(&self, entry_price: f64, exit_price: f64) -> f64 {
        self.params.fees.net_return(entry_price, exit_price)
    }

    /// Breakout target for a session, if this variant uses one
    pub fn breakout_target(&self, session_open: f64, previous: Option<&Candle>) -> Option<f64> {
        let breakout = self.params.breakout.as_ref()?;
        previous.map(|prev| breakout.target(session_open, prev))
    }

    /// Begin a new session: `Done` becomes `Flat` again, an open position is kept
    pub fn start_session(&mut self, target: Option<f64>) {
        if self.state == PositionState::Done {
            self.state = PositionState::Flat;
        }
        self.session_target = target;
        if let Some(target) = target {
            tracing::debug!(target_price = target, "🎯 Session breakout target set");
        }
    }

    /// Replace the breakout target mid-session without touching the state
    pub fn set_session_target(&mut self, target: Option<f64>) {
        self.session_target = target;
    }

    /// Resume a position found unclosed in the trade log
    ///
    /// Returns false (and changes nothing) unless flat with a usable entry.
    pub fn restore(&mut self, entry_price: f64, quantity: u64) -> bool {
        if self.state != PositionState::Flat || quantity == 0 || entry_price <= 0.0 {
            return false;
        }
        self.state = PositionState::Holding(Holding {
            entry_price,
            quantity,
            highest_price: entry_price,
            trailing_armed: false,
            entry_time: None,
        });
        tracing::info!(entry_price, quantity, "♻️ Restored open position");
        true
    }

    pub fn on_tick(&mut self, tick: &Tick) -> Decision {
        match &self.state {
            PositionState::Flat => self.evaluate_entry(tick),
            PositionState::Holding(_) => self.evaluate_exit(tick),
            PositionState::Done => Decision::Hold,
        }
    }

    fn evaluate_entry(&mut self, tick: &Tick) -> Decision {
        if let Some(breakout) = &self.params.breakout {
            let Some(target) = self.session_target else {
                return Decision::Hold;
            };
            if tick.price < target {
                return Decision::Hold;
            }
            if let Some(max_slippage) = breakout.max_slippage {
                if tick.price > target * (1.0 + max_slippage) {
                    tracing::info!(
                        price = tick.price,
                        target_price = target,
                        "⏭️ Breakout too far above target, sitting out the session"
                    );
                    self.state = PositionState::Done;
                    return Decision::Skip(SkipReason::SlippageExceeded);
                }
            }
        }

        if let Some(threshold) = self.params.buy_threshold {
            match tick.probability {
                Some(p) if p >= threshold => {}
                _ => return Decision::Hold,
            }
        }

        let quantity = entry_quantity(
            tick.available_cash,
            self.params.position_ratio,
            tick.price,
            self.params.fees.buy_fee,
        );
        if quantity == 0 {
            tracing::debug!(
                cash = tick.available_cash,
                price = tick.price,
                "Entry skipped, insufficient funds"
            );
            return Decision::Skip(SkipReason::InsufficientFunds);
        }

        Decision::Buy {
            quantity,
            price: tick.price,
        }
    }

    /// Sell rules see the trailing state from the start of the tick; the
    /// high-water mark and arming are updated only when no rule fires.
    fn evaluate_exit(&mut self, tick: &Tick) -> Decision {
        let params = &self.params;
        let PositionState::Holding(holding) = &mut self.state else {
            return Decision::Hold;
        };
        let price = tick.price;
        let profit = holding.profit_rate(price);

        let reason = if params.take_profit.is_some_and(|tp| profit >= tp) {
            Some(ExitReason::TakeProfit)
        } else if params.stop_loss.is_some_and(|sl| profit <= sl) {
            Some(ExitReason::StopLoss)
        } else if params.trailing.is_some_and(|trailing| {
            holding.trailing_armed
                && (price - holding.highest_price) / holding.highest_price <= -trailing.distance
        }) {
            Some(ExitReason::TrailingStop)
        } else if params.reversal.is_some_and(|reversal| {
            tick.probability
                .is_some_and(|p| p < reversal.sell_threshold)
                && (!reversal.requires_profit || profit > 0.0)
        }) {
            Some(ExitReason::SignalReversal)
        } else {
            None
        };

        if let Some(reason) = reason {
            return Decision::Sell {
                reason,
                quantity: holding.quantity,
                price,
            };
        }

        holding.highest_price = holding.highest_price.max(price);
        if let Some(trailing) = params.trailing {
            if !holding.trailing_armed && profit >= trailing.activate {
                holding.trailing_armed = true;
                tracing::debug!(
                    profit_pct = profit * 100.0,
                    high = holding.highest_price,
                    "Trailing stop armed"
                );
            }
        }
        Decision::Hold
    }

    /// Forced liquidation intent when the session closes while holding
    pub fn on_session_end(&self, price: f64) -> Decision {
        match &self.state {
            PositionState::Holding(holding) if self.params.force_exit_at_session_end => {
                Decision::Sell {
                    reason: ExitReason::ForcedLiquidation,
                    quantity: holding.quantity,
                    price,
                }
            }
            _ => Decision::Hold,
        }
    }

    /// Liquidate whatever is held at the end of a replay
    pub fn on_end_of_data(&self, price: f64) -> Decision {
        match &self.state {
            PositionState::Holding(holding) => Decision::Sell {
                reason: ExitReason::EndOfData,
                quantity: holding.quantity,
                price,
            },
            _ => Decision::Hold,
        }
    }

    pub fn commit_entry(&mut self, fill: Fill) -> EngineResult<()> {
        if self.state != PositionState::Flat {
            return Err(EngineError::InvalidTransition(format!(
                "entry committed while {:?}",
                self.state
            )));
        }
        if fill.quantity == 0 || fill.price <= 0.0 {
            return Err(EngineError::InvalidTransition(format!(
                "empty fill {} @ {}",
                fill.quantity, fill.price
            )));
        }

        self.state = PositionState::Holding(Holding {
            entry_price: fill.price,
            quantity: fill.quantity,
            highest_price: fill.price,
            trailing_armed: false,
            entry_time: Some(fill.timestamp),
        });
        tracing::info!(
            strategy = %self.params.name,
            price = fill.price,
            quantity = fill.quantity,
            "📈 Position opened"
        );
        Ok(())
    }

    /// Close the position at a confirmed price and return the finished trade
    pub fn commit_exit(
        &mut self,
        reason: ExitReason,
        price: f64,
        timestamp: DateTime<Utc>,
    ) -> EngineResult<Trade> {
        let PositionState::Holding(holding) = &self.state else {
            return Err(EngineError::InvalidTransition(format!(
                "exit committed while {:?}",
                self.state
            )));
        };

        let trade = Trade {
            id: Uuid::new_v4(),
            entry_time: holding.entry_time,
            exit_time: Some(timestamp),
            entry_price: holding.entry_price,
            exit_price: price,
            quantity: holding.quantity,
            exit_reason: reason,
        };

        self.state = match self.params.reentry {
            Reentry::Unlimited => PositionState::Flat,
            Reentry::OncePerSession => PositionState::Done,
        };

        tracing::info!(
            strategy = %self.params.name,
            price,
            quantity = trade.quantity,
            reason = %reason,
            net_return_pct = self.net_return(trade.entry_price, price) * 100.0,
            "📉 Position closed"
        );
        Ok(trade)
    }
}
