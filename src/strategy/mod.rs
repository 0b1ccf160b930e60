// Strategy module
// One parameterised position state machine; each strategy variant is a StrategyParams value

pub mod breakout;
pub mod machine;
pub mod params;

pub use breakout::{dynamic_k, noise_ratio, session_bars, BreakoutK, BreakoutParams};
pub use machine::{
    entry_quantity, Decision, Fill, Holding, PositionMachine, PositionState, SkipReason, Tick,
};
pub use params::{Reentry, SignalReversal, StrategyParams, TrailingStop};
