// Technical indicators module
// Series versions of RSI, MA, MACD, Bollinger, StochRSI, ATR aligned with the input

pub mod atr;
pub mod bollinger;
pub mod macd;
pub mod moving_average;
pub mod rolling;
pub mod rsi;
pub mod stoch_rsi;

pub use atr::atr_series;
pub use bollinger::{bollinger_bands, BollingerBands};
pub use macd::{macd_series, MacdSeries};
pub use moving_average::{ema_series, sma_series};
pub use rolling::{pct_change, rolling_mean, rolling_std};
pub use rsi::rsi_series;
pub use stoch_rsi::{stoch_rsi_series, StochRsi};
