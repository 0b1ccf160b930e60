//! Average True Range (ATR) indicator
//!
//! Measures market volatility by calculating the average of true ranges over a period.
//! True Range is the greatest of:
//! - Current High - Current Low
//! - Abs(Current High - Previous Close)
//! - Abs(Current Low - Previous Close)
//!
//! Uses Wilder's smoothing (same as RSI) for the moving average.
use crate::models::Candle;

/// True range of `candles[i]`, undefined for the first candle
fn true_range(candles: &[Candle], i: usize) -> f64 {
    let high = candles[i].high;
    let low = candles[i].low;
    let prev_close = candles[i - 1].close;

    (high - low)
        .max((high - prev_close).abs())
        .max((low - prev_close).abs())
}

/// ATR series aligned with `candles`
///
/// The first value sits at index `period`: the simple average of the first
/// `period` true ranges. Later values apply Wilder's smoothing.
pub fn atr_series(candles: &[Candle], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; candles.len()];
    if period == 0 || candles.len() < period + 1 {
        return out;
    }

    let true_ranges: Vec<f64> = (1..candles.len()).map(|i| true_range(candles, i)).collect();

    // First ATR is simple average of first 'period' true ranges
    let mut atr = true_ranges[..period].iter().sum::<f64>() / period as f64;
    out[period] = Some(atr);

    for i in period..true_ranges.len() {
        atr = (atr * (period as f64 - 1.0) + true_ranges[i]) / period as f64;
        out[i + 1] = Some(atr);
    }

    out
}
