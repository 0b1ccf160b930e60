//! Volatility breakout entry target
//!
//! target = session open + previous session range × K. K is either fixed or
//! follows the previous session's noise ratio `1 - |open - close| / (high - low)`.

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};

use crate::models::Candle;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BreakoutK {
    Fixed { k: f64 },
    /// `k_min` at noise ≤ 0.4, `k_max` at noise ≥ 0.7, linear in between
    Dynamic { k_min: f64, k_max: f64 },
}

const NOISE_LOW: f64 = 0.4;
const NOISE_HIGH: f64 = 0.7;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BreakoutParams {
    pub k: BreakoutK,
    /// Abandon the session when price is already this far above target
    pub max_slippage: Option<f64>,
}

impl BreakoutParams {
    pub fn k_for(&self, previous: &Candle) -> f64 {
        match self.k {
            BreakoutK::Fixed { k } => k,
            BreakoutK::Dynamic { k_min, k_max } => dynamic_k(previous, k_min, k_max),
        }
    }

    /// Entry trigger for a session opening at `session_open`
    pub fn target(&self, session_open: f64, previous: &Candle) -> f64 {
        session_open + previous.range() * self.k_for(previous)
    }
}

/// Share of the session range that was not net movement; `None` on a zero range
pub fn noise_ratio(session: &Candle) -> Option<f64> {
    let range = session.range();
    if range <= 0.0 {
        return None;
    }
    Some(1.0 - (session.open - session.close).abs() / range)
}

pub fn dynamic_k(previous: &Candle, k_min: f64, k_max: f64) -> f64 {
    match noise_ratio(previous) {
        None => k_max,
        Some(noise) if noise <= NOISE_LOW => k_min,
        Some(noise) if noise >= NOISE_HIGH => k_max,
        Some(noise) => k_min + (noise - NOISE_LOW) / (NOISE_HIGH - NOISE_LOW) * (k_max - k_min),
    }
}

/// Collapse intraday candles into one bar per session date
pub fn session_bars(candles: &[Candle], offset: FixedOffset) -> Vec<Candle> {
    let mut bars: Vec<Candle> = Vec::new();
    let mut current_date = None;

    for candle in candles {
        let date = candle.session_date(offset);
        if current_date == Some(date) {
            if let Some(bar) = bars.last_mut() {
                bar.high = bar.high.max(candle.high);
                bar.low = bar.low.min(candle.low);
                bar.close = candle.close;
                bar.volume += candle.volume;
                continue;
            }
        }
        bars.push(candle.clone());
        current_date = Some(date);
    }

    bars
}
