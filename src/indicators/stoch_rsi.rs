use super::moving_average::sma_series_opt;
use super::rsi::rsi_series;

/// Stochastic RSI %K and %D lines
#[derive(Debug, Clone, PartialEq)]
pub struct StochRsi {
    pub k: Vec<Option<f64>>,
    pub d: Vec<Option<f64>>,
}

/// RSI normalised by its own rolling min/max (0-100), smoothed into %K and %D
///
/// A window where RSI did not move yields 50.
pub fn stoch_rsi_series(
    closes: &[f64],
    rsi_period: usize,
    stoch_period: usize,
    k_smooth: usize,
    d_smooth: usize,
) -> StochRsi {
    let rsi = rsi_series(closes, rsi_period);
    let mut raw = vec![None; closes.len()];

    if stoch_period > 0 {
        for i in (stoch_period - 1)..rsi.len() {
            let window: Option<Vec<f64>> = rsi[i + 1 - stoch_period..=i].iter().copied().collect();
            let Some(window) = window else { continue };

            let min = window.iter().copied().fold(f64::INFINITY, f64::min);
            let max = window.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let current = window[window.len() - 1];

            raw[i] = Some(if max > min {
                (current - min) / (max - min) * 100.0
            } else {
                50.0
            });
        }
    }

    let k = sma_series_opt(&raw, k_smooth);
    let d = sma_series_opt(&k, d_smooth);
    StochRsi { k, d }
}
