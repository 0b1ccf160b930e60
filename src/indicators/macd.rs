use super::moving_average::{ema_series, ema_series_opt};

/// MACD line, signal line and histogram aligned with the input closes
#[derive(Debug, Clone, PartialEq)]
pub struct MacdSeries {
    pub macd: Vec<Option<f64>>,
    pub signal: Vec<Option<f64>>,
    pub histogram: Vec<Option<f64>>,
}

/// Moving Average Convergence Divergence
///
/// # Arguments
/// * `fast` - fast EMA period (12)
/// * `slow` - slow EMA period (26)
/// * `signal` - EMA period of the MACD line (9)
pub fn macd_series(closes: &[f64], fast: usize, slow: usize, signal: usize) -> MacdSeries {
    let fast_ema = ema_series(closes, fast);
    let slow_ema = ema_series(closes, slow);

    let macd: Vec<Option<f64>> = fast_ema
        .iter()
        .zip(&slow_ema)
        .map(|(f, s)| Some((*f)? - (*s)?))
        .collect();

    let signal_line = ema_series_opt(&macd, signal);
    let histogram = macd
        .iter()
        .zip(&signal_line)
        .map(|(m, s)| Some((*m)? - (*s)?))
        .collect();

    MacdSeries {
        macd,
        signal: signal_line,
        histogram,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_macd_warmup() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + i as f64 * 0.5).collect();
        let series = macd_series(&closes, 12, 26, 9);

        // slow EMA first defined at 25, signal needs 9 MACD values
        assert!(series.macd[24].is_none());
        assert!(series.macd[25].is_some());
        assert!(series.signal[32].is_none());
        assert!(series.signal[33].is_some());
        assert!(series.histogram[33].is_some());
    }

    #[test]
    fn test_macd_positive_in_uptrend() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + i as f64).collect();
        let series = macd_series(&closes, 12, 26, 9);
        assert!(series.macd[59].unwrap() > 0.0);
    }

    #[test]
    fn test_macd_zero_on_flat() {
        let series = macd_series(&[50.0; 40], 12, 26, 9);
        assert_eq!(series.macd[39], Some(0.0));
        assert_eq!(series.histogram[39], Some(0.0));
    }
}
