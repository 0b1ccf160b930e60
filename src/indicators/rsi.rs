/// Relative Strength Index series using Wilder's smoothing
///
/// RSI measures the magnitude of recent price changes to evaluate
/// overbought or oversold conditions.
///
/// The first value lands at index `period` (it needs `period` deltas) and is
/// seeded with the simple average gain/loss; later values use
/// `avg = (prev * (period - 1) + current) / period`.
///
/// Values:
/// - RSI > 70: Overbought
/// - RSI < 30: Oversold
/// - 50 when there was no movement at all over the window
pub fn rsi_series(prices: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; prices.len()];
    if period == 0 || prices.len() < period + 1 {
        return out;
    }

    let mut gains = Vec::with_capacity(prices.len() - 1);
    let mut losses = Vec::with_capacity(prices.len() - 1);
    for i in 1..prices.len() {
        let change = prices[i] - prices[i - 1];
        gains.push(change.max(0.0));
        losses.push((-change).max(0.0));
    }

    let mut avg_gain = gains[..period].iter().sum::<f64>() / period as f64;
    let mut avg_loss = losses[..period].iter().sum::<f64>() / period as f64;
    out[period] = Some(rsi_from_averages(avg_gain, avg_loss));

    let n = period as f64;
    for i in period..gains.len() {
        avg_gain = (avg_gain * (n - 1.0) + gains[i]) / n;
        avg_loss = (avg_loss * (n - 1.0) + losses[i]) / n;
        // gains[i] is the delta ending at prices[i + 1]
        out[i + 1] = Some(rsi_from_averages(avg_gain, avg_loss));
    }

    out
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        if avg_gain == 0.0 {
            return 50.0;
        }
        return 100.0;
    }

    let rs = avg_gain / avg_loss;
    100.0 - (100.0 / (1.0 + rs))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn latest_rsi(prices: &[f64], period: usize) -> Option<f64> {
        rsi_series(prices, period).last().copied().flatten()
    }

    #[test]
    fn test_rsi_calculation() {
        // Test with known values
        let prices = vec![
            44.0, 44.25, 44.5, 43.75, 44.0, 44.5, 45.0, 45.5, 45.25, 45.5, 46.0, 46.5, 46.25,
            46.0, 46.5,
        ];

        let rsi = latest_rsi(&prices, 14);
        assert!(rsi.is_some());

        let rsi_value = rsi.unwrap();
        assert!(rsi_value > 0.0 && rsi_value < 100.0);
    }

    #[test]
    fn test_rsi_insufficient_data() {
        let prices = vec![100.0, 102.0, 101.0];
        let rsi = latest_rsi(&prices, 14);
        assert!(rsi.is_none());
    }

    #[test]
    fn test_rsi_all_gains() {
        let prices = vec![100.0, 101.0, 102.0, 103.0, 104.0, 105.0];
        let rsi = latest_rsi(&prices, 5);
        assert!(rsi.is_some());
        assert_eq!(rsi.unwrap(), 100.0); // All gains = RSI 100
    }

    #[test]
    fn test_rsi_flat_is_neutral() {
        let prices = vec![100.0; 10];
        assert_eq!(latest_rsi(&prices, 5), Some(50.0));
    }

    #[test]
    fn test_rsi_series_warmup() {
        let prices: Vec<f64> = (0..20).map(|i| 100.0 + (i % 3) as f64).collect();
        let series = rsi_series(&prices, 14);
        assert!(series[..14].iter().all(|v| v.is_none()));
        assert!(series[14..].iter().all(|v| v.is_some()));
    }

    #[test]
    fn test_wilder_smoothing_step() {
        // Gains 1,1 then a loss of 2 with period 2
        let prices = vec![10.0, 11.0, 12.0, 10.0];
        let series = rsi_series(&prices, 2);
        assert_eq!(series[2], Some(100.0));
        // avg_gain = (1*1 + 0)/2 = 0.5, avg_loss = (0*1 + 2)/2 = 1.0
        let expected = 100.0 - 100.0 / (1.0 + 0.5);
        assert!((series[3].unwrap() - expected).abs() < 1e-12);
    }
}
