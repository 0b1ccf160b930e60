/// Simple Moving Average series, aligned with `values`
///
/// Entry `i` is the mean of `values[i + 1 - period..=i]`, or `None` until the
/// window is full.
pub fn sma_series(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let wrapped: Vec<Option<f64>> = values.iter().copied().map(Some).collect();
    sma_series_opt(&wrapped, period)
}

/// SMA over a series that may contain gaps (e.g. another indicator's warm-up).
/// A window containing any `None` yields `None`.
pub fn sma_series_opt(values: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if period == 0 {
        return out;
    }

    for i in (period - 1)..values.len() {
        let window = &values[i + 1 - period..=i];
        let sum: Option<f64> = window.iter().copied().sum();
        out[i] = sum.map(|s| s / period as f64);
    }

    out
}

/// Exponential Moving Average series, seeded with the SMA of the first `period` values
pub fn ema_series(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let wrapped: Vec<Option<f64>> = values.iter().copied().map(Some).collect();
    ema_series_opt(&wrapped, period)
}

/// EMA over a gappy series. The average (re)seeds from the SMA of the first
/// `period` consecutive values after any gap.
pub fn ema_series_opt(values: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if period == 0 {
        return out;
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let mut ema: Option<f64> = None;
    let mut run: Vec<f64> = Vec::with_capacity(period);

    for (i, value) in values.iter().enumerate() {
        match (*value, ema) {
            (None, _) => {
                ema = None;
                run.clear();
            }
            (Some(v), Some(prev)) => {
                let next = (v - prev) * multiplier + prev;
                ema = Some(next);
                out[i] = ema;
            }
            (Some(v), None) => {
                run.push(v);
                if run.len() == period {
                    let seed = run.iter().sum::<f64>() / period as f64;
                    ema = Some(seed);
                    out[i] = ema;
                    run.clear();
                }
            }
        }
    }

    out
}
