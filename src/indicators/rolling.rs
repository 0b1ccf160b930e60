/// Rolling mean over `window` values
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<Option<f64>> {
    super::moving_average::sma_series(values, window)
}

/// Rolling standard deviation with `ddof` delta degrees of freedom (1 = sample std)
pub fn rolling_std(values: &[f64], window: usize, ddof: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if window == 0 || window <= ddof {
        return out;
    }

    for i in (window - 1)..values.len() {
        let slice = &values[i + 1 - window..=i];
        let mean = slice.iter().sum::<f64>() / window as f64;
        let sum_sq = slice.iter().map(|v| (v - mean).powi(2)).sum::<f64>();
        out[i] = Some((sum_sq / (window - ddof) as f64).sqrt());
    }

    out
}

/// Fractional change versus `lag` values earlier; `None` when the base is zero
pub fn pct_change(values: &[f64], lag: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if lag == 0 {
        return out;
    }

    for i in lag..values.len() {
        let base = values[i - lag];
        if base != 0.0 {
            out[i] = Some(values[i] / base - 1.0);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rolling_std_sample() {
        // Sample std of [2, 4, 4, 4, 5, 5, 7, 9] is sqrt(32/7)
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let std = rolling_std(&values, 8, 1);
        assert!((std[7].unwrap() - (32.0f64 / 7.0).sqrt()).abs() < 1e-12);
        assert!(std[6].is_none());
    }

    #[test]
    fn test_pct_change() {
        let changes = pct_change(&[100.0, 110.0, 99.0], 1);
        assert_eq!(changes[0], None);
        assert!((changes[1].unwrap() - 0.1).abs() < 1e-12);
        assert!((changes[2].unwrap() + 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_pct_change_zero_base() {
        let changes = pct_change(&[0.0, 5.0], 1);
        assert_eq!(changes[1], None);
    }
}
