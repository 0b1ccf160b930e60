use super::moving_average::sma_series;

/// Bollinger Bands aligned with the input closes
#[derive(Debug, Clone, PartialEq)]
pub struct BollingerBands {
    pub upper: Vec<Option<f64>>,
    pub middle: Vec<Option<f64>>,
    pub lower: Vec<Option<f64>>,
    /// (close - lower) / (upper - lower), 0.5 when the bands collapse
    pub percent_b: Vec<Option<f64>>,
}

/// Rolling mean ± `num_std` population standard deviations of close
pub fn bollinger_bands(closes: &[f64], period: usize, num_std: f64) -> BollingerBands {
    let middle = sma_series(closes, period);
    let mut upper = vec![None; closes.len()];
    let mut lower = vec![None; closes.len()];
    let mut percent_b = vec![None; closes.len()];

    for (i, mean) in middle.iter().enumerate() {
        let Some(mean) = *mean else { continue };

        let window = &closes[i + 1 - period..=i];
        let variance = window.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / period as f64;
        let std = variance.sqrt();

        let up = mean + num_std * std;
        let low = mean - num_std * std;
        let width = up - low;

        upper[i] = Some(up);
        lower[i] = Some(low);
        percent_b[i] = Some(if width > 0.0 {
            (closes[i] - low) / width
        } else {
            0.5
        });
    }

    BollingerBands {
        upper,
        middle,
        lower,
        percent_b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_prices_give_neutral_percent_b() {
        let bands = bollinger_bands(&[100.0; 25], 20, 2.0);
        assert_eq!(bands.percent_b[19], Some(0.5));
        assert_eq!(bands.upper[24], Some(100.0));
        assert_eq!(bands.lower[24], Some(100.0));
    }

    #[test]
    fn test_bands_bracket_the_mean() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + (i % 5) as f64).collect();
        let bands = bollinger_bands(&closes, 20, 2.0);

        assert!(bands.upper[18].is_none());
        let (up, mid, low) = (
            bands.upper[29].unwrap(),
            bands.middle[29].unwrap(),
            bands.lower[29].unwrap(),
        );
        assert!(up > mid && mid > low);
        assert!(((up - mid) - (mid - low)).abs() < 1e-9);
    }

    #[test]
    fn test_close_at_upper_band_is_one() {
        // Population std of [0, 2] is 1, so upper = 1 + 1 = 2 with num_std 1
        let bands = bollinger_bands(&[0.0, 2.0], 2, 1.0);
        assert_eq!(bands.percent_b[1], Some(1.0));
    }
}
