use crate::models::Candle;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Market scenario types for synthetic data generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketScenario {
    /// Steady uptrend with noise (+2% per session on average)
    Uptrend,
    /// Steady downtrend with noise (-2% per session on average)
    Downtrend,
    /// Mean-reverting chop around the base price
    Sideways,
    /// Large swings, ±3% per candle
    Volatile,
    /// Alternating bursts of momentum and drift, so forward returns are partly predictable
    Momentum,
    /// Every 50th candle missing
    WithGaps,
}

impl MarketScenario {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "uptrend" => Some(Self::Uptrend),
            "downtrend" => Some(Self::Downtrend),
            "sideways" => Some(Self::Sideways),
            "volatile" => Some(Self::Volatile),
            "momentum" => Some(Self::Momentum),
            "gaps" => Some(Self::WithGaps),
            _ => None,
        }
    }
}

/// Seeded OHLCV generator for tests and offline backtests
pub struct SyntheticDataGenerator {
    rng: StdRng,
    base_price: f64,
    base_volume: f64,
    start: DateTime<Utc>,
    burst_left: usize,
    burst_drift: f64,
}

impl SyntheticDataGenerator {
    /// Create a new generator with a seed for reproducibility
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            base_price: 50_000.0,
            base_volume: 100_000.0,
            // 09:00 KST
            start: Utc
                .with_ymd_and_hms(2024, 1, 2, 0, 0, 0)
                .single()
                .unwrap_or_else(Utc::now),
            burst_left: 0,
            burst_drift: 0.0,
        }
    }

    /// Generate one continuous run of candles
    ///
    /// # Arguments
    /// * `scenario` - The market scenario to simulate
    /// * `num_candles` - Number of candles to generate
    /// * `interval_minutes` - Minutes between candles
    pub fn generate(
        &mut self,
        scenario: MarketScenario,
        num_candles: usize,
        interval_minutes: i64,
    ) -> Vec<Candle> {
        let mut candles = Vec::with_capacity(num_candles);
        let mut price = self.base_price;
        let mut slot = 0i64;

        for i in 0..num_candles {
            if scenario == MarketScenario::WithGaps && i % 50 == 49 {
                slot += 2;
                continue;
            }
            let timestamp = self.start + Duration::minutes(slot * interval_minutes);
            let open = price;
            price = self.step(scenario, price, 24.0 * 60.0 / interval_minutes as f64);
            candles.push(self.create_candle(open, price, timestamp));
            slot += 1;
        }

        candles
    }

    /// Generate `sessions` trading days of `bars_per_session` candles each,
    /// every session starting at the same time of day
    pub fn generate_sessions(
        &mut self,
        scenario: MarketScenario,
        sessions: usize,
        bars_per_session: usize,
        interval_minutes: i64,
    ) -> Vec<Candle> {
        let mut candles = Vec::with_capacity(sessions * bars_per_session);
        let mut price = self.base_price;

        for day in 0..sessions {
            let session_start = self.start + Duration::days(day as i64);
            // Overnight gap
            price *= 1.0 + self.rng.gen_range(-0.005..0.005);

            for bar in 0..bars_per_session {
                let timestamp = session_start + Duration::minutes(bar as i64 * interval_minutes);
                let open = price;
                price = self.step(scenario, price, bars_per_session as f64);
                candles.push(self.create_candle(open, price, timestamp));
            }
        }

        candles
    }

    /// Next close. `steps_per_session` scales the per-session drift.
    fn step(&mut self, scenario: MarketScenario, price: f64, steps_per_session: f64) -> f64 {
        let next = match scenario {
            MarketScenario::Uptrend => {
                let drift = 0.02 / steps_per_session;
                price * (1.0 + drift + self.rng.gen_range(-0.001..0.001))
            }
            MarketScenario::Downtrend => {
                let drift = -0.02 / steps_per_session;
                price * (1.0 + drift + self.rng.gen_range(-0.001..0.001))
            }
            MarketScenario::Sideways => {
                let reversion = (self.base_price - price) * 0.1;
                price + reversion + price * self.rng.gen_range(-0.005..0.005)
            }
            MarketScenario::Volatile => price * (1.0 + self.rng.gen_range(-0.03..0.03)),
            MarketScenario::Momentum => {
                if self.burst_left == 0 {
                    self.burst_left = self.rng.gen_range(6..24);
                    self.burst_drift = match self.rng.gen_range(0..3) {
                        0 => 0.002,
                        1 => -0.0015,
                        _ => 0.0,
                    };
                }
                self.burst_left -= 1;
                price * (1.0 + self.burst_drift + self.rng.gen_range(-0.002..0.002))
            }
            MarketScenario::WithGaps => price * (1.0 + self.rng.gen_range(-0.004..0.004)),
        };

        next.max(self.base_price * 0.2)
    }

    /// Candle around an open/close pair
    fn create_candle(&mut self, open: f64, close: f64, timestamp: DateTime<Utc>) -> Candle {
        let wick = 0.002; // up to 0.2% beyond the body
        let high = open.max(close) * (1.0 + self.rng.gen_range(0.0..wick));
        let low = open.min(close) * (1.0 - self.rng.gen_range(0.0..wick));

        // Vary volume ±30%, with occasional spikes
        let mut volume = self.base_volume * self.rng.gen_range(0.7..1.3);
        if self.rng.gen_bool(0.03) {
            volume *= 3.0;
        }

        Candle {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::offset_from_secs;

    #[test]
    fn test_generate_uptrend() {
        let mut gen = SyntheticDataGenerator::new(42);
        let candles = gen.generate_sessions(MarketScenario::Uptrend, 10, 50, 5);

        assert_eq!(candles.len(), 500);

        let first_price = candles.first().unwrap().open;
        let last_price = candles.last().unwrap().close;
        assert!(
            last_price > first_price,
            "Uptrend should end higher: {} -> {}",
            first_price,
            last_price
        );
    }

    #[test]
    fn test_generate_downtrend() {
        let mut gen = SyntheticDataGenerator::new(42);
        let candles = gen.generate_sessions(MarketScenario::Downtrend, 10, 50, 5);

        let first_price = candles.first().unwrap().open;
        let last_price = candles.last().unwrap().close;
        assert!(
            last_price < first_price,
            "Downtrend should end lower: {} -> {}",
            first_price,
            last_price
        );
    }

    #[test]
    fn test_generate_sideways() {
        let mut gen = SyntheticDataGenerator::new(42);
        let candles = gen.generate(MarketScenario::Sideways, 500, 5);

        let base = gen.base_price;
        for candle in &candles {
            assert!(
                candle.close > base * 0.9 && candle.close < base * 1.1,
                "Sideways should stay near base: {} vs {}",
                candle.close,
                base
            );
        }
    }

    #[test]
    fn test_generate_with_gaps() {
        let mut gen = SyntheticDataGenerator::new(42);
        let candles = gen.generate(MarketScenario::WithGaps, 100, 5);

        assert!(candles.len() < 100);
        let has_gap = candles
            .windows(2)
            .any(|w| (w[1].timestamp - w[0].timestamp).num_minutes() > 5);
        assert!(has_gap, "Should contain time gaps");
    }

    #[test]
    fn test_same_seed_same_candles() {
        let a = SyntheticDataGenerator::new(7).generate(MarketScenario::Momentum, 200, 5);
        let b = SyntheticDataGenerator::new(7).generate(MarketScenario::Momentum, 200, 5);
        assert_eq!(a, b);
    }

    #[test]
    fn test_sessions_split_by_day() {
        let mut gen = SyntheticDataGenerator::new(42);
        let candles = gen.generate_sessions(MarketScenario::Momentum, 3, 75, 5);
        assert_eq!(candles.len(), 225);

        let kst = offset_from_secs(9 * 3600);
        let dates: Vec<_> = candles.iter().map(|c| c.session_date(kst)).collect();
        assert_eq!(dates[0], dates[74]);
        assert_ne!(dates[74], dates[75]);
        assert_ne!(dates[149], dates[150]);
    }

    #[test]
    fn test_ohlc_consistency() {
        let mut gen = SyntheticDataGenerator::new(42);
        let candles = gen.generate(MarketScenario::Volatile, 200, 5);

        for candle in &candles {
            assert!(candle.high >= candle.close, "High should be >= close");
            assert!(candle.high >= candle.open, "High should be >= open");
            assert!(candle.low <= candle.close, "Low should be <= close");
            assert!(candle.low <= candle.open, "Low should be <= open");
        }
    }

    #[test]
    fn test_timestamps_are_sequential() {
        let mut gen = SyntheticDataGenerator::new(42);
        let candles = gen.generate_sessions(MarketScenario::Uptrend, 2, 50, 5);
        assert!(candles.windows(2).all(|w| w[1].timestamp > w[0].timestamp));
    }
}
