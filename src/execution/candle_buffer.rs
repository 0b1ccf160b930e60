use crate::models::Candle;
use std::collections::VecDeque;

/// Rolling candle history for one instrument
///
/// Refreshes overwrite: every held candle at or after the first fresh
/// timestamp is replaced, so a still-forming latest bar gets corrected.
#[derive(Debug, Clone)]
pub struct CandleBuffer {
    candles: VecDeque<Candle>,
    max_candles: usize,
}

impl CandleBuffer {
    /// # Arguments
    /// * `max_candles` - Maximum number of candles to keep
    pub fn new(max_candles: usize) -> Self {
        Self {
            candles: VecDeque::new(),
            max_candles,
        }
    }

    #[cfg(test)]
    pub fn from_candles(candles: Vec<Candle>, max_candles: usize) -> Self {
        let mut buffer = Self::new(max_candles);
        buffer.merge(candles);
        buffer
    }

    /// Merge a newer slice of history, returning how many candles extend it
    pub fn merge(&mut self, fresh: Vec<Candle>) -> usize {
        let Some(first) = fresh.first() else {
            return 0;
        };
        let cutoff = first.timestamp;
        let previous_last = self.candles.back().map(|c| c.timestamp);

        while self.candles.back().is_some_and(|c| c.timestamp >= cutoff) {
            self.candles.pop_back();
        }

        let mut added = 0;
        let mut last = self.candles.back().map(|c| c.timestamp);
        for candle in fresh {
            // Out-of-order rows from the source are ignored
            if last.is_some_and(|t| candle.timestamp <= t) {
                continue;
            }
            if previous_last.map_or(true, |t| candle.timestamp > t) {
                added += 1;
            }
            last = Some(candle.timestamp);
            self.candles.push_back(candle);
        }

        while self.candles.len() > self.max_candles {
            self.candles.pop_front();
        }
        added
    }

    pub fn candles(&self) -> Vec<Candle> {
        self.candles.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn latest(&self) -> Option<&Candle> {
        self.candles.back()
    }
}
