use crate::models::Candle;
use chrono::{DateTime, Duration, Utc};

/// Default trailing look-back for flat detection
pub const DEFAULT_WINDOW_HOURS: i64 = 4;

/// Ordered candles inside a trailing time window
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandleWindow {
    candles: Vec<Candle>,
}

impl CandleWindow {
    /// Keep candles that opened at or after `now - window`
    ///
    /// Input is sorted by open time and duplicate open times are dropped
    /// (first occurrence wins) before filtering.
    pub fn trailing(mut candles: Vec<Candle>, window: Duration, now: DateTime<Utc>) -> Self {
        let cutoff_ms = (now - window).timestamp_millis();

        candles.sort_by_key(|c| c.open_time);
        candles.dedup_by_key(|c| c.open_time);
        candles.retain(|c| c.open_time >= cutoff_ms);

        Self { candles }
    }

    /// Wrap candles already known to belong to the window
    pub fn from_candles(candles: Vec<Candle>) -> Self {
        Self { candles }
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    /// Drop candles whose wicks fall outside the percentile band
    ///
    /// Highs and lows are sorted independently. The high threshold sits at
    /// index `ceil(n * p / 100)` of the sorted highs and the low threshold at
    /// `floor(n * (100 - p) / 100)` of the sorted lows, both clamped. A candle
    /// survives when `high <= high_threshold` and `low >= low_threshold`.
    /// Percentiles outside 1..=100 leave the window unchanged.
    pub fn trim_percentile(&self, percentile: u32) -> CandleWindow {
        let n = self.candles.len();
        if n == 0 || !(1..=100).contains(&percentile) {
            return self.clone();
        }

        let mut highs: Vec<_> = self.candles.iter().map(|c| c.high).collect();
        let mut lows: Vec<_> = self.candles.iter().map(|c| c.low).collect();
        highs.sort();
        lows.sort();

        let p = percentile as usize;
        let high_index = ((n * p).div_ceil(100)).min(n - 1);
        let low_index = (n * (100 - p) / 100).min(n - 1);

        let high_threshold = highs[high_index];
        let low_threshold = lows[low_index];

        let candles = self
            .candles
            .iter()
            .filter(|c| c.high <= high_threshold && c.low >= low_threshold)
            .cloned()
            .collect();

        CandleWindow { candles }
    }
}
