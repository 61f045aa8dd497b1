//! Bar: the fundamental market data unit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One OHLC observation for a fixed interval.
///
/// Sequences of bars are strictly time-ordered. By convention the last element
/// of any slice handed to an evaluation function is the bar still forming; the
/// one before it is the most recent closed bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Bar {
    pub fn new(timestamp: DateTime<Utc>, open: f64, high: f64, low: f64, close: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
        }
    }

    /// Returns true if any OHLC field is not a finite number.
    pub fn is_void(&self) -> bool {
        !(self.open.is_finite()
            && self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite())
    }

    /// Basic OHLC sanity check: high >= low, high >= open, high >= close, etc.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.close > 0.0
    }

    /// Candle body size, `|close - open|`.
    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }
}

/// Index of the most recent closed bar in a sequence whose last element is forming.
///
/// Returns `None` when the sequence holds fewer than two bars.
pub fn last_closed_index(bars: &[Bar]) -> Option<usize> {
    bars.len().checked_sub(2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_bar() -> Bar {
        Bar::new(
            Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap(),
            100.0,
            105.0,
            98.0,
            103.0,
        )
    }

    #[test]
    fn bar_is_sane() {
        assert!(sample_bar().is_sane());
    }

    #[test]
    fn bar_detects_void() {
        let mut bar = sample_bar();
        bar.open = f64::NAN;
        assert!(bar.is_void());
        assert!(!bar.is_sane());

        let mut bar = sample_bar();
        bar.close = f64::INFINITY;
        assert!(bar.is_void());
    }

    #[test]
    fn bar_detects_insane_high_low() {
        let mut bar = sample_bar();
        bar.high = 97.0; // below low
        assert!(!bar.is_sane());
    }

    #[test]
    fn candle_direction_and_body() {
        let bar = sample_bar();
        assert!(bar.is_bullish());
        assert!(!bar.is_bearish());
        assert_eq!(bar.body(), 3.0);
    }

    #[test]
    fn last_closed_index_skips_forming_bar() {
        let bar = sample_bar();
        assert_eq!(last_closed_index(&[]), None);
        assert_eq!(last_closed_index(&[bar]), None);
        assert_eq!(last_closed_index(&[bar, bar, bar]), Some(1));
    }

    #[test]
    fn bar_serialization_roundtrip() {
        let bar = sample_bar();
        let json = serde_json::to_string(&bar).unwrap();
        let deser: Bar = serde_json::from_str(&json).unwrap();
        assert_eq!(bar, deser);
    }
}
