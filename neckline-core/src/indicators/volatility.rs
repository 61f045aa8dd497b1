//! Volatility range.
//!
//! True Range: max(high-low, |high-prev_close|, |low-prev_close|), with
//! TR[0] = high[0] - low[0]. The series is smoothed with the same
//! first-value-seeded exponential recursion as the trend averages.

use super::ema::ema_of_series;
use super::Indicator;
use crate::domain::Bar;

#[derive(Debug, Clone)]
pub struct VolatilityRange {
    period: usize,
    name: String,
}

impl VolatilityRange {
    /// # Panics
    ///
    /// If `period` is 0. [`CoreConfig::validate`](crate::config::CoreConfig::validate)
    /// rejects such configs before they get here.
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "volatility period must be >= 1");
        Self {
            period,
            name: format!("vol_range_{period}"),
        }
    }
}

/// Compute the True Range series from bars.
pub fn true_range(bars: &[Bar]) -> Vec<f64> {
    let n = bars.len();
    let mut tr = vec![f64::NAN; n];

    if n == 0 {
        return tr;
    }

    let h = bars[0].high;
    let l = bars[0].low;
    if h.is_finite() && l.is_finite() {
        tr[0] = h - l;
    }

    for i in 1..n {
        let h = bars[i].high;
        let l = bars[i].low;
        let pc = bars[i - 1].close;
        if h.is_finite() && l.is_finite() && pc.is_finite() {
            tr[i] = (h - l).max((h - pc).abs()).max((l - pc).abs());
        }
    }

    tr
}

impl Indicator for VolatilityRange {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period.saturating_sub(1)
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        ema_of_series(&true_range(bars), self.period)
    }
}
