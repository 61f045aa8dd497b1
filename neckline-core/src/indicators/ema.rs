//! Exponential Moving Average (EMA).
//!
//! Recursive: EMA[t] = EMA[t-1] + alpha * (close[t] - EMA[t-1]), alpha = 2 / (period + 1)
//! Seed: EMA[0] = close[0] (first available value, not an SMA of the first window).
//! Values before index `period - 1` are reported as NaN even though the
//! recursion runs from the first bar.

use super::Indicator;
use crate::domain::Bar;

#[derive(Debug, Clone)]
pub struct Ema {
    period: usize,
    name: String,
}

impl Ema {
    /// # Panics
    ///
    /// If `period` is 0. [`CoreConfig::validate`](crate::config::CoreConfig::validate)
    /// rejects such configs before they get here.
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "EMA period must be >= 1");
        Self {
            period,
            name: format!("ema_{period}"),
        }
    }

    pub fn period(&self) -> usize {
        self.period
    }
}

impl Indicator for Ema {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period.saturating_sub(1)
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        ema_of_series(&closes, self.period)
    }
}

/// EMA of an arbitrary series, seeded by its first value.
///
/// A non-finite input taints every value from that index on.
pub fn ema_of_series(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];

    if n == 0 || period == 0 {
        return result;
    }

    let alpha = 2.0 / (period as f64 + 1.0);
    let mut prev = values[0];
    if !prev.is_finite() {
        return result;
    }

    for (i, &v) in values.iter().enumerate() {
        if !v.is_finite() {
            return result;
        }
        let ema = if i == 0 { v } else { prev + alpha * (v - prev) };
        if i + 1 >= period {
            result[i] = ema;
        }
        prev = ema;
    }

    result
}
