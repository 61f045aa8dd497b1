//! Indicator computer.
//!
//! Indicators are pure functions: bar history in, numeric series out, with
//! `f64::NAN` standing for "not enough data yet". `IndicatorSeries` bundles
//! the four series the decision logic reads and exposes them per bar as
//! `IndicatorSet` values whose fields are `Option<f64>`, so missing data is
//! never mistaken for zero.

pub mod ema;
pub mod volatility;

pub use ema::{ema_of_series, Ema};
pub use volatility::{true_range, VolatilityRange};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::IndicatorConfig;
use crate::domain::Bar;

/// Trait for indicators.
///
/// Indicators take a full bar series and produce a numeric output series of
/// the same length. The first `lookback()` values are `f64::NAN`.
///
/// # Look-ahead contamination guard
/// No indicator value at bar t may depend on price data from bar t+1 or later.
pub trait Indicator: Send + Sync {
    /// Human-readable name (e.g., "ema_20", "vol_range_14").
    fn name(&self) -> &str;

    /// Number of bars needed before the indicator produces valid output.
    fn lookback(&self) -> usize;

    /// Compute the indicator for the entire bar series.
    fn compute(&self, bars: &[Bar]) -> Vec<f64>;
}

/// Indicator values at a single bar.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSet {
    pub fast: Option<f64>,
    pub medium: Option<f64>,
    pub slow: Option<f64>,
    pub volatility: Option<f64>,
}

impl IndicatorSet {
    /// True when every field is populated.
    pub fn is_complete(&self) -> bool {
        self.fast.is_some()
            && self.medium.is_some()
            && self.slow.is_some()
            && self.volatility.is_some()
    }
}

fn finite(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}

/// Precomputed fast/medium/slow averages and volatility range for a bar sequence.
#[derive(Debug, Clone)]
pub struct IndicatorSeries {
    fast: Vec<f64>,
    medium: Vec<f64>,
    slow: Vec<f64>,
    volatility: Vec<f64>,
    reliable_from: usize,
}

impl IndicatorSeries {
    /// Compute every series for `bars`.
    ///
    /// Fails soft: a bar with non-finite or inconsistent OHLC makes the whole
    /// sequence unusable, and an all-NaN series of the same length comes back.
    /// Panics on a zero period; validated configs never carry one.
    pub fn compute(bars: &[Bar], config: &IndicatorConfig) -> Self {
        let reliable_from = config.slow_period + config.warmup_buffer;

        if let Some(bad) = bars.iter().position(|b| !b.is_sane()) {
            warn!(
                index = bad,
                bars = bars.len(),
                "malformed bar in sequence, indicators left unavailable"
            );
            return Self::unavailable(bars.len(), reliable_from);
        }

        Self {
            fast: Ema::new(config.fast_period).compute(bars),
            medium: Ema::new(config.medium_period).compute(bars),
            slow: Ema::new(config.slow_period).compute(bars),
            volatility: VolatilityRange::new(config.volatility_period).compute(bars),
            reliable_from,
        }
    }

    fn unavailable(len: usize, reliable_from: usize) -> Self {
        Self {
            fast: vec![f64::NAN; len],
            medium: vec![f64::NAN; len],
            slow: vec![f64::NAN; len],
            volatility: vec![f64::NAN; len],
            reliable_from,
        }
    }

    pub fn len(&self) -> usize {
        self.fast.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fast.is_empty()
    }

    /// Values at `index`. Out-of-range indices give an empty set.
    pub fn at(&self, index: usize) -> IndicatorSet {
        let get = |series: &[f64]| series.get(index).copied().and_then(finite);
        IndicatorSet {
            fast: get(&self.fast),
            medium: get(&self.medium),
            slow: get(&self.slow),
            volatility: get(&self.volatility),
        }
    }

    /// Enough history exists at `index` for the slowest average to be trusted.
    pub fn is_reliable(&self, index: usize) -> bool {
        index < self.len() && index + 1 >= self.reliable_from && self.at(index).is_complete()
    }

    /// Mean volatility range over the `lookback` bars before `index`.
    ///
    /// `None` unless every bar in the window has a value.
    pub fn volatility_reference(&self, index: usize, lookback: usize) -> Option<f64> {
        if lookback == 0 || index < lookback || index > self.len() {
            return None;
        }
        let window = &self.volatility[index - lookback..index];
        if window.iter().any(|v| !v.is_finite()) {
            return None;
        }
        Some(window.iter().sum::<f64>() / lookback as f64)
    }
}

/// Create synthetic bars from close prices for testing.
///
/// open = prev_close (or close for first bar), high = max(open,close) + 1.0,
/// low = min(open,close) - 1.0, one bar per hour.
#[cfg(test)]
pub fn make_bars(closes: &[f64]) -> Vec<Bar> {
    use chrono::TimeZone;
    let base = chrono::Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Bar::new(
                base + chrono::Duration::hours(i as i64),
                open,
                open.max(close) + 1.0,
                open.min(close) - 1.0,
                close,
            )
        })
        .collect()
}

#[cfg(test)]
pub fn make_ohlc_bars(data: &[(f64, f64, f64, f64)]) -> Vec<Bar> {
    use chrono::TimeZone;
    let base = chrono::Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    data.iter()
        .enumerate()
        .map(|(i, &(open, high, low, close))| {
            Bar::new(base + chrono::Duration::hours(i as i64), open, high, low, close)
        })
        .collect()
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
